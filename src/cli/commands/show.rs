//! Show one stored record.

use console::style;

use taxaharvest::config::Settings;
use taxaharvest::repository::RecordStore;

use crate::cli::helpers::{database_exists, open_store};

pub async fn cmd_show(settings: &Settings, key: &str, json: bool) -> anyhow::Result<()> {
    if !database_exists(settings) {
        println!(
            "{} Not initialized. Run 'harvest init' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    let store = open_store(settings).await?;
    let Some(record) = store.get(key).await? else {
        println!("{} No stored record for {}", style("!").yellow(), key);
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let badge = if record.complete {
        style("complete").green()
    } else {
        style("incomplete").yellow()
    };
    println!("\n{} [{}]", style(&record.key).bold(), badge);
    println!("{}", "-".repeat(40));
    for (name, value) in &record.fields {
        println!("{:<16} {}", format!("{}:", name), value);
    }
    println!(
        "\n{:<16} {}",
        "Updated:",
        record
            .updated_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}
