//! Initialize command.

use console::style;

use taxaharvest::config::Settings;
use taxaharvest::repository::RecordStore;

use crate::cli::helpers::open_store;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    println!("{} Running migrations...", style("→").cyan());
    let store = open_store(settings).await?;
    let counts = store.counts().await?;

    println!(
        "{} Initialized taxaharvest in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    if counts.total > 0 {
        println!(
            "  {} {} records already stored ({} complete)",
            style("→").dim(),
            counts.total,
            counts.complete
        );
    }

    Ok(())
}
