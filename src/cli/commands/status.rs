//! Status command for showing crawl and store state.

use console::style;

use taxaharvest::config::{Config, Settings};
use taxaharvest::harvest::StatusReport;

use super::TargetArgs;
use crate::cli::helpers::{build_harvester, database_exists, load_targets, scheduler_for};

/// Show progress of both passes and the store.
pub async fn cmd_status(
    settings: &Settings,
    config: &Config,
    target_args: &TargetArgs,
    json: bool,
) -> anyhow::Result<()> {
    if !database_exists(settings) {
        println!(
            "{} Not initialized. Run 'harvest init' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    let targets = load_targets(settings, target_args)?;
    let harvester = build_harvester(settings, config, targets, scheduler_for(config)?).await?;
    let report = harvester.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    display_status(settings, &report);
    Ok(())
}

fn display_status(settings: &Settings, report: &StatusReport) {
    println!("\n{}", style("Harvest Status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<22} {}", "Data directory:", settings.data_dir.display());
    println!("{:<22} {}", "Targets:", report.targets);
    println!(
        "{:<22} {}",
        "Completed:",
        style(report.completed).green()
    );
    println!("{:<22} {}", "Failed:", style(report.failed).red());
    println!("{:<22} {}", "Pending:", style(report.pending).cyan());
    println!(
        "{:<22} {} ({} complete)",
        "Stored records:", report.stored, report.stored_complete
    );
    println!("{:<22} {}", "Soft-block aborts:", report.soft_block_aborts);
    if let Some(at) = report.last_batch_at {
        println!(
            "{:<22} {}",
            "Last batch:",
            at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        );
    }

    println!("\n{}", style("Recovery").bold());
    println!("{}", "-".repeat(40));
    println!("{:<22} {}", "Candidates:", report.recovery_candidates);
    println!("{:<22} {}", "Resolved:", report.recovery_completed);
    println!(
        "{:<22} {}",
        "Still failing:",
        style(report.recovery_failed).red()
    );
}
