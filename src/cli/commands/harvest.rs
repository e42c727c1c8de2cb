//! Forward and recovery pass commands.

use console::style;
use tokio::sync::mpsc;

use taxaharvest::config::{Config, Settings};
use taxaharvest::harvest::{EventSink, HarvestEvent, RecoverOptions, Shutdown};
use taxaharvest::models::RunSummary;

use super::TargetArgs;
use crate::cli::helpers::{build_harvester, load_targets, scheduler_for};
use crate::cli::progress::HarvestProgress;

/// Run the forward pass, optionally followed by recovery passes.
pub async fn cmd_run(
    settings: &Settings,
    config: &Config,
    target_args: &TargetArgs,
    recover_passes: usize,
    show_progress: bool,
) -> anyhow::Result<()> {
    let targets = load_targets(settings, target_args)?;
    if targets.is_empty() {
        println!("{} No targets to harvest", style("!").yellow());
        return Ok(());
    }

    println!(
        "{} Harvesting {} targets with the {} backend",
        style("→").cyan(),
        targets.len(),
        config.source.backend.as_str()
    );

    let (event_tx, event_rx) = mpsc::channel::<HarvestEvent>(100);
    let display = HarvestProgress::new(show_progress).spawn(event_rx);

    let scheduler = scheduler_for(config)?
        .with_shutdown(Shutdown::ctrl_c())
        .with_events(EventSink::new(event_tx));
    let mut harvester = build_harvester(settings, config, targets, scheduler).await?;

    let result = if recover_passes > 0 {
        harvester.converge(recover_passes).await
    } else {
        harvester.run().await.map(|summary| vec![summary])
    };

    // Dropping the harvester closes the event channel
    drop(harvester);
    let _ = display.await;

    let summaries = result?;
    for summary in &summaries {
        print_summary(summary);
    }
    Ok(())
}

/// Run one recovery pass.
pub async fn cmd_recover(
    settings: &Settings,
    config: &Config,
    target_args: &TargetArgs,
    retry_failed: bool,
    show_progress: bool,
) -> anyhow::Result<()> {
    let targets = load_targets(settings, target_args)?;

    let (event_tx, event_rx) = mpsc::channel::<HarvestEvent>(100);
    let display = HarvestProgress::new(show_progress).spawn(event_rx);

    let scheduler = scheduler_for(config)?
        .with_shutdown(Shutdown::ctrl_c())
        .with_events(EventSink::new(event_tx));
    let mut harvester = build_harvester(settings, config, targets, scheduler).await?;

    let result = harvester.recover(RecoverOptions { retry_failed }).await;
    drop(harvester);
    let _ = display.await;

    let report = result?;
    println!(
        "{} {} recovery candidates ({} failed in the forward pass, {} without a stored record)",
        style("→").cyan(),
        report.plan.targets.len(),
        report.plan.from_failed,
        report.plan.missing_from_store
    );
    if report.cleared > 0 {
        println!(
            "  {} {} earlier recovery failures retried",
            style("→").dim(),
            report.cleared
        );
    }
    if report.plan.is_empty() {
        println!("{} Nothing to recover", style("✓").green());
        return Ok(());
    }
    print_summary(&report.summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let header = format!("{} pass", summary.pass.as_str());
    if summary.interrupted {
        println!("{} {} interrupted", style("!").yellow(), header);
    } else {
        println!("{} {} finished", style("✓").green(), header);
    }
    println!(
        "  {:<22} {}",
        "Attempted:",
        style(summary.attempted).cyan()
    );
    println!(
        "  {:<22} {}",
        "Complete:",
        style(summary.complete).green()
    );
    println!(
        "  {:<22} {} ({} kept an existing complete record)",
        "Incomplete:",
        style(summary.incomplete).yellow(),
        summary.kept_existing
    );
    println!("  {:<22} {}", "Not found:", summary.not_found);
    println!("  {:<22} {}", "Failed:", style(summary.failed).red());
    println!(
        "  {:<22} {} over {} batches",
        "Soft blocks:", summary.soft_blocks, summary.batches
    );
    println!(
        "  {:<22} {}",
        "Residual failed:",
        style(summary.residual_failed).bold()
    );
}
