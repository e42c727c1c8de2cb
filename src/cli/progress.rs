//! Progress display fed by harvest events.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use console::style;
use taxaharvest::harvest::HarvestEvent;
use taxaharvest::models::OutcomeKind;

/// One bar per pass, with batch and cooldown notices printed above it.
pub struct HarvestProgress {
    bar: ProgressBar,
}

impl HarvestProgress {
    pub fn new(visible: bool) -> Self {
        let bar = ProgressBar::new(0);
        if !visible {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg:30!} [{bar:30.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Self { bar }
    }

    fn println(&self, message: String) {
        if self.bar.is_hidden() {
            println!("{}", message);
        } else {
            self.bar.println(message);
        }
    }

    pub fn handle(&self, event: HarvestEvent) {
        match event {
            HarvestEvent::PassStarted {
                pass,
                pending,
                total,
            } => {
                self.bar.reset();
                self.bar.set_length(pending as u64);
                self.bar.set_message(pass.as_str());
                self.println(format!(
                    "{} {} pass: {} pending of {} targets",
                    style("→").cyan(),
                    pass.as_str(),
                    pending,
                    total
                ));
            }
            HarvestEvent::BatchStarted {
                batch,
                size,
                identity,
            } => {
                self.println(format!(
                    "{} Batch {} ({} targets) as {}",
                    style("→").cyan(),
                    batch,
                    size,
                    style(truncate(&identity, 60)).dim()
                ));
            }
            HarvestEvent::TargetStarted { target } => {
                self.bar.set_message(target);
            }
            HarvestEvent::TargetFinished {
                target,
                kind,
                complete,
            } => {
                self.bar.inc(1);
                match (kind, complete) {
                    (OutcomeKind::Success, Some(false)) => {
                        self.println(format!("  {} {} (incomplete)", style("~").yellow(), target))
                    }
                    (OutcomeKind::TransientError | OutcomeKind::FatalError, _) => {
                        self.println(format!(
                            "  {} {} ({})",
                            style("✗").red(),
                            target,
                            kind.as_str()
                        ))
                    }
                    _ => {}
                }
            }
            HarvestEvent::SoftBlocked {
                target,
                reason,
                remaining,
            } => {
                self.println(format!(
                    "{} Soft block at {}: {} ({} targets left for the next batch)",
                    style("!").yellow(),
                    target,
                    reason,
                    remaining
                ));
            }
            HarvestEvent::Cooldown {
                duration,
                escalated,
            } => {
                let label = if escalated {
                    style("escalated cooldown").yellow()
                } else {
                    style("cooldown").dim()
                };
                self.println(format!(
                    "  {} {} for {:.0}s",
                    style("…").dim(),
                    label,
                    duration.as_secs_f64()
                ));
            }
            HarvestEvent::PassFinished { .. } => {
                self.bar.finish_and_clear();
            }
        }
    }

    /// Consume events until the sender side is dropped.
    pub fn spawn(self, mut rx: mpsc::Receiver<HarvestEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle(event);
            }
            self.bar.finish_and_clear();
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
