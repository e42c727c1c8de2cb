//! Batch scheduler: the single loop that drives every pass.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::events::{EventSink, HarvestEvent};
use super::shutdown::Shutdown;
use super::HarvestError;
use crate::config::{HarvestConfig, SoftBlockPolicy};
use crate::fetch::Fetcher;
use crate::identity::{Identity, IdentityRotator};
use crate::merge::MergeStore;
use crate::models::{CrawlState, Outcome, PassKind, RunSummary};
use crate::repository::MergeOutcome;
use crate::state::CrawlStateStore;

/// How a batch ended.
enum BatchEnd {
    Finished,
    SoftBlocked,
    Interrupted,
}

/// Works through the pending targets of one state partition in paced,
/// fixed-size batches with one identity per batch.
pub struct BatchScheduler {
    config: HarvestConfig,
    identities: IdentityRotator,
    shutdown: Shutdown,
    events: EventSink,
    last_batch_at: Option<DateTime<Utc>>,
}

impl BatchScheduler {
    pub fn new(config: HarvestConfig, identities: IdentityRotator) -> Self {
        Self {
            config,
            identities,
            shutdown: Shutdown::never(),
            events: EventSink::none(),
            last_batch_at: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Drain every pending target in `targets` against one state partition.
    ///
    /// Per-target failures only update the state. A state or store error is
    /// returned immediately; everything persisted before it stays valid.
    pub async fn drain(
        &mut self,
        pass: PassKind,
        targets: &[String],
        fetcher: &mut dyn Fetcher,
        state_store: &dyn CrawlStateStore,
        merge: &MergeStore,
    ) -> Result<RunSummary, HarvestError> {
        let mut state = state_store.load().await?;
        let mut summary = RunSummary::new(pass);
        summary.input = state.pending(targets).len();

        info!(
            pass = pass.as_str(),
            state = %state_store.describe(),
            "{} pending of {} targets",
            summary.input,
            targets.len()
        );
        self.events
            .emit(HarvestEvent::PassStarted {
                pass,
                pending: summary.input,
                total: targets.len(),
            })
            .await;

        if summary.input > 0 && !self.wait_for_gap(&state).await {
            summary.interrupted = true;
        }

        while !summary.interrupted {
            let batch: Vec<String> = state
                .pending(targets)
                .into_iter()
                .take(self.config.batch_size)
                .map(String::from)
                .collect();
            if batch.is_empty() {
                break;
            }

            summary.batches += 1;
            let identity = self.identities.next();
            info!(
                batch = summary.batches,
                identity = %identity.user_agent,
                "Starting batch of {} targets",
                batch.len()
            );
            fetcher.begin_batch(&identity).await;
            self.events
                .emit(HarvestEvent::BatchStarted {
                    batch: summary.batches,
                    size: batch.len(),
                    identity: identity.user_agent.clone(),
                })
                .await;

            let end = self
                .run_batch(&batch, &identity, fetcher, &mut state, state_store, merge, &mut summary)
                .await?;

            let finished_at = Utc::now();
            state.last_batch_at = Some(finished_at);
            self.last_batch_at = Some(finished_at);
            state_store.save(&state).await?;

            let escalated = match end {
                BatchEnd::Interrupted => {
                    summary.interrupted = true;
                    break;
                }
                BatchEnd::SoftBlocked => true,
                BatchEnd::Finished => false,
            };

            if state.pending(targets).is_empty() {
                break;
            }

            let range = if escalated {
                self.config.soft_block_cooldown()
            } else {
                self.config.batch_cooldown_ms
            };
            let duration = range.sample();
            info!(
                escalated,
                "Cooling down for {:.1}s before the next batch",
                duration.as_secs_f64()
            );
            self.events
                .emit(HarvestEvent::Cooldown {
                    duration,
                    escalated,
                })
                .await;
            if !self.shutdown.sleep(duration).await {
                summary.interrupted = true;
            }
        }

        summary.residual_failed = state.failed_among(targets);
        if summary.interrupted {
            warn!(
                pass = pass.as_str(),
                "Interrupted; {} targets still pending",
                state.pending(targets).len()
            );
        }
        info!(
            pass = pass.as_str(),
            complete = summary.complete,
            incomplete = summary.incomplete,
            not_found = summary.not_found,
            failed = summary.failed,
            soft_blocks = summary.soft_blocks,
            residual_failed = summary.residual_failed,
            "Pass finished"
        );
        self.events
            .emit(HarvestEvent::PassFinished {
                summary: summary.clone(),
            })
            .await;
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_batch(
        &self,
        batch: &[String],
        identity: &Identity,
        fetcher: &mut dyn Fetcher,
        state: &mut CrawlState,
        state_store: &dyn CrawlStateStore,
        merge: &MergeStore,
        summary: &mut RunSummary,
    ) -> Result<BatchEnd, HarvestError> {
        for (index, target) in batch.iter().enumerate() {
            if self.shutdown.is_triggered() {
                return Ok(BatchEnd::Interrupted);
            }
            if !self.shutdown.sleep(self.config.request_delay_ms.sample()).await {
                return Ok(BatchEnd::Interrupted);
            }

            self.events
                .emit(HarvestEvent::TargetStarted {
                    target: target.clone(),
                })
                .await;
            summary.attempted += 1;
            let outcome = self.fetch_with_retries(fetcher, target, identity).await;
            let kind = outcome.kind();
            let mut complete = None;
            let mut blocked = None;

            match outcome {
                Outcome::Success(record) => {
                    let result = merge.merge(&record).await?;
                    if result.complete {
                        summary.complete += 1;
                    } else {
                        summary.incomplete += 1;
                        if result.outcome == MergeOutcome::KeptComplete {
                            summary.kept_existing += 1;
                        }
                    }
                    complete = Some(result.complete);
                    state.mark_completed(target);
                }
                Outcome::NotFound => {
                    debug!(target = %target, "Not found upstream");
                    summary.not_found += 1;
                    state.mark_completed(target);
                }
                Outcome::TransientError(reason) | Outcome::FatalError(reason) => {
                    warn!(target = %target, kind = kind.as_str(), "{}", reason);
                    summary.failed += 1;
                    state.mark_failed(target);
                }
                Outcome::SoftBlocked(reason) => {
                    warn!(
                        target = %target,
                        identity = %identity.user_agent,
                        policy = self.config.soft_blocked_target.as_str(),
                        "Soft block: {}; aborting batch",
                        reason
                    );
                    summary.soft_blocks += 1;
                    state.record_soft_block_abort();
                    if self.config.soft_blocked_target == SoftBlockPolicy::MarkFailed {
                        state.mark_failed(target);
                    }
                    blocked = Some(reason);
                }
            }

            state_store.save(state).await?;
            self.events
                .emit(HarvestEvent::TargetFinished {
                    target: target.clone(),
                    kind,
                    complete,
                })
                .await;

            if let Some(reason) = blocked {
                self.events
                    .emit(HarvestEvent::SoftBlocked {
                        target: target.clone(),
                        reason,
                        remaining: batch.len() - index - 1,
                    })
                    .await;
                return Ok(BatchEnd::SoftBlocked);
            }
        }
        Ok(BatchEnd::Finished)
    }

    async fn fetch_with_retries(
        &self,
        fetcher: &mut dyn Fetcher,
        target: &str,
        identity: &Identity,
    ) -> Outcome {
        let mut retries = 0;
        loop {
            let outcome = fetcher.fetch(target, identity).await;
            let retry = matches!(outcome, Outcome::TransientError(_))
                && retries < self.config.immediate_retries;
            if !retry {
                return outcome;
            }
            retries += 1;
            debug!(
                target = %target,
                retry = retries,
                "Retrying after: {}",
                outcome.reason().unwrap_or_default()
            );
            if !self.shutdown.sleep(self.config.request_delay_ms.sample()).await {
                return outcome;
            }
        }
    }

    /// Wait out the rest of the minimum cooldown if the previous batch,
    /// in this process or an earlier one, ended recently.
    async fn wait_for_gap(&self, state: &CrawlState) -> bool {
        let last = match state.last_batch_at.into_iter().chain(self.last_batch_at).max() {
            Some(last) => last,
            None => return true,
        };
        let elapsed = (Utc::now() - last).to_std().unwrap_or_default();
        let gap = self.config.batch_cooldown_ms.min_duration();
        if elapsed >= gap {
            return true;
        }

        let remaining = gap - elapsed;
        info!(
            "Previous batch ended {:.0}s ago; waiting {:.0}s",
            elapsed.as_secs_f64(),
            remaining.as_secs_f64()
        );
        self.shutdown.sleep(remaining).await
    }
}
