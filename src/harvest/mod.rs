//! Forward and recovery passes over a target list.
//!
//! A [`Harvester`] owns the fetcher, both crawl state partitions and the
//! record store for one target list. The fetcher session is shut down when
//! every pass returns, on success and on error alike.

pub mod events;
mod recovery;
mod scheduler;
pub mod shutdown;

pub use events::{EventSink, HarvestEvent};
pub use recovery::{plan_recovery, RecoveryPlan};
pub use scheduler::BatchScheduler;
pub use shutdown::{Shutdown, ShutdownTrigger};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::fetch::Fetcher;
use crate::merge::{IncompleteLog, MergeStore};
use crate::models::{PassKind, RunSummary, TargetStatus};
use crate::repository::{RecordStore, StoreError};
use crate::state::{CrawlStateStore, StateError};

/// Errors that end a pass. Per-target failures never surface here.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything a [`Harvester`] is built from.
pub struct HarvestParts {
    pub targets: Vec<String>,
    pub fetcher: Box<dyn Fetcher>,
    pub store: Arc<dyn RecordStore>,
    pub required_fields: Vec<String>,
    pub incomplete_log: Option<IncompleteLog>,
    pub primary_state: Box<dyn CrawlStateStore>,
    pub recovery_state: Box<dyn CrawlStateStore>,
    pub scheduler: BatchScheduler,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoverOptions {
    /// Return the recovery partition's failed targets to pending first.
    pub retry_failed: bool,
}

/// Result of one recovery pass.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub plan: RecoveryPlan,
    pub cleared: usize,
    pub summary: RunSummary,
}

/// Snapshot of both partitions and the store for a target list.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub targets: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub stored: u64,
    pub stored_complete: u64,
    pub soft_block_aborts: u64,
    pub last_batch_at: Option<DateTime<Utc>>,
    /// Targets the next recovery pass would consider.
    pub recovery_candidates: usize,
    pub recovery_completed: usize,
    pub recovery_failed: usize,
}

pub struct Harvester {
    targets: Vec<String>,
    fetcher: Box<dyn Fetcher>,
    merge: MergeStore,
    primary: Box<dyn CrawlStateStore>,
    recovery: Box<dyn CrawlStateStore>,
    scheduler: BatchScheduler,
}

impl Harvester {
    pub fn new(parts: HarvestParts) -> Self {
        Self {
            targets: parts.targets,
            fetcher: parts.fetcher,
            merge: MergeStore::new(parts.store, parts.required_fields, parts.incomplete_log),
            primary: parts.primary_state,
            recovery: parts.recovery_state,
            scheduler: parts.scheduler,
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Forward pass over the primary partition.
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        let result = self.forward_pass().await;
        self.fetcher.shutdown().await;
        result
    }

    /// Recovery pass over `failed ∪ (all − stored)` on the recovery partition.
    pub async fn recover(&mut self, options: RecoverOptions) -> Result<RecoveryReport, HarvestError> {
        let result = self.recovery_pass(options).await;
        self.fetcher.shutdown().await;
        result
    }

    /// Forward pass, then up to `max_recovery_passes` recovery passes.
    ///
    /// Stops early when a pass is interrupted, when nothing is left to
    /// recover, or when the residual failed set stops shrinking.
    pub async fn converge(
        &mut self,
        max_recovery_passes: usize,
    ) -> Result<Vec<RunSummary>, HarvestError> {
        let result = self.converge_inner(max_recovery_passes).await;
        self.fetcher.shutdown().await;
        result
    }

    async fn converge_inner(
        &mut self,
        max_recovery_passes: usize,
    ) -> Result<Vec<RunSummary>, HarvestError> {
        let forward = self.forward_pass().await?;
        let mut residual = forward.residual_failed;
        let mut interrupted = forward.interrupted;
        let mut summaries = vec![forward];

        for pass in 0..max_recovery_passes {
            if interrupted {
                break;
            }
            let report = self
                .recovery_pass(RecoverOptions {
                    retry_failed: pass > 0,
                })
                .await?;
            if report.plan.is_empty() {
                break;
            }

            let shrank = report.summary.residual_failed < residual;
            residual = report.summary.residual_failed;
            interrupted = report.summary.interrupted;
            summaries.push(report.summary);

            if residual == 0 || (pass > 0 && !shrank) {
                break;
            }
        }
        Ok(summaries)
    }

    async fn forward_pass(&mut self) -> Result<RunSummary, HarvestError> {
        self.scheduler
            .drain(
                PassKind::Forward,
                &self.targets,
                self.fetcher.as_mut(),
                self.primary.as_ref(),
                &self.merge,
            )
            .await
    }

    async fn recovery_pass(&mut self, options: RecoverOptions) -> Result<RecoveryReport, HarvestError> {
        let primary = self.primary.load().await?;
        let stored = self.merge.store().keys().await?;
        let plan = plan_recovery(&self.targets, &primary, &stored);
        info!(
            "Recovery candidates: {} ({} failed, {} without a stored record)",
            plan.targets.len(),
            plan.from_failed,
            plan.missing_from_store
        );

        let mut cleared = 0;
        if options.retry_failed {
            let mut state = self.recovery.load().await?;
            cleared = state.clear_failed();
            if cleared > 0 {
                self.recovery.save(&state).await?;
                info!("Returned {} recovery failures to pending", cleared);
            }
        }

        let summary = if plan.is_empty() {
            RunSummary::new(PassKind::Recovery)
        } else {
            self.scheduler
                .drain(
                    PassKind::Recovery,
                    &plan.targets,
                    self.fetcher.as_mut(),
                    self.recovery.as_ref(),
                    &self.merge,
                )
                .await?
        };

        Ok(RecoveryReport {
            plan,
            cleared,
            summary,
        })
    }

    pub async fn status(&self) -> Result<StatusReport, HarvestError> {
        let primary = self.primary.load().await?;
        let recovery = self.recovery.load().await?;
        let stored_keys = self.merge.store().keys().await?;
        let counts = self.merge.store().counts().await?;
        let plan = plan_recovery(&self.targets, &primary, &stored_keys);

        let mut report = StatusReport {
            targets: self.targets.len(),
            completed: 0,
            failed: 0,
            pending: 0,
            stored: counts.total,
            stored_complete: counts.complete,
            soft_block_aborts: primary.soft_block_aborts + recovery.soft_block_aborts,
            last_batch_at: primary.last_batch_at.into_iter().chain(recovery.last_batch_at).max(),
            recovery_candidates: plan.targets.len(),
            recovery_completed: 0,
            recovery_failed: recovery.failed_among(&plan.targets),
        };
        for target in &self.targets {
            match primary.status(target) {
                TargetStatus::Completed => report.completed += 1,
                TargetStatus::Failed => report.failed += 1,
                TargetStatus::Pending => report.pending += 1,
            }
        }
        report.recovery_completed = plan
            .targets
            .iter()
            .filter(|t| recovery.completed().contains(*t))
            .count();
        Ok(report)
    }
}
