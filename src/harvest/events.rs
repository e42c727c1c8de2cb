//! Progress events emitted by the scheduler.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::models::{OutcomeKind, PassKind, RunSummary};

/// Events emitted while a pass runs.
#[derive(Debug, Clone)]
pub enum HarvestEvent {
    PassStarted {
        pass: PassKind,
        pending: usize,
        total: usize,
    },
    BatchStarted {
        batch: usize,
        size: usize,
        identity: String,
    },
    TargetStarted {
        target: String,
    },
    /// `complete` is set for successes only.
    TargetFinished {
        target: String,
        kind: OutcomeKind,
        complete: Option<bool>,
    },
    /// The batch was cut short; `remaining` targets stay pending.
    SoftBlocked {
        target: String,
        reason: String,
        remaining: usize,
    },
    Cooldown {
        duration: Duration,
        escalated: bool,
    },
    PassFinished {
        summary: RunSummary,
    },
}

/// Optional event channel. Events are dropped when nobody listens.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<HarvestEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<HarvestEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub async fn emit(&self, event: HarvestEvent) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event).await;
        }
    }
}
