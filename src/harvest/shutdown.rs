//! Cooperative interrupt for long-running passes.
//!
//! The scheduler checks the signal between targets and races it against
//! its pacing and cooldown sleeps. A fetch in flight is never cancelled.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Sending half. Dropping it without triggering means "never".
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half, cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        channel().1
    }

    /// A signal fired by Ctrl-C.
    pub fn ctrl_c() -> Self {
        let (trigger, shutdown) = channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping after the current target");
                trigger.trigger();
            }
        });
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `duration` unless interrupted first.
    /// Returns `false` if the signal fired.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }

        let mut rx = self.rx.clone();
        let fired = async move {
            loop {
                if rx.changed().await.is_err() {
                    // Trigger dropped; it can no longer fire
                    std::future::pending::<()>().await;
                }
                if *rx.borrow() {
                    return;
                }
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = fired => false,
        }
    }
}
