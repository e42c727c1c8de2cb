//! Batch, pacing and retry policy.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default number of targets per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Inclusive range of delays in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: u64,
    pub max: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min: 0, max: 0 };

    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// Uniform draw from the range.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return Duration::from_millis(self.min);
        }
        Duration::from_millis(rand::rng().random_range(self.min..=self.max))
    }

    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min)
    }
}

/// Multipliers applied to the cooldown maximum after a soft block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorRange {
    pub min: f64,
    pub max: f64,
}

impl FactorRange {
    /// `[min × base, max × base]`.
    pub fn apply(&self, base: u64) -> DelayRange {
        DelayRange::new(
            (base as f64 * self.min).round() as u64,
            (base as f64 * self.max).round() as u64,
        )
    }
}

/// What happens to the target whose fetch came back soft-blocked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftBlockPolicy {
    /// Leave it pending so the next batch retries it first.
    #[default]
    KeepPending,
    /// Record it as failed so the recovery pass retries it.
    MarkFailed,
}

impl SoftBlockPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkFailed => "mark_failed",
            Self::KeepPending => "keep_pending",
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_request_delay() -> DelayRange {
    DelayRange::new(2_000, 5_000)
}

fn default_batch_cooldown() -> DelayRange {
    DelayRange::new(30_000, 60_000)
}

fn default_soft_block_factor() -> FactorRange {
    FactorRange { min: 1.5, max: 2.0 }
}

fn default_attempt_timeout() -> u64 {
    60
}

/// `[harvest]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay before every fetch.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: DelayRange,
    /// Pause between batches.
    #[serde(default = "default_batch_cooldown")]
    pub batch_cooldown_ms: DelayRange,
    /// Cooldown after a soft block, as multiples of `batch_cooldown_ms.max`.
    #[serde(default = "default_soft_block_factor")]
    pub soft_block_factor: FactorRange,
    /// In-place retries of a transient error before marking it failed.
    #[serde(default)]
    pub immediate_retries: u32,
    /// Hard limit on one fetch attempt, in seconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    #[serde(default)]
    pub soft_blocked_target: SoftBlockPolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            request_delay_ms: default_request_delay(),
            batch_cooldown_ms: default_batch_cooldown(),
            soft_block_factor: default_soft_block_factor(),
            immediate_retries: 0,
            attempt_timeout_secs: default_attempt_timeout(),
            soft_blocked_target: SoftBlockPolicy::default(),
        }
    }
}

impl HarvestConfig {
    /// Same policy with every delay set to zero.
    pub fn unpaced(self) -> Self {
        Self {
            request_delay_ms: DelayRange::ZERO,
            batch_cooldown_ms: DelayRange::ZERO,
            ..self
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Cooldown range used after a soft block.
    pub fn soft_block_cooldown(&self) -> DelayRange {
        self.soft_block_factor.apply(self.batch_cooldown_ms.max)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "harvest.batch_size must be at least 1".to_string(),
            ));
        }
        if !self.request_delay_ms.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "harvest.request_delay_ms min ({}) exceeds max ({})",
                self.request_delay_ms.min, self.request_delay_ms.max
            )));
        }
        if !self.batch_cooldown_ms.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "harvest.batch_cooldown_ms min ({}) exceeds max ({})",
                self.batch_cooldown_ms.min, self.batch_cooldown_ms.max
            )));
        }
        let factor = self.soft_block_factor;
        if factor.min < 1.0 || factor.min > factor.max {
            return Err(ConfigError::Invalid(format!(
                "harvest.soft_block_factor must satisfy 1.0 <= min <= max (got {} and {})",
                factor.min, factor.max
            )));
        }
        if self.attempt_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "harvest.attempt_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
