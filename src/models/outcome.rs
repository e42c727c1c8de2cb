//! Classified result of a single fetch attempt.

use serde::{Deserialize, Serialize};

use super::Record;

/// Exactly one outcome is produced per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Record),
    /// The source reports the target does not exist. Terminal.
    NotFound,
    /// Rate limit, quota page or interstitial. Aborts the batch.
    SoftBlocked(String),
    /// Network failure or timeout.
    TransientError(String),
    /// Content arrived but could not be turned into a record.
    FatalError(String),
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success(_) => OutcomeKind::Success,
            Self::NotFound => OutcomeKind::NotFound,
            Self::SoftBlocked(_) => OutcomeKind::SoftBlocked,
            Self::TransientError(_) => OutcomeKind::TransientError,
            Self::FatalError(_) => OutcomeKind::FatalError,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::SoftBlocked(r) | Self::TransientError(r) | Self::FatalError(r) => Some(r),
            Self::Success(_) | Self::NotFound => None,
        }
    }
}

/// Outcome discriminant, used in events and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    NotFound,
    SoftBlocked,
    TransientError,
    FatalError,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::SoftBlocked => "soft_blocked",
            Self::TransientError => "transient_error",
            Self::FatalError => "fatal_error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "not_found" => Some(Self::NotFound),
            "soft_blocked" => Some(Self::SoftBlocked),
            "transient_error" => Some(Self::TransientError),
            "fatal_error" => Some(Self::FatalError),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_name_matches_as_str() {
        let json = serde_json::to_string(&OutcomeKind::SoftBlocked).unwrap();
        assert_eq!(json, "\"soft_blocked\"");
        assert_eq!(OutcomeKind::from_str("blocked"), None);
    }

    #[test]
    fn test_reason_only_on_failures() {
        assert_eq!(Outcome::NotFound.reason(), None);
        assert_eq!(
            Outcome::SoftBlocked("quota".to_string()).reason(),
            Some("quota")
        );
    }
}
