//! Fetch identities and per-batch rotation.

use rand::Rng;
use thiserror::Error;

/// Real browser user agents.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Firefox on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

pub fn default_user_agents() -> Vec<String> {
    DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
}

/// The client fingerprint presented for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
}

impl Identity {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

/// The identity pool had no usable entries.
#[derive(Debug, Error)]
#[error("identity pool is empty")]
pub struct EmptyPool;

/// Picks identities from a static pool, never returning the previous one
/// twice in a row unless the pool has a single entry.
#[derive(Debug, Clone)]
pub struct IdentityRotator {
    pool: Vec<String>,
    last: Option<usize>,
}

impl IdentityRotator {
    /// Build a rotator over `pool`. Blank entries and duplicates are dropped.
    pub fn new(pool: Vec<String>) -> Result<Self, EmptyPool> {
        let mut unique: Vec<String> = Vec::with_capacity(pool.len());
        for ua in pool {
            let ua = ua.trim().to_string();
            if !ua.is_empty() && !unique.contains(&ua) {
                unique.push(ua);
            }
        }
        if unique.is_empty() {
            return Err(EmptyPool);
        }
        Ok(Self {
            pool: unique,
            last: None,
        })
    }

    /// Rotator over [`DEFAULT_USER_AGENTS`].
    pub fn with_default_pool() -> Self {
        Self {
            pool: default_user_agents(),
            last: None,
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Uniform choice over the pool minus the last-used entry, or over the
    /// whole pool when that leaves nothing.
    pub fn next(&mut self) -> Identity {
        let candidates: Vec<usize> = (0..self.pool.len())
            .filter(|i| Some(*i) != self.last)
            .collect();
        let mut rng = rand::rng();
        let index = if candidates.is_empty() {
            rng.random_range(0..self.pool.len())
        } else {
            candidates[rng.random_range(0..candidates.len())]
        };
        self.last = Some(index);
        Identity::new(self.pool[index].clone())
    }
}

impl Default for IdentityRotator {
    fn default() -> Self {
        Self::with_default_pool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_repeats_previous_identity() {
        let mut rotator = IdentityRotator::new(vec!["ua-1".into(), "ua-2".into(), "ua-3".into()]).unwrap();
        let mut previous = rotator.next();
        for _ in 0..200 {
            let current = rotator.next();
            assert_ne!(current, previous);
            previous = current;
        }
    }

    #[test]
    fn test_two_entry_pool_alternates() {
        let mut rotator = IdentityRotator::new(vec!["a".into(), "b".into()]).unwrap();
        let first = rotator.next();
        let second = rotator.next();
        let third = rotator.next();
        assert_ne!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_single_entry_pool_reuses() {
        let mut rotator = IdentityRotator::new(vec!["only".into()]).unwrap();
        assert_eq!(rotator.next().user_agent, "only");
        assert_eq!(rotator.next().user_agent, "only");
    }

    #[test]
    fn test_duplicates_do_not_defeat_rotation() {
        let mut rotator = IdentityRotator::new(vec!["a".into(), "a".into(), "b".into()]).unwrap();
        assert_eq!(rotator.len(), 2);
        let first = rotator.next();
        assert_ne!(rotator.next(), first);
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(IdentityRotator::new(Vec::new()).is_err());
        assert!(IdentityRotator::new(vec!["  ".into(), String::new()]).is_err());
    }

    #[test]
    fn test_default_pool() {
        let mut rotator = IdentityRotator::with_default_pool();
        assert_eq!(rotator.len(), DEFAULT_USER_AGENTS.len());
        assert!(rotator.next().user_agent.contains("Mozilla"));
    }
}
