//! Fixed-delay retry for transient store contention.
//!
//! Mutations against a shared store can hit a concurrent holder. Rather than
//! surfacing that to the transport, the engine waits a fixed delay and
//! re-runs the whole transaction. The production default is uncapped; tests
//! inject a zero-delay capped policy.

use std::time::Duration;

use tracing::debug;

use dedupio_common::RetryConfig;

use crate::store::{StoreError, StoreResult};

/// Re-runs an operation while it fails with a transient error
/// (`StoreError::is_transient`). Non-transient errors surface immediately.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Zero-delay bounded policy for tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: Some(max_attempts),
        }
    }

    pub(crate) fn run<T>(&self, mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
        let mut attempts: u32 = 0;
        loop {
            match op() {
                Err(e) if e.is_transient() => {
                    attempts += 1;
                    if let Some(cap) = self.max_attempts
                        && attempts >= cap
                    {
                        return Err(e);
                    }
                    debug!(attempts, error = %e, "store contended, retrying");
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                }
                other => return other,
            }
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_passes_through() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.run(|| Ok(42)).unwrap(), 42);
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let policy = RetryPolicy::immediate(5);
        let mut calls = 0;
        let value = policy
            .run(|| {
                calls += 1;
                if calls < 4 {
                    Err(StoreError::Contended("busy".into()))
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(value, 4);
    }

    #[test]
    fn test_attempt_cap_surfaces_the_error() {
        let policy = RetryPolicy::immediate(3);
        let mut calls = 0;
        let result: StoreResult<()> = policy.run(|| {
            calls += 1;
            Err(StoreError::Contended("busy".into()))
        });
        assert!(matches!(result, Err(StoreError::Contended(_))));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_fatal_errors_are_not_retried() {
        let policy = RetryPolicy::immediate(10);
        let mut calls = 0;
        let result: StoreResult<()> = policy.run(|| {
            calls += 1;
            Err(StoreError::RefcountUnderflow(7))
        });
        assert!(matches!(result, Err(StoreError::RefcountUnderflow(7))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_default_policy_is_uncapped() {
        let policy = RetryPolicy::default();
        assert!(policy.max_attempts.is_none());
        assert_eq!(policy.delay, Duration::from_millis(100));
    }
}
