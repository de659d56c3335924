//! Linear-backoff retry for transient collaborator failures.

use std::time::Duration;

use tracing::warn;

use crate::domain::error::BtoptError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps; used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// Only transient errors are retried. Exhausting the attempts on a transient
/// failure yields `DataUnavailable` for `symbol`.
pub fn retry_with_backoff<T, F>(
    policy: &RetryPolicy,
    symbol: &str,
    mut op: F,
) -> Result<T, BtoptError>
where
    F: FnMut() -> Result<T, BtoptError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(symbol, attempt, ?delay, error = %e, "transient failure, retrying");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                return Err(BtoptError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: format!("gave up after {attempts} attempts: {e}"),
                });
            }
            Err(e) => return Err(e),
        }
    }
}
