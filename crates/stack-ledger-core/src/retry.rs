//! Bounded retry with exponential backoff
//!
//! Blocking sleeps are the only suspension points in the core, so the
//! sleeper is a trait: production uses [`ThreadSleeper`], tests record the
//! requested delays instead of waiting.

use std::fmt::Display;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use stack_ledger_common::defaults::{
    DEFAULT_BASE_DELAY_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_SECS,
};
use tracing::{info, warn};

/// Retry limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total invocations, including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Cap for exponential growth
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(DEFAULT_BASE_DELAY_SECS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Delays between attempts: `min(base * 2^(n-1), max)` for n = 1..
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let max_delay = self.max_delay;
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .build();

        backoff.map(move |delay| delay.min(max_delay))
    }
}

/// Something that can block for a while
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` invocations failed.
///
/// `op` receives the 1-based attempt number. The last failure is returned
/// as-is. A policy with zero attempts still runs `op` once.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stack_ledger::retry::{RetryPolicy, Sleeper, retry_with_backoff};
///
/// struct NoSleep;
/// impl Sleeper for NoSleep {
///     fn sleep(&self, _: Duration) {}
/// }
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(60));
/// let result: Result<u32, String> = retry_with_backoff(&policy, "ping", &NoSleep, |attempt| {
///     if attempt < 3 { Err(format!("attempt {attempt} failed")) } else { Ok(attempt) }
/// });
/// assert_eq!(result, Ok(3));
/// ```
pub fn retry_with_backoff<T, E, F>(
    policy: &RetryPolicy,
    description: &str,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delays = policy.delays();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        info!(operation = %description, attempt, max_attempts, "Attempting operation");

        match op(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation = %description, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(
                    operation = %description,
                    attempts = attempt,
                    error = %e,
                    "Operation failed, giving up"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = delays.next().unwrap_or(policy.max_delay);
                warn!(
                    operation = %description,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                sleeper.sleep(delay);
            }
        }
    }
}
