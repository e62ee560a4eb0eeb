//! Retry-with-delays utility (spec §4.C).
//!
//! The corpus calls into this with a fixed per-attempt delay both for lock
//! acquisition contention and for transient provider errors; this module
//! preserves that fixed-delay contract while allowing callers who want
//! growth to configure one via [`RetryConfig::exponential`].

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    /// Multiplier applied to `delay` after each failed attempt. `1.0` (the
    /// default) reproduces the corpus's fixed-delay behavior exactly.
    pub multiplier: f64,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(500),
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    pub fn exponential(max_attempts: u32, delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            multiplier,
            max_delay,
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        if self.multiplier <= 1.0 {
            return self.delay;
        }
        let scaled = self.delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

/// Invokes `op` until it succeeds or `config.max_attempts` is exhausted,
/// waiting `config`'s delay (fixed by default) between attempts.
///
/// Invariant (spec §8.6): `op` is invoked at most `max_attempts` times; if
/// the k-th invocation succeeds, no further invocations occur.
pub async fn retry<T, E, F, Fut>(label: &str, config: &RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= config.max_attempts {
                    warn!(label, attempt, %error, "retry exhausted");
                    return Err(error);
                }
                let delay = config.delay_after(attempt - 1);
                debug!(label, attempt, ?delay, %error, "retrying after error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Backoff for a job that keeps failing its own preconditions (spec §5,
/// starvation): grows with the job's attempt counter so the watch loop
/// doesn't spin re-picking the same job every event cycle.
pub fn backoff_for_attempt(attempt: u32, base: Duration, ceiling: Duration) -> Duration {
    let scaled = base.as_secs_f64() * 2f64.powi(attempt.min(10) as i32);
    Duration::from_secs_f64(scaled).min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_success_without_further_invocations() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::fixed(5, Duration::from_millis(1));

        let result: Result<u32, String> = retry("test", &config, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 2 {
                    Err("not yet".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fails_with_last_error_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig::fixed(3, Duration::from_millis(1));

        let result: Result<u32, String> = retry("test", &config, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<u32, _>("still failing".to_string()) }
        })
        .await;

        assert_eq!(result, Err("still failing".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_grows_then_caps() {
        let base = Duration::from_millis(100);
        let ceiling = Duration::from_secs(5);
        assert!(backoff_for_attempt(0, base, ceiling) <= backoff_for_attempt(3, base, ceiling));
        assert_eq!(backoff_for_attempt(100, base, ceiling), ceiling);
    }
}
