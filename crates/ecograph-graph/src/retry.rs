//! Exponential-backoff retry for transient store failures.
//!
//! The policy knows nothing about the transport: callers hand it a
//! zero-argument operation and a predicate that decides which failures are
//! worth another attempt.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;

use ecograph_core::error::BoxError;
use ecograph_core::GraphError;

/// Retry settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Multiplier applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

/// How a retried operation ultimately failed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The predicate classified the failure as not retryable.
    Permanent(E),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Collapse into the shared taxonomy. Exhaustion always becomes a
    /// connection error wrapping the last cause; permanent failures are
    /// classified by the caller.
    pub fn into_graph_error(self, permanent: impl FnOnce(E) -> GraphError) -> GraphError {
        match self {
            Self::Permanent(e) => permanent(e),
            Self::Exhausted { attempts, last } => GraphError::connection_caused_by(
                format!("All {attempts} attempts failed: {last}"),
                BoxError::from(last),
            ),
        }
    }
}

/// Ceiling for a single backoff sleep.
pub const MAX_DELAY: Duration = Duration::from_secs(300);

/// Explicit retry policy: attempts, base delay and backoff factor, with an
/// optional time budget for retrying.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff_factor: f64,
    budget: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_factor: if backoff_factor.is_finite() && backoff_factor >= 1.0 {
                backoff_factor
            } else {
                1.0
            },
            budget: None,
        }
    }

    /// Stop retrying once another backoff would end past `budget`, measured
    /// from the first attempt. A running attempt is never cut short.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Same policy with a different initial delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep durations between consecutive attempts (`max_attempts - 1` entries).
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::with_capacity(self.max_attempts.saturating_sub(1) as usize);
        let mut delay = self.base_delay;
        for _ in 1..self.max_attempts {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let ceiling = MAX_DELAY.max(self.base_delay);
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_factor)
            .map_or(ceiling, |next| next.min(ceiling))
    }

    fn over_budget(&self, started: Instant, delay: Duration) -> bool {
        self.budget
            .is_some_and(|budget| started.elapsed().saturating_add(delay) > budget)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts (or the
    /// retry budget) run out.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        label: &str,
        is_retryable: P,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let started = Instant::now();
        let mut delay = self.base_delay;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(op = label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !is_retryable(&e) => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= self.max_attempts || self.over_budget(started, delay) => {
                    tracing::error!(
                        op = label,
                        attempts = attempt,
                        error = %e,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        op = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.backoff_factor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum Fault {
        #[error("service unavailable")]
        Unavailable,
        #[error("syntax error")]
        Syntax,
    }

    fn retryable(f: &Fault) -> bool {
        matches!(f, Fault::Unavailable)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1), 2.0)
    }

    #[test]
    fn delays_grow_by_factor() {
        assert_eq!(
            policy().delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert!(RetryPolicy::new(1, Duration::from_secs(1), 2.0)
            .delays()
            .is_empty());
    }

    #[test]
    fn degenerate_config_is_clamped() {
        let p = RetryPolicy::new(0, Duration::from_millis(10), 0.5);
        assert_eq!(p.max_attempts(), 1);
        let p = RetryPolicy::new(3, Duration::from_millis(10), 0.5);
        assert_eq!(p.delays(), vec![Duration::from_millis(10); 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_sleeps() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result = policy()
            .run("test", retryable, move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(Fault::Unavailable)
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of (virtual) backoff, nothing more.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), _> = policy()
            .run("test", retryable, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Fault::Unavailable)
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_maps_to_connection_error() {
        let err = policy()
            .run("test", retryable, || async { Err::<(), _>(Fault::Unavailable) })
            .await
            .unwrap_err()
            .into_graph_error(|e| GraphError::query(e.to_string()));

        assert!(matches!(err, GraphError::Connection { .. }));
        assert!(err.to_string().contains("All 3 attempts failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let err = policy()
            .run("test", retryable, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Fault::Syntax)
            })
            .await
            .unwrap_err()
            .into_graph_error(|e| GraphError::query(e.to_string()));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(err, GraphError::Query { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_backoff_factor_saturates() {
        let p = RetryPolicy::new(4, Duration::from_secs(1), 1e20);
        assert_eq!(
            p.delays(),
            vec![Duration::from_secs(1), MAX_DELAY, MAX_DELAY]
        );

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = p
            .run("test", retryable, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Fault::Unavailable)
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 4, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_stops_further_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        // Second backoff (2s) would end at 3s, past the 2.5s budget.
        let result: Result<(), _> = RetryPolicy::new(10, Duration::from_secs(1), 2.0)
            .with_budget(Duration::from_millis(2_500))
            .run("test", retryable, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Fault::Unavailable)
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_does_not_cancel_a_slow_attempt() {
        let start = Instant::now();

        let result = RetryPolicy::new(3, Duration::from_secs(1), 2.0)
            .with_budget(Duration::from_secs(1))
            .run("test", retryable, || async {
                tokio::time::sleep(Duration::from_secs(45)).await;
                Ok::<_, Fault>("rows")
            })
            .await;

        assert_eq!(result.unwrap(), "rows");
        assert_eq!(start.elapsed(), Duration::from_secs(45));
    }
}
