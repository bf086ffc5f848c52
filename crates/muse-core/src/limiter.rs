//! Admission control for the reasoning service
//!
//! Every reasoning call in a run goes through one [`RateLimiter`]:
//! - a fair semaphore caps calls in flight, later callers queue FIFO
//! - an optional token bucket caps estimated tokens per minute
//! - retryable failures back off exponentially, fatal ones return at once
//!
//! A permit is held only while an attempt runs; backoff sleeps release it.

use crate::cancel::CancellationToken;
use crate::error::{CallError, ServiceError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Limiter settings (`[limiter]` in the config file)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Calls allowed in flight at once
    pub max_concurrent: usize,
    /// Retries after the first attempt on retryable errors
    pub max_retries: u32,
    /// First backoff delay
    pub base_delay_ms: u64,
    /// Backoff ceiling
    pub max_delay_ms: u64,
    /// Estimated token budget per minute, unlimited when absent
    pub tokens_per_minute: Option<u64>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            tokens_per_minute: None,
        }
    }
}

impl LimiterConfig {
    /// Retry policy described by this config
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// Exponential backoff for retryable service errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled per retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        LimiterConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failures` failed attempts
    ///
    /// `min(base * 2^failures, max)`, raised to `hint` when the service
    /// asked for a longer wait, and never above `max`.
    #[must_use]
    pub fn delay_for(&self, failures: u32, hint: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(failures);
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        match hint {
            Some(hint) => backoff.max(hint).min(self.max_delay),
            None => backoff,
        }
    }
}

/// Rough token estimate for a prompt payload
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Limiter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    /// Attempts executing right now
    pub in_flight: usize,
    /// Highest `in_flight` observed
    pub peak_in_flight: usize,
    /// Attempts started, retries included
    pub calls_started: u64,
    /// Backoff-and-retry cycles
    pub retries: u64,
    /// Retries caused by throttling
    pub throttled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls_started: AtomicU64,
    retries: AtomicU64,
    throttled: AtomicU64,
}

/// Decrements `in_flight` when an attempt ends, however it ends
struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        counters.calls_started.fetch_add(1, Ordering::Relaxed);
        let now = counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Continuously refilled token bucket
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    available: f64,
    per_second: f64,
    refreshed: Instant,
}

impl TokenBucket {
    #[allow(clippy::cast_precision_loss)]
    fn per_minute(tokens: u64) -> Self {
        let capacity = tokens.max(1) as f64;
        Self {
            capacity,
            available: capacity,
            per_second: capacity / 60.0,
            refreshed: Instant::now(),
        }
    }

    /// Take `cost` tokens, or report how long until they are available
    #[allow(clippy::cast_precision_loss)]
    fn try_take(&mut self, cost: u64) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.refreshed).as_secs_f64();
        self.available = (self.available + elapsed * self.per_second).min(self.capacity);
        self.refreshed = now;

        let cost = (cost as f64).min(self.capacity);
        if self.available >= cost {
            self.available -= cost;
            Ok(())
        } else {
            Err(Duration::from_secs_f64(
                (cost - self.available) / self.per_second,
            ))
        }
    }
}

/// Shared admission control for reasoning calls
#[derive(Debug)]
pub struct RateLimiter {
    permits: Semaphore,
    max_concurrent: usize,
    policy: RetryPolicy,
    budget: Option<Mutex<TokenBucket>>,
    counters: Counters,
}

impl RateLimiter {
    /// Limiter allowing `max_concurrent` calls with the default retry policy
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_policy(max_concurrent, RetryPolicy::default())
    }

    /// Limiter with an explicit retry policy
    #[must_use]
    pub fn with_policy(max_concurrent: usize, policy: RetryPolicy) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            policy,
            budget: None,
            counters: Counters::default(),
        }
    }

    /// Limiter described by `config`
    #[must_use]
    pub fn from_config(config: &LimiterConfig) -> Self {
        let limiter = Self::with_policy(config.max_concurrent, config.retry_policy());
        match config.tokens_per_minute {
            Some(tokens) => limiter.with_token_budget(tokens),
            None => limiter,
        }
    }

    /// Add a tokens-per-minute budget
    #[must_use]
    pub fn with_token_budget(mut self, tokens_per_minute: u64) -> Self {
        self.budget = Some(Mutex::new(TokenBucket::per_minute(tokens_per_minute)));
        self
    }

    /// Concurrency ceiling
    #[inline]
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Retry policy in use
    #[inline]
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::Acquire),
            calls_started: self.counters.calls_started.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
        }
    }

    /// Run `op` under the concurrency ceiling with retry and backoff
    ///
    /// `op` is invoked once per attempt.
    ///
    /// # Errors
    /// - [`CallError::Cancelled`] if `cancel` fires at any point
    /// - [`CallError::RetriesExhausted`] when retryable errors outlast the policy
    /// - [`CallError::Service`] on the first non-retryable error
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, op: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.run_weighted(cancel, 0, op).await
    }

    /// [`run`](Self::run), charging `cost` estimated tokens per attempt
    ///
    /// # Errors
    /// Same as [`run`](Self::run).
    pub async fn run_weighted<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        cost: u64,
        mut op: F,
    ) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut failures = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(CallError::Cancelled);
            }
            self.await_budget(cancel, cost).await?;

            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CallError::Cancelled),
                permit = self.permits.acquire() => permit.map_err(|_| CallError::Cancelled)?,
            };
            debug!(
                attempt = failures + 1,
                available = self.permits.available_permits(),
                "reasoning call admitted"
            );

            let outcome = {
                let _slot = InFlight::enter(&self.counters);
                cancel.run_until_cancelled(op()).await
            };
            drop(permit);
            let Some(outcome) = outcome else {
                return Err(CallError::Cancelled);
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(CallError::Service(err)),
            };

            if failures >= self.policy.max_retries {
                warn!(attempts = failures + 1, error = %err, "reasoning call retries exhausted");
                return Err(CallError::RetriesExhausted {
                    attempts: failures + 1,
                    last: err,
                });
            }

            let delay = self.policy.delay_for(failures, err.retry_after());
            failures += 1;
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            if matches!(err, ServiceError::Throttled { .. }) {
                self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            }
            warn!(
                attempt = failures,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "retrying reasoning call"
            );

            if cancel
                .run_until_cancelled(tokio::time::sleep(delay))
                .await
                .is_none()
            {
                return Err(CallError::Cancelled);
            }
        }
    }

    async fn await_budget(&self, cancel: &CancellationToken, cost: u64) -> Result<(), CallError> {
        let Some(budget) = &self.budget else {
            return Ok(());
        };
        if cost == 0 {
            return Ok(());
        }
        loop {
            let wait = budget.lock().try_take(cost);
            match wait {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    debug!(cost, wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "waiting for token budget");
                    if cancel
                        .run_until_cancelled(tokio::time::sleep(wait))
                        .await
                        .is_none()
                    {
                        return Err(CallError::Cancelled);
                    }
                }
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&LimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        };
        let delays: Vec<_> = (0..6).map(|k| policy.delay_for(k, None)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn retry_after_hint_raises_but_never_exceeds_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(60))),
            Duration::from_secs(8)
        );
        assert_eq!(
            policy.delay_for(2, Some(Duration::from_millis(10))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn ceiling_bounds_concurrent_calls() {
        let limiter = Arc::new(RateLimiter::with_policy(3, fast_policy(0)));
        let cancel = CancellationToken::new();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let limiter = Arc::clone(&limiter);
                let cancel = cancel.clone();
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    limiter
                        .run(&cancel, || {
                            let current = Arc::clone(&current);
                            let peak = Arc::clone(&peak);
                            async move {
                                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                                peak.fetch_max(now, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(5)).await;
                                current.fetch_sub(1, Ordering::SeqCst);
                                Ok::<_, ServiceError>(i)
                            }
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.expect("task joined").expect("call succeeded");
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        let stats = limiter.stats();
        assert!(stats.peak_in_flight <= 3);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.calls_started, 20);
    }

    #[tokio::test]
    async fn retryable_errors_are_retried_until_success() {
        let limiter = RateLimiter::with_policy(2, fast_policy(2));
        let calls = AtomicUsize::new(0);
        let result = limiter
            .run(&CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => Err(ServiceError::Throttled { retry_after: None }),
                        1 => Err(ServiceError::Transient("reset".into())),
                        _ => Ok("done"),
                    }
                }
            })
            .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = limiter.stats();
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.throttled, 1);
    }

    #[tokio::test]
    async fn retries_stop_at_ceiling() {
        let limiter = RateLimiter::with_policy(1, fast_policy(2));
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = limiter
            .run(&CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::Transient("down".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(CallError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let limiter = RateLimiter::with_policy(1, fast_policy(2));
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = limiter
            .run(&CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::Malformed("not json".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result,
            Err(CallError::Service(ServiceError::Malformed("not json".into())))
        );
    }

    #[tokio::test]
    async fn cancelled_while_queued_never_starts() {
        let limiter = Arc::new(RateLimiter::with_policy(1, fast_policy(0)));
        let cancel = CancellationToken::new();
        let started = Arc::new(AtomicUsize::new(0));

        let holder = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            let started = Arc::clone(&started);
            async move {
                limiter
                    .run(&cancel, || {
                        started.fetch_add(1, Ordering::SeqCst);
                        std::future::pending::<Result<(), ServiceError>>()
                    })
                    .await
            }
        });
        while limiter.stats().in_flight == 0 {
            tokio::task::yield_now().await;
        }

        let queued = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            let started = Arc::clone(&started);
            async move {
                limiter
                    .run(&cancel, || {
                        started.fetch_add(1, Ordering::SeqCst);
                        async { Ok::<_, ServiceError>(()) }
                    })
                    .await
            }
        });
        tokio::task::yield_now().await;
        cancel.cancel();

        assert_eq!(holder.await.expect("joined"), Err(CallError::Cancelled));
        assert_eq!(queued.await.expect("joined"), Err(CallError::Cancelled));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(limiter.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn cancelled_during_backoff_stops_retrying() {
        let limiter = RateLimiter::with_policy(
            1,
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_secs(30),
                max_delay: Duration::from_secs(30),
            },
        );
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let trigger = cancel.clone();
        let result: Result<(), _> = limiter
            .run(&cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                trigger.cancel();
                async { Err(ServiceError::Transient("flaky".into())) }
            })
            .await;
        assert_eq!(result, Err(CallError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn token_budget_delays_over_budget_calls() {
        let limiter = RateLimiter::with_policy(4, fast_policy(0)).with_token_budget(600);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter
            .run_weighted(&cancel, 600, || async { Ok::<_, ServiceError>(()) })
            .await
            .expect("first call fits the bucket");
        assert!(start.elapsed() < Duration::from_millis(1));

        // Bucket is empty; 100 tokens refill at 10/s.
        limiter
            .run_weighted(&cancel, 100, || async { Ok::<_, ServiceError>(()) })
            .await
            .expect("second call waits for refill");
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[test]
    fn from_config_applies_settings() {
        let config = LimiterConfig {
            max_concurrent: 0,
            tokens_per_minute: Some(1_000),
            ..LimiterConfig::default()
        };
        let limiter = RateLimiter::from_config(&config);
        assert_eq!(limiter.max_concurrent(), 1);
        assert_eq!(limiter.policy(), RetryPolicy::default());
        assert!(limiter.budget.is_some());
    }
}
