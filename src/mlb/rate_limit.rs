//! Request throttling and bounded retry for outbound API calls.
//!
//! The throttle is an owned [`RateLimiter`] holding the instant of the last
//! request. Retry decisions are explicit [`Attempt`] values consumed by
//! [`run_with_retry`], and every wait goes through a [`Clock`] so tests can
//! observe them without sleeping.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{PitcherError, Result};

/// Source of time and the only place the pipeline suspends.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// `Clock` backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Enforces a minimum interval between consecutive requests.
pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self::with_clock(interval, Arc::new(TokioClock))
    }

    pub fn with_clock(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
            clock,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Wait until the interval since the previous request has elapsed, then
    /// record this request.
    ///
    /// The lock is held across the wait so concurrent callers queue up
    /// instead of all firing when the interval expires.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = self.clock.now().saturating_duration_since(prev);
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "rate limit: waiting");
                self.clock.sleep(wait).await;
            }
        }
        *last = Some(self.clock.now());
    }

    /// Record a request without waiting; fails if it would break the interval.
    pub async fn try_acquire(&self) -> Result<()> {
        let mut last = self.last_request.lock().await;
        let now = self.clock.now();
        if let Some(prev) = *last {
            let elapsed = now.saturating_duration_since(prev);
            if elapsed < self.interval {
                return Err(PitcherError::RateLimitExceeded {
                    retry_in_ms: (self.interval - elapsed).as_millis() as u64,
                });
            }
        }
        *last = Some(now);
        Ok(())
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub initial_backoff: Duration,
    /// Ceiling of the computed backoff schedule.
    pub max_backoff: Duration,
    /// Longest server-requested `Retry-After` the client will wait out.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2.0,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            max_retry_after: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_base.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    /// Transient failure; `retry_after` overrides the backoff schedule.
    Retryable {
        error: PitcherError,
        retry_after: Option<Duration>,
    },
    Fatal(PitcherError),
}

/// Run `op` until it succeeds, fails fatally, or the attempt ceiling is hit.
///
/// A server-provided `retry_after` is waited in full; one longer than the
/// policy's `max_retry_after` ends the run with the attempt's error instead.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, clock: &dyn Clock, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Attempt::Success(value) => return Ok(value),
            Attempt::Fatal(error) => return Err(error),
            Attempt::Retryable { error, retry_after } => {
                if attempt >= max_attempts {
                    warn!(attempt, error = %error, "giving up after final attempt");
                    return Err(error);
                }
                let wait = match retry_after {
                    Some(requested) if requested > policy.max_retry_after => {
                        warn!(
                            attempt,
                            retry_after_s = requested.as_secs(),
                            limit_s = policy.max_retry_after.as_secs(),
                            error = %error,
                            "server asked to wait longer than allowed, giving up"
                        );
                        return Err(error);
                    }
                    Some(requested) => requested,
                    None => policy.delay_for(attempt),
                };
                warn!(
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %error,
                    "transient failure, backing off"
                );
                clock.sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
