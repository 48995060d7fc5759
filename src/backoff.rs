use std::time::Duration;

use rand::Rng;

/// Computes how long to wait before a retry.
///
/// `attempt` is zero-based: `0` is the first retry after the initial request.
/// Implementations must be pure apart from randomness so one instance can be
/// shared by every request of a client.
pub trait Backoff: Send + Sync {
    fn next(&self, attempt: i64) -> Duration;
}

/// Exponential backoff with additive jitter:
/// `min(initial_delay * exponent_factor^attempt, max_delay) + rand(0..=max_jitter)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    exponent_factor: f64,
    max_jitter: Duration,
}

impl ExponentialBackoff {
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        exponent_factor: f64,
        max_jitter: Duration,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            exponent_factor,
            max_jitter,
        }
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// Capped delay for `attempt`, before jitter.
    ///
    /// A zero initial delay stays zero for every attempt. Otherwise anything
    /// that is NaN, infinite, above the cap or too large for a `Duration`
    /// becomes `max_delay`; a negative result becomes zero.
    fn base_delay(&self, attempt: i64) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.max(0)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_nanos() as f64 * self.exponent_factor.powi(exponent);

        if !base.is_finite() || base > self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        if base <= 0.0 {
            return Duration::ZERO;
        }
        if base < u64::MAX as f64 {
            return Duration::from_nanos(base as u64).min(self.max_delay);
        }

        Duration::try_from_secs_f64(base / 1e9)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let max = u64::try_from(self.max_jitter.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rand::rng().random_range(0..=max))
    }
}

impl Backoff for ExponentialBackoff {
    fn next(&self, attempt: i64) -> Duration {
        self.base_delay(attempt).saturating_add(self.jitter())
    }
}

/// Waits the same amount before every retry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for ConstantBackoff {
    fn next(&self, _attempt: i64) -> Duration {
        self.delay
    }
}

impl<B: Backoff + ?Sized> Backoff for std::sync::Arc<B> {
    fn next(&self, attempt: i64) -> Duration {
        (**self).next(attempt)
    }
}
