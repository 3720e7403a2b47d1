//! Exponential reconnect backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Growth factor between consecutive attempts.
pub const DEFAULT_MULTIPLIER: f64 = 1.6;

/// Fraction of the delay added or removed at random.
pub const DEFAULT_JITTER: f64 = 0.2;

/// Reconnect delays growing from `base` by `multiplier` up to `max`.
///
/// [`reset`](Backoff::reset) starts the sequence over once a stream has
/// been opened successfully.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    /// Backoff capped at `max`, with the default base, multiplier and jitter.
    pub fn new(max: Duration) -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max,
            multiplier: DEFAULT_MULTIPLIER,
            jitter: DEFAULT_JITTER,
            attempt: 0,
        }
    }

    /// Use `jitter` (clamped to `0.0..=1.0`) instead of the default.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay of attempt `attempt` before jitter is applied.
    pub fn nominal(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.nominal(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        if self.jitter == 0.0 {
            return nominal;
        }
        let factor = 1.0 + self.jitter * rand::thread_rng().gen_range(-1.0..=1.0);
        nominal.mul_f64(factor)
    }

    /// Attempts since the last reset.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Start over from the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
