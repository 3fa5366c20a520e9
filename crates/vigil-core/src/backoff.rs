//! Retry delay policy shared by the record-store writer and the supervisor's
//! controller link.
//!
//! The delay for attempt `n` is `first * factor^n`, clamped to `max`, then
//! jittered. The base is derived from the attempt number alone, so jitter
//! never feeds back into later delays.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`.
    Equal,
}

impl Jitter {
    #[must_use]
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(rng.random_range(0..=ms)),
            Self::Equal => {
                let half = ms / 2;
                let extra = if half == 0 { 0 } else { rng.random_range(0..=half) };
                Duration::from_millis(half + extra)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub first: Duration,
    pub max: Duration,
    pub factor: f64,
    pub jitter: Jitter,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: Jitter::None,
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };

        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(first_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(first_ms), Duration::from_millis(max_ms))
    }

    #[test]
    fn exponential_growth() {
        let p = policy(100, 30_000);
        assert_eq!(p.next(0), Duration::from_millis(100));
        assert_eq!(p.next(1), Duration::from_millis(200));
        assert_eq!(p.next(3), Duration::from_millis(800));
    }

    #[test]
    fn clamps_to_max() {
        let p = policy(100, 1_000);
        assert_eq!(p.next(10), Duration::from_secs(1));
        assert_eq!(p.next(u32::MAX), Duration::from_secs(1));
        assert_eq!(policy(10_000, 5_000).next(0), Duration::from_secs(5));
    }

    #[test]
    fn constant_factor() {
        let p = policy(500, 30_000).with_factor(1.0);
        for attempt in 0..8 {
            assert_eq!(p.next(attempt), Duration::from_millis(500));
        }
    }

    #[test]
    fn equal_jitter_bounds() {
        let p = policy(1_000, 30_000)
            .with_factor(1.0)
            .with_jitter(Jitter::Equal);
        for attempt in 0..50 {
            let delay = p.next(attempt);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn full_jitter_never_exceeds_base() {
        let p = policy(100, 30_000).with_jitter(Jitter::Full);
        for attempt in 0..10 {
            assert!(p.next(attempt) <= policy(100, 30_000).next(attempt));
        }
    }
}
