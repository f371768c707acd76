//! Generation rate limiting

use crate::signal::ShutdownSignal;
use std::time::{Duration, Instant};

/// Spaces operations to at most a fixed rate
///
/// Each call to [`Pacer::pace`] waits until one interval has passed since
/// the previous call returned. Waits end early on shutdown.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl Pacer {
    /// Pacer for `rate` operations per second; zero or less disables pacing
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(rate: f64) -> Self {
        let interval = (rate > 0.0 && rate.is_finite())
            .then(|| Duration::from_micros((1_000_000.0 / rate).floor() as u64));
        Self {
            interval,
            last: None,
        }
    }

    /// Pacer that never waits
    #[inline]
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    /// Minimum spacing between operations
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait out the rest of the interval; `false` if shutdown interrupted it
    pub fn pace(&mut self, signal: &ShutdownSignal) -> bool {
        let Some(interval) = self.interval else {
            return true;
        };
        if let Some(last) = self.last {
            let wait = interval.saturating_sub(last.elapsed());
            if !wait.is_zero() && signal.wait_timeout(wait) {
                return false;
            }
        }
        self.last = Some(Instant::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_floored_microseconds() {
        assert_eq!(Pacer::new(3.0).interval(), Some(Duration::from_micros(333_333)));
        assert_eq!(Pacer::new(0.5).interval(), Some(Duration::from_secs(2)));
        assert_eq!(Pacer::new(0.0).interval(), None);
        assert_eq!(Pacer::new(-1.0).interval(), None);
    }

    #[test]
    fn spaces_calls() {
        let signal = ShutdownSignal::new();
        let mut pacer = Pacer::new(50.0);
        let started = Instant::now();
        for _ in 0..4 {
            assert!(pacer.pace(&signal));
        }
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn shutdown_interrupts_wait() {
        let signal = ShutdownSignal::new();
        let mut pacer = Pacer::new(0.01);
        assert!(pacer.pace(&signal));
        signal.request();
        assert!(!pacer.pace(&signal));
    }

    #[test]
    fn unlimited_never_waits() {
        let signal = ShutdownSignal::new();
        signal.request();
        assert!(Pacer::unlimited().pace(&signal));
    }
}
