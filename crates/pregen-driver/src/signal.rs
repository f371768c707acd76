//! Cooperative shutdown

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// One-way flag that wakes sleepers when raised
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: Mutex<bool>,
    wake: Condvar,
}

impl ShutdownSignal {
    /// Lowered signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake every waiter
    pub fn request(&self) {
        let mut requested = self.requested.lock();
        if !*requested {
            *requested = true;
            tracing::info!("shutdown requested");
        }
        self.wake.notify_all();
    }

    /// Whether the signal was raised
    #[must_use]
    pub fn is_requested(&self) -> bool {
        *self.requested.lock()
    }

    /// Sleep for `timeout` unless the signal is raised first
    ///
    /// Returns `true` if the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut requested = self.requested.lock();
        while !*requested {
            if self.wake.wait_until(&mut requested, deadline).timed_out() {
                break;
            }
        }
        *requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn wait_times_out_when_lowered() {
        let signal = ShutdownSignal::new();
        let started = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn request_wakes_waiter() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || signal.wait_timeout(Duration::from_secs(30)))
        };
        std::thread::sleep(Duration::from_millis(10));
        signal.request();
        assert!(waiter.join().unwrap());
        assert!(signal.is_requested());
    }

    #[test]
    fn raised_signal_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.request();
        let started = Instant::now();
        assert!(signal.wait_timeout(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
