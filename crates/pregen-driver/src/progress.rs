//! Generation progress reporting
//!
//! Large regions report every 0.5%; regions under 200 chunks report after
//! every chunk.

use pregen_adapter::Dimension;
use std::time::{Duration, Instant};

/// Regions at least this large report in fixed half-percent steps
const FINE_GRAINED_BELOW: u64 = 200;

/// One progress observation
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// Dimension being generated
    pub dimension: Dimension,
    /// Chunks completed, including any skipped by resuming
    pub done: u64,
    /// Chunks in the region
    pub total: u64,
    /// Time since the loop started
    pub elapsed: Duration,
    /// Estimated time left
    pub remaining: Duration,
}

impl ProgressReport {
    /// Completion in percent
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.done as f64 * 100.0 / self.total as f64
        }
    }
}

/// Receives progress reports
pub trait ProgressObserver: Send + Sync {
    /// Called at each reporting step
    fn on_progress(&self, report: &ProgressReport);
}

/// Writes progress to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, report: &ProgressReport) {
        tracing::info!(
            dimension = %report.dimension,
            done = report.done,
            total = report.total,
            "Progress: {:.1}% Elapsed: {:.1}s Remaining estimate: {}s",
            report.percent(),
            report.elapsed.as_secs_f64(),
            report.remaining.as_secs(),
        );
    }
}

/// Counts completed chunks and decides when to report
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    dimension: Dimension,
    total: u64,
    skipped: u64,
    done: u64,
    step: u64,
    started: Instant,
}

impl ProgressTracker {
    /// Tracker for `total` chunks of which `skipped` were done earlier
    #[must_use]
    pub fn new(dimension: Dimension, total: u64, skipped: u64) -> Self {
        Self {
            dimension,
            total,
            skipped,
            done: skipped,
            step: report_step(total),
            started: Instant::now(),
        }
    }

    /// Chunks between reports
    #[inline]
    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Chunks completed
    #[inline]
    #[must_use]
    pub fn done(&self) -> u64 {
        self.done
    }

    /// Record one completed chunk; returns a report on reporting steps
    pub fn advance(&mut self) -> Option<ProgressReport> {
        self.done += 1;
        (self.done % self.step == 0 || self.done == self.total).then(|| self.report())
    }

    /// Snapshot of the current state
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn report(&self) -> ProgressReport {
        let elapsed = self.started.elapsed();
        let here = self.done - self.skipped;
        let left = self.total.saturating_sub(self.done);
        let remaining = if here == 0 {
            Duration::ZERO
        } else {
            elapsed.mul_f64(left as f64 / here as f64)
        };
        ProgressReport {
            dimension: self.dimension,
            done: self.done,
            total: self.total,
            elapsed,
            remaining,
        }
    }
}

fn report_step(total: u64) -> u64 {
    if total < FINE_GRAINED_BELOW {
        1
    } else {
        total / FINE_GRAINED_BELOW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_regions_report_every_chunk() {
        let mut tracker = ProgressTracker::new(Dimension::Overworld, 100, 0);
        assert_eq!(tracker.step(), 1);
        let reports: Vec<_> = (0..100).filter_map(|_| tracker.advance()).collect();
        assert_eq!(reports.len(), 100);
        assert!((reports[0].percent() - 1.0).abs() < 1e-9);
        assert!((reports[99].percent() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn large_regions_report_every_half_percent() {
        let mut tracker = ProgressTracker::new(Dimension::Nether, 1000, 0);
        assert_eq!(tracker.step(), 5);
        let reports: Vec<_> = (0..1000).filter_map(|_| tracker.advance()).collect();
        assert_eq!(reports.len(), 200);
        assert!((reports[0].percent() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn uneven_region_still_reports_completion() {
        let mut tracker = ProgressTracker::new(Dimension::End, 401, 0);
        assert_eq!(tracker.step(), 2);
        let last = (0..401).filter_map(|_| tracker.advance()).last().unwrap();
        assert_eq!(last.done, 401);
    }

    #[test]
    fn resumed_tracker_counts_skipped_chunks() {
        let mut tracker = ProgressTracker::new(Dimension::Overworld, 100, 40);
        let report = tracker.advance().unwrap();
        assert_eq!(report.done, 41);
        assert!((report.percent() - 41.0).abs() < 1e-9);
    }
}
