// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scheduler counters.

use std::time::Duration;

/// Aggregate counters for one scheduler.
///
/// Every submitted request ends up in exactly one of `completed`, `failed`,
/// `cancelled` or `rejected`, so once the queue is drained
/// `submitted == completed + failed + cancelled + rejected`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchedulerStats {
    pub submitted: u64,
    /// Ran and succeeded.
    pub completed: u64,
    /// Ran and returned a runtime error (or panicked).
    pub failed: u64,
    /// Cancelled while queued.
    pub cancelled: u64,
    /// Never queued or dropped from the queue: unknown graph, queue full,
    /// shut down.
    pub rejected: u64,
    pub peak_queue_depth: usize,
    /// Sum of time spent queued by requests that ran.
    pub total_queue_wait: Duration,
    /// Sum of execution time of requests that ran.
    pub total_run_time: Duration,
}

impl SchedulerStats {
    pub(crate) fn record_run(&mut self, ok: bool, waited: Duration, ran: Duration) {
        if ok {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.total_queue_wait += waited;
        self.total_run_time += ran;
    }

    pub(crate) fn record_depth(&mut self, depth: usize) {
        self.peak_queue_depth = self.peak_queue_depth.max(depth);
    }

    /// Requests that reached a terminal state.
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.cancelled + self.rejected
    }

    /// Mean execution time of requests that ran.
    pub fn mean_run_time(&self) -> Duration {
        let ran = self.completed + self.failed;
        if ran == 0 {
            return Duration::ZERO;
        }
        self.total_run_time / ran as u32
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "Scheduler: {} submitted, {} completed, {} failed, {} cancelled, {} rejected, \
             peak queue {}, mean run {:.3}ms",
            self.submitted,
            self.completed,
            self.failed,
            self.cancelled,
            self.rejected,
            self.peak_queue_depth,
            self.mean_run_time().as_secs_f64() * 1000.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let s = SchedulerStats::default();
        assert_eq!(s.finished(), 0);
        assert_eq!(s.mean_run_time(), Duration::ZERO);
    }

    #[test]
    fn test_record_run() {
        let mut s = SchedulerStats::default();
        s.record_run(true, Duration::from_millis(1), Duration::from_millis(4));
        s.record_run(false, Duration::from_millis(1), Duration::from_millis(2));
        s.cancelled += 1;
        assert_eq!(s.completed, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.finished(), 3);
        assert_eq!(s.mean_run_time(), Duration::from_millis(3));
    }

    #[test]
    fn test_summary() {
        let mut s = SchedulerStats::default();
        s.submitted = 2;
        s.record_depth(5);
        s.record_depth(3);
        let text = s.summary();
        assert!(text.contains("2 submitted"));
        assert!(text.contains("peak queue 5"));
    }
}
