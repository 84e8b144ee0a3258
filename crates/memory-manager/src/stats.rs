// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Cumulative device-pool statistics.

/// Counters describing how a [`crate::DevicePool`] has been used.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PoolStats {
    /// Successful reservations.
    pub reservations: u64,
    /// Reservations returned to the pool.
    pub releases: u64,
    /// Reservation requests rejected for lack of budget.
    pub oom_count: u64,
    /// High-water mark of reserved bytes.
    pub peak_reserved_bytes: usize,
    /// Total bytes ever reserved.
    pub cumulative_reserved_bytes: u64,
}

impl PoolStats {
    pub(crate) fn record_reservation(&mut self, bytes: usize, reserved_now: usize) {
        self.reservations += 1;
        self.cumulative_reserved_bytes += bytes as u64;
        self.peak_reserved_bytes = self.peak_reserved_bytes.max(reserved_now);
    }

    pub(crate) fn record_release(&mut self, _bytes: usize) {
        self.releases += 1;
    }

    pub(crate) fn record_oom(&mut self) {
        self.oom_count += 1;
    }

    /// Reservations that have not been released yet.
    pub fn live_reservations(&self) -> u64 {
        self.reservations.saturating_sub(self.releases)
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let peak_mb = self.peak_reserved_bytes as f64 / (1024.0 * 1024.0);
        format!(
            "Device memory: {} reservations ({} live), {} OOMs, peak {:.2} MB",
            self.reservations,
            self.live_reservations(),
            self.oom_count,
            peak_mb,
        )
    }
}
