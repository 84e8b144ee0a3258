// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device memory pool and RAII reservations.
//!
//! The [`DevicePool`] does not own bytes itself; it accounts for memory a
//! backend places on its device. Reservations are admitted with a
//! compare-and-swap loop, so concurrent compilations and executions can
//! never push the total past the budget.
//!
//! # Thread Safety
//! `DevicePool` is `Send + Sync` and `Clone`; every clone shares the same
//! counters.

use crate::{MemoryBudget, MemoryError, PoolStats};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// State shared between the pool handle and its outstanding reservations.
struct PoolInner {
    budget: MemoryBudget,
    reserved_bytes: AtomicUsize,
    stats: Mutex<PoolStats>,
}

impl PoolInner {
    fn release(&self, bytes: usize) {
        self.reserved_bytes.fetch_sub(bytes, Ordering::AcqRel);
        self.stats().record_release(bytes);
    }

    /// Locks the counters, recovering them if a holder panicked.
    fn stats(&self) -> MutexGuard<'_, PoolStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accounts for device memory against a fixed [`MemoryBudget`].
///
/// # Example
/// ```
/// use memory_manager::{DevicePool, MemoryBudget, MemoryError};
///
/// let pool = DevicePool::new(MemoryBudget::from_bytes(1000));
/// let _a = pool.reserve(600, "a").unwrap();
/// assert!(matches!(pool.reserve(600, "b"), Err(MemoryError::OutOfMemory { .. })));
/// ```
#[derive(Clone)]
pub struct DevicePool {
    inner: Arc<PoolInner>,
}

impl DevicePool {
    /// Creates a new pool with the given budget.
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                budget,
                reserved_bytes: AtomicUsize::new(0),
                stats: Mutex::new(PoolStats::default()),
            }),
        }
    }

    /// Reserves `bytes` of device memory.
    ///
    /// `label` names the owner (for example `"inference_net_3/weights"`) and
    /// shows up in OOM errors and debug output.
    ///
    /// # Errors
    /// [`MemoryError::ZeroSized`] for `bytes == 0`,
    /// [`MemoryError::OutOfMemory`] if the budget would be exceeded.
    pub fn reserve(&self, bytes: usize, label: impl Into<String>) -> Result<Reservation, MemoryError> {
        let label = label.into();
        if bytes == 0 {
            return Err(MemoryError::ZeroSized);
        }

        let budget = self.inner.budget.as_bytes();
        let admitted = self
            .inner
            .reserved_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(bytes).filter(|total| *total <= budget)
            });

        match admitted {
            Ok(previous) => {
                self.inner
                    .stats()
                    .record_reservation(bytes, previous + bytes);
                tracing::trace!("reserved {bytes} bytes for '{label}'");
                Ok(Reservation {
                    pool: Arc::clone(&self.inner),
                    bytes,
                    label,
                })
            }
            Err(current) => {
                self.inner.stats().record_oom();
                tracing::warn!(
                    "device memory exhausted: '{label}' requested {bytes} bytes with {current} of {budget} in use"
                );
                Err(MemoryError::OutOfMemory {
                    label,
                    requested_bytes: bytes,
                    available_bytes: budget.saturating_sub(current),
                    budget_bytes: budget,
                })
            }
        }
    }

    /// Returns the number of bytes currently reserved.
    pub fn reserved_bytes(&self) -> usize {
        self.inner.reserved_bytes.load(Ordering::Acquire)
    }

    /// Returns the number of bytes still available under the budget.
    pub fn available_bytes(&self) -> usize {
        self.inner
            .budget
            .as_bytes()
            .saturating_sub(self.reserved_bytes())
    }

    /// Returns the memory budget.
    pub fn budget(&self) -> MemoryBudget {
        self.inner.budget
    }

    /// Returns a snapshot of the pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner.stats().clone()
    }
}

impl std::fmt::Debug for DevicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePool")
            .field("budget", &self.inner.budget)
            .field("reserved_bytes", &self.reserved_bytes())
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

/// An RAII claim on part of a [`DevicePool`]'s budget.
///
/// The bytes are returned to the pool when the reservation is dropped.
pub struct Reservation {
    pool: Arc<PoolInner>,
    bytes: usize,
    label: String,
}

impl Reservation {
    /// Returns the number of reserved bytes.
    pub fn size_bytes(&self) -> usize {
        self.bytes
    }

    /// Returns the owner label given at reservation time.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.pool.release(self.bytes);
        tracing::trace!("released {} bytes for '{}'", self.bytes, self.label);
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("label", &self.label)
            .field("bytes", &self.bytes)
            .finish()
    }
}
