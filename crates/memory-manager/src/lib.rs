// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Budget-enforced accounting of device memory for compiled networks.
//!
//! The graph host multiplexes many independently registered networks over
//! one device. Each network's weights and each in-flight execution's
//! activations must fit in a shared budget, and the memory must come back
//! when the network is removed or the execution finishes.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: a hard memory ceiling with human-readable parsing
//!   (`"512M"`, `"1G"`, etc.).
//! - [`DevicePool`]: hands out reservations against the budget and tracks
//!   statistics. Cheap to clone; clones share the same accounting.
//! - [`Reservation`]: an RAII claim on part of the budget. Dropping it
//!   releases the bytes.
//! - [`PoolStats`]: cumulative counters (peak usage, OOM count).
//!
//! # Ownership Model
//!
//! ```text
//! DevicePool::reserve(bytes, label)
//!       │
//!       ▼
//!   Reservation  ◄─── holds Arc<PoolInner>
//!       │
//!       │  drop()
//!       ▼
//!   PoolInner::release()  ──► reserved_bytes -= bytes
//! ```
//!
//! A compiled network owns the reservations for its weights, so memory is
//! returned exactly when the last reference to the network goes away.
//!
//! # Example
//! ```
//! use memory_manager::{DevicePool, MemoryBudget};
//!
//! let pool = DevicePool::new(MemoryBudget::from_mb(64));
//! let weights = pool.reserve(1024 * 1024, "net_1/weights").unwrap();
//! assert_eq!(pool.reserved_bytes(), 1024 * 1024);
//!
//! drop(weights);
//! assert_eq!(pool.reserved_bytes(), 0);
//! ```

mod budget;
mod error;
mod pool;
mod stats;

pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use pool::{DevicePool, Reservation};
pub use stats::PoolStats;
