// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # host-runtime
//!
//! Host-side execution manager for compiled computation graphs.
//!
//! The runtime takes:
//! - A serialized model from `graph-ir` plus its weights (inline or read
//!   lazily from a safetensors file).
//! - A [`backend::Backend`] that compiles the model into an executable.
//! - A `DevicePool` from `memory-manager` that bounds device memory.
//!
//! It registers the compiled network under a fresh [`GraphId`] and executes
//! it asynchronously against caller-supplied [`ExecutionContext`]s, in
//! priority order, on a fixed pool of worker threads.
//!
//! # Pieces
//! ```text
//! GraphIdAllocator ─► NetworkRegistry ◄─ Scheduler ◄─ ExecutionManager
//!                         │                 │
//!                    Backend::compile   Executable::run
//! ```
//! - [`GraphIdAllocator`] hands out unique, increasing ids.
//! - [`NetworkRegistry`] maps ids to [`CompiledNetwork`]s and refuses to
//!   remove one while executions hold an [`ExecutionLease`] on it.
//! - [`Scheduler`] queues [`ExecutionRequest`]s by priority and fires each
//!   completion callback exactly once.
//! - [`ExecutionManager`] wires them together from a [`ManagerConfig`].

pub mod backend;
mod config;
mod context;
mod error;
mod id;
mod manager;
mod metrics;
mod network;
mod registry;
mod request;
mod scheduler;
mod trace;

pub use config::ManagerConfig;
pub use context::ExecutionContext;
pub use error::{
    CompileError, ConfigError, ContextError, ErrorKind, ExecutionError, ManagerError,
    RemovalError, RuntimeError,
};
pub use id::{GraphId, GraphIdAllocator};
pub use manager::{ExecutionManager, ManagerBuilder};
pub use metrics::SchedulerStats;
pub use network::CompiledNetwork;
pub use registry::{ExecutionLease, NetworkRegistry};
pub use request::{CompletionCallback, ExecutionOutcome, ExecutionRequest, RequestId};
pub use scheduler::{RequestHandle, RequestState, Scheduler, SchedulerConfig};
pub use trace::{to_chrome_trace, TraceEvent, TracePhase, TraceSink};

use std::any::Any;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the guard if a panicking thread poisoned it.
///
/// Every critical section in this crate leaves its data consistent before
/// anything that can panic runs, so the poisoned value is still valid.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
