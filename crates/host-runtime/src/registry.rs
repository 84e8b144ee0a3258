// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The compiled network registry.
//!
//! # Lifetimes
//! ```text
//! add ──► compile (no lock held) ──► insert ──► lookup / acquire ──► remove
//!                                                  │
//!                                          ExecutionLease (RAII)
//! ```
//! Each entry counts its outstanding executions. [`NetworkRegistry::acquire`]
//! bumps the count under the registry lock and returns an
//! [`ExecutionLease`] that decrements it on drop. `remove` refuses with
//! [`RemovalError::Busy`] while the count is non-zero, so a network can
//! never disappear under a running execution.

use crate::backend::{Backend, CompileRequest, DeferredWeightReader, WeightDescriptor};
use crate::{lock, CompileError, CompiledNetwork, GraphId, GraphIdAllocator, RemovalError};
use memory_manager::DevicePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct Entry {
    network: Arc<CompiledNetwork>,
    outstanding: Arc<AtomicUsize>,
}

/// Owns every registered [`CompiledNetwork`], keyed by [`GraphId`].
pub struct NetworkRegistry {
    backend: Arc<dyn Backend>,
    allocator: Arc<GraphIdAllocator>,
    device: DevicePool,
    entries: Mutex<HashMap<GraphId, Entry>>,
}

impl NetworkRegistry {
    pub fn new(
        backend: Arc<dyn Backend>,
        allocator: Arc<GraphIdAllocator>,
        device: DevicePool,
    ) -> Self {
        Self {
            backend,
            allocator,
            device,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Compiles a model and registers it under a fresh id.
    ///
    /// The id is allocated before compilation so the backend can label its
    /// device reservations with it. If compilation fails the id stays
    /// consumed but nothing is registered.
    pub fn add(
        &self,
        model: &[u8],
        weights: &[WeightDescriptor],
        reader: Option<&dyn DeferredWeightReader>,
    ) -> Result<GraphId, CompileError> {
        let id = self.allocator.allocate();
        let executable = self
            .backend
            .compile(CompileRequest {
                graph_id: id,
                model,
                weights,
                reader,
                device: &self.device,
            })
            .map_err(|e| {
                tracing::warn!("compilation for graph {id} failed: {e}");
                e
            })?;

        let network = Arc::new(CompiledNetwork::new(id, self.backend.name(), executable));
        tracing::info!("registered {}", network.summary());
        lock(&self.entries).insert(
            id,
            Entry {
                network,
                outstanding: Arc::new(AtomicUsize::new(0)),
            },
        );
        Ok(id)
    }

    /// Returns the network registered under `id`, if any.
    pub fn lookup(&self, id: GraphId) -> Option<Arc<CompiledNetwork>> {
        lock(&self.entries).get(&id).map(|e| Arc::clone(&e.network))
    }

    /// Looks up `id` and records one more outstanding execution, atomically
    /// with respect to [`remove`](Self::remove).
    pub fn acquire(&self, id: GraphId) -> Option<(Arc<CompiledNetwork>, ExecutionLease)> {
        let entries = lock(&self.entries);
        let entry = entries.get(&id)?;
        entry.outstanding.fetch_add(1, Ordering::AcqRel);
        Some((
            Arc::clone(&entry.network),
            ExecutionLease {
                id,
                outstanding: Arc::clone(&entry.outstanding),
            },
        ))
    }

    /// Removes `id` unless executions still reference it.
    ///
    /// # Errors
    /// - [`RemovalError::NotFound`] if `id` is not registered.
    /// - [`RemovalError::Busy`] while any [`ExecutionLease`] for it is alive.
    pub fn remove(&self, id: GraphId) -> Result<(), RemovalError> {
        let removed = {
            let mut entries = lock(&self.entries);
            let entry = entries.get(&id).ok_or(RemovalError::NotFound(id))?;
            let outstanding = entry.outstanding.load(Ordering::Acquire);
            if outstanding > 0 {
                return Err(RemovalError::Busy { id, outstanding });
            }
            entries.remove(&id)
        };
        // Dropped outside the lock: releasing device memory may be slow.
        drop(removed);
        tracing::info!("unregistered graph {id}");
        Ok(())
    }

    pub fn contains(&self, id: GraphId) -> bool {
        lock(&self.entries).contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<GraphId> {
        let mut ids: Vec<_> = lock(&self.entries).keys().copied().collect();
        ids.sort();
        ids
    }

    /// Outstanding executions for `id`, or `None` if it is not registered.
    pub fn outstanding(&self, id: GraphId) -> Option<usize> {
        lock(&self.entries)
            .get(&id)
            .map(|e| e.outstanding.load(Ordering::Acquire))
    }

    pub fn device(&self) -> &DevicePool {
        &self.device
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

impl std::fmt::Debug for NetworkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkRegistry")
            .field("backend", &self.backend.name())
            .field("networks", &self.len())
            .field("device", &self.device)
            .finish()
    }
}

/// Marks one execution as outstanding against a registered network.
/// Dropping it lets [`NetworkRegistry::remove`] succeed again.
pub struct ExecutionLease {
    id: GraphId,
    outstanding: Arc<AtomicUsize>,
}

impl ExecutionLease {
    pub fn graph_id(&self) -> GraphId {
        self.id
    }
}

impl Drop for ExecutionLease {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for ExecutionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLease").field("id", &self.id).finish()
    }
}
