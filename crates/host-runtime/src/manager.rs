// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The caller-facing execution manager.
//!
//! [`ExecutionManager`] wires an id allocator, a device pool, a backend, the
//! registry and the scheduler together and exposes the four operations
//! callers need: register, unregister, execute asynchronously, and an
//! `async` convenience that awaits the outcome.

use crate::backend::{Backend, DeferredWeightReader, WeightDescriptor};
use crate::{
    CompileError, CompiledNetwork, ExecutionContext, ExecutionError, ExecutionOutcome,
    ExecutionRequest, GraphId, GraphIdAllocator, ManagerConfig, ManagerError, NetworkRegistry,
    RemovalError, RequestHandle, Scheduler, SchedulerStats,
};
use memory_manager::DevicePool;
use std::sync::Arc;

/// Builds an [`ExecutionManager`], optionally injecting the backend and the
/// id allocator.
pub struct ManagerBuilder {
    config: ManagerConfig,
    backend: Option<Arc<dyn Backend>>,
    allocator: Option<Arc<GraphIdAllocator>>,
}

impl ManagerBuilder {
    /// Uses `backend` instead of the one named in the config.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Shares an existing allocator, so ids stay unique across managers.
    pub fn allocator(mut self, allocator: Arc<GraphIdAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn build(self) -> Result<ExecutionManager, ManagerError> {
        self.config.validate()?;
        let budget = self.config.parse_budget()?;
        let backend = match self.backend {
            Some(backend) => backend,
            None => self.config.create_backend()?,
        };
        let allocator = self.allocator.unwrap_or_default();
        let device = DevicePool::new(budget);

        tracing::info!(
            "execution manager: backend '{}', device memory {budget}",
            backend.name()
        );
        let registry = Arc::new(NetworkRegistry::new(backend, allocator, device));
        let scheduler = Scheduler::new(Arc::clone(&registry), self.config.scheduler_config())?;

        Ok(ExecutionManager {
            config: self.config,
            registry,
            scheduler,
        })
    }
}

/// Registers compiled graphs and executes them asynchronously.
///
/// # Example
/// ```
/// use host_runtime::{ExecutionContext, ExecutionManager, ManagerConfig};
/// use graph_ir::{GraphDef, NodeDef, OpKind};
/// use tensor_core::{DType, Shape, Tensor};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ExecutionManager::new(ManagerConfig::default())?;
/// let model = GraphDef::new("relu")
///     .input("x", Shape::vector(2), DType::F32)
///     .node(NodeDef::new("r", OpKind::Relu, &["x"], "y"))
///     .output("y")
///     .to_json()?;
/// let id = manager.register_graph(&model, &[], None)?;
///
/// let ctx = ExecutionContext::new()
///     .with_input("x", Tensor::from_f32(Shape::vector(2), &[-1.0, 2.0])?);
/// let outcome = manager.run(id, ctx, 0).await;
/// let ctx = outcome.result?;
/// assert_eq!(ctx.output("y").unwrap().to_f32_vec()?, vec![0.0, 2.0]);
/// manager.unregister_graph(id)?;
/// # Ok(())
/// # }
/// ```
pub struct ExecutionManager {
    config: ManagerConfig,
    registry: Arc<NetworkRegistry>,
    scheduler: Scheduler,
}

impl ExecutionManager {
    /// Builds a manager straight from a config.
    pub fn new(config: ManagerConfig) -> Result<Self, ManagerError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder {
            config,
            backend: None,
            allocator: None,
        }
    }

    /// Compiles `model` with `weights` and registers it under a fresh id.
    pub fn register_graph(
        &self,
        model: &[u8],
        weights: &[WeightDescriptor],
        reader: Option<&dyn DeferredWeightReader>,
    ) -> Result<GraphId, CompileError> {
        self.registry.add(model, weights, reader)
    }

    /// Removes a graph. Fails with [`RemovalError::Busy`] while executions
    /// against it are queued or running.
    pub fn unregister_graph(&self, id: GraphId) -> Result<(), RemovalError> {
        self.registry.remove(id)
    }

    /// Executes `id` against `context`. `on_complete` fires exactly once,
    /// possibly before this returns (unknown graph, full queue).
    pub fn execute_async<F>(
        &self,
        id: GraphId,
        context: ExecutionContext,
        priority: u64,
        on_complete: F,
    ) -> RequestHandle
    where
        F: FnOnce(ExecutionOutcome) + Send + 'static,
    {
        self.submit(ExecutionRequest::new(id, context, priority, on_complete))
    }

    /// Submits a fully specified request.
    pub fn submit(&self, request: ExecutionRequest) -> RequestHandle {
        self.scheduler.submit(request)
    }

    /// Executes `id` and awaits the outcome.
    ///
    /// Dropping the future does not cancel the request; it still runs and
    /// its outcome is discarded.
    pub async fn run(&self, id: GraphId, context: ExecutionContext, priority: u64) -> ExecutionOutcome {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = self.execute_async(id, context, priority, move |outcome| {
            // The receiver may be gone if the caller stopped waiting.
            let _ = tx.send(outcome);
        });
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => ExecutionOutcome {
                request_id: handle.request_id(),
                graph_id: id,
                result: Err(ExecutionError::shut_down(id)),
                trace: None,
            },
        }
    }

    pub fn lookup(&self, id: GraphId) -> Option<Arc<CompiledNetwork>> {
        self.registry.lookup(id)
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn device(&self) -> &DevicePool {
        self.registry.device()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Completes queued requests with `ShutDown`, waits for running ones
    /// and stops the workers. Also happens on drop.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

impl std::fmt::Debug for ExecutionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionManager")
            .field("backend", &self.registry.backend_name())
            .field("networks", &self.registry.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use graph_ir::{GraphDef, NodeDef, OpKind};
    use tensor_core::{DType, Shape, Tensor};

    fn manager() -> ExecutionManager {
        ExecutionManager::new(ManagerConfig {
            num_workers: Some(2),
            device_memory: "1M".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn gelu_model() -> Vec<u8> {
        GraphDef::new("gelu")
            .input("x", Shape::vector(3), DType::F32)
            .node(NodeDef::new("g", OpKind::Gelu, &["x"], "y"))
            .output("y")
            .to_json()
            .unwrap()
    }

    fn input() -> ExecutionContext {
        ExecutionContext::new()
            .with_input("x", Tensor::from_f32(Shape::vector(3), &[-1.0, 0.0, 1.0]).unwrap())
    }

    #[tokio::test]
    async fn test_run_roundtrip() {
        let m = manager();
        let id = m.register_graph(&gelu_model(), &[], None).unwrap();
        let outcome = m.run(id, input(), 1).await;
        assert_eq!(outcome.graph_id, id);
        let ctx = outcome.result.unwrap();
        let y = ctx.bind_outputs(&["y"]).unwrap()["y"].to_f32_vec().unwrap();
        assert_eq!(y[1], 0.0);
        assert!((y[2] - 0.8412).abs() < 1e-3);
        m.unregister_graph(id).unwrap();
    }

    #[tokio::test]
    async fn test_run_unknown_graph() {
        let m = manager();
        let outcome = m.run(GraphId::from_raw(99), input(), 0).await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::UnknownGraph));
    }

    #[tokio::test]
    async fn test_trace_returned() {
        let m = manager();
        let id = m.register_graph(&gelu_model(), &[], None).unwrap();
        let outcome = m.run(id, input().with_trace(), 0).await;
        let names: Vec<_> = outcome
            .trace
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["queued", "queued", "execute", "g", "g", "execute"]);
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        let result = ExecutionManager::new(ManagerConfig {
            backend: "tpu".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ManagerError::Config(_))));
    }

    #[test]
    fn test_shared_allocator() {
        let allocator = Arc::new(GraphIdAllocator::new());
        let a = ExecutionManager::builder(ManagerConfig::default())
            .allocator(Arc::clone(&allocator))
            .build()
            .unwrap();
        let b = ExecutionManager::builder(ManagerConfig::default())
            .allocator(allocator)
            .build()
            .unwrap();
        let id_a = a.register_graph(&gelu_model(), &[], None).unwrap();
        let id_b = b.register_graph(&gelu_model(), &[], None).unwrap();
        assert!(id_a < id_b);
        assert!(b.lookup(id_a).is_none());
    }

    #[test]
    fn test_debug() {
        let m = manager();
        let text = format!("{m:?}");
        assert!(text.contains("ExecutionManager"));
        assert!(text.contains("interpreter"));
    }
}
