// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A registered, immutable compiled network.

use crate::backend::Executable;
use crate::{ExecutionContext, GraphId, RuntimeError, TraceSink};
use graph_ir::ValueDecl;
use std::time::Instant;

/// The executable form of a registered graph.
///
/// Owned by the registry through an `Arc`; executions hold further clones
/// only while they run. Dropping the last clone drops the backend
/// executable and with it the device memory it reserved.
pub struct CompiledNetwork {
    id: GraphId,
    backend: String,
    executable: Box<dyn Executable>,
    compiled_at: Instant,
}

impl CompiledNetwork {
    pub(crate) fn new(id: GraphId, backend: &str, executable: Box<dyn Executable>) -> Self {
        Self {
            id,
            backend: backend.to_string(),
            executable,
            compiled_at: Instant::now(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.executable.name()
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn inputs(&self) -> &[ValueDecl] {
        self.executable.inputs()
    }

    pub fn outputs(&self) -> &[String] {
        self.executable.outputs()
    }

    pub fn device_bytes(&self) -> usize {
        self.executable.device_bytes()
    }

    /// Time since compilation finished.
    pub fn age(&self) -> std::time::Duration {
        self.compiled_at.elapsed()
    }

    pub(crate) fn run(
        &self,
        ctx: &mut ExecutionContext,
        trace: Option<&mut TraceSink>,
    ) -> Result<(), RuntimeError> {
        self.executable.run(ctx, trace)
    }

    pub fn summary(&self) -> String {
        format!(
            "Network {} '{}' [{}]: {} inputs, {} outputs, {:.2} KB device memory",
            self.id,
            self.name(),
            self.backend,
            self.inputs().len(),
            self.outputs().len(),
            self.device_bytes() as f64 / 1024.0,
        )
    }
}

impl Drop for CompiledNetwork {
    fn drop(&mut self) {
        tracing::debug!(
            "releasing network {} '{}' ({} device bytes, registered {:?} ago)",
            self.id,
            self.name(),
            self.device_bytes(),
            self.age()
        );
    }
}

impl std::fmt::Debug for CompiledNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledNetwork")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("backend", &self.backend)
            .field("device_bytes", &self.device_bytes())
            .finish()
    }
}
