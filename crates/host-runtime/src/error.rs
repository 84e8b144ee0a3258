// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for registration, removal and execution.

use crate::GraphId;
use std::fmt;

/// Errors raised synchronously while compiling and registering a graph.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The model bytes do not describe a valid graph.
    #[error("invalid model: {0}")]
    Graph(#[from] graph_ir::GraphError),

    /// The backend cannot lower something in the graph.
    #[error("unsupported by backend: {0}")]
    Unsupported(String),

    /// A weight declared by the graph was not supplied.
    #[error("weight '{name}' was not supplied")]
    MissingWeight { name: String },

    /// A supplied weight does not match its declaration.
    #[error("invalid weight '{name}': {detail}")]
    InvalidWeight { name: String, detail: String },

    /// The deferred weight reader failed.
    #[error("failed to read weight '{name}': {detail}")]
    WeightRead { name: String, detail: String },

    /// Device memory for the compiled network could not be reserved.
    #[error("out of device memory: {0}")]
    OutOfDeviceMemory(#[from] memory_manager::MemoryError),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors returned by [`crate::NetworkRegistry::remove`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemovalError {
    /// The id is unknown or was already removed.
    #[error("graph {0} is not registered")]
    NotFound(GraphId),

    /// Executions still reference the network; retry once they drain.
    #[error("graph {id} is busy with {outstanding} outstanding execution(s)")]
    Busy { id: GraphId, outstanding: usize },
}

/// A failure inside a backend while executing a network.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A declared input was not bound in the execution context.
    #[error("input '{0}' was not bound")]
    MissingInput(String),

    /// A bound input does not match its declaration.
    #[error("input '{name}' expected {expected}, got {actual}")]
    InputMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// An operator failed.
    #[error("node '{node}' failed: {source}")]
    Op {
        node: String,
        #[source]
        source: tensor_core::TensorError,
    },

    /// Activation memory could not be reserved.
    #[error("out of device memory: {0}")]
    OutOfDeviceMemory(#[from] memory_manager::MemoryError),

    /// The executable panicked.
    #[error("execution panicked: {0}")]
    Panicked(String),

    /// A device-level fault reported by the backend.
    #[error("device fault: {0}")]
    Device(String),
}

/// Errors from reading or applying [`crate::ManagerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialise error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from building an [`crate::ExecutionManager`].
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Errors from [`crate::ExecutionContext::bind_outputs`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("output '{0}' was not produced")]
    UnknownOutput(String),
}

// ── Execution errors ───────────────────────────────────────────────

/// Classification of an [`ExecutionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The graph id was never registered or has been removed.
    UnknownGraph,
    /// The request was cancelled while still queued.
    Cancelled,
    /// The pending-request limit was reached.
    QueueFull,
    /// The scheduler shut down before the request ran.
    ShutDown,
    /// The backend failed while executing.
    Runtime,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownGraph => "unknown graph",
            Self::Cancelled => "cancelled",
            Self::QueueFull => "queue full",
            Self::ShutDown => "shut down",
            Self::Runtime => "runtime failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error half of an execution outcome. Always delivered through the
/// completion callback, never returned from `submit`.
#[derive(Debug, thiserror::Error)]
#[error("execution on graph {graph_id} failed ({kind}): {detail}")]
pub struct ExecutionError {
    kind: ErrorKind,
    graph_id: GraphId,
    detail: String,
    #[source]
    source: Option<RuntimeError>,
}

impl ExecutionError {
    pub(crate) fn new(kind: ErrorKind, graph_id: GraphId, detail: impl Into<String>) -> Self {
        Self {
            kind,
            graph_id,
            detail: detail.into(),
            source: None,
        }
    }

    pub(crate) fn unknown_graph(graph_id: GraphId) -> Self {
        Self::new(ErrorKind::UnknownGraph, graph_id, "graph is not registered")
    }

    pub(crate) fn cancelled(graph_id: GraphId) -> Self {
        Self::new(ErrorKind::Cancelled, graph_id, "cancelled before execution began")
    }

    pub(crate) fn queue_full(graph_id: GraphId, limit: usize) -> Self {
        Self::new(
            ErrorKind::QueueFull,
            graph_id,
            format!("{limit} requests already pending"),
        )
    }

    pub(crate) fn shut_down(graph_id: GraphId) -> Self {
        Self::new(ErrorKind::ShutDown, graph_id, "scheduler shut down")
    }

    pub(crate) fn runtime(graph_id: GraphId, source: RuntimeError) -> Self {
        Self {
            kind: ErrorKind::Runtime,
            graph_id,
            detail: source.to_string(),
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    /// The backend failure, for [`ErrorKind::Runtime`].
    pub fn runtime_error(&self) -> Option<&RuntimeError> {
        self.source.as_ref()
    }
}
