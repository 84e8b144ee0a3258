// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph parsing and validation.

/// Errors that can occur when reading or validating a [`crate::GraphDef`].
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph file could not be read.
    #[error("failed to read graph: {0}")]
    Io(#[from] std::io::Error),

    /// The graph JSON is malformed.
    #[error("failed to parse graph: {0}")]
    Parse(#[from] serde_json::Error),

    /// A node names an operator this IR does not know.
    #[error("node '{node}' uses unsupported op '{op}'")]
    UnsupportedOp { node: String, op: String },

    /// A node is structurally wrong (arity, shapes, attributes).
    #[error("invalid node '{node}': {detail}")]
    InvalidNode { node: String, detail: String },

    /// Two values (inputs, weights or node outputs) share a name.
    #[error("value '{0}' is defined more than once")]
    DuplicateValue(String),

    /// A node consumes a value that is not defined before it.
    #[error("node '{node}' reads undefined value '{value}'")]
    UndefinedValue { node: String, value: String },

    /// A declared graph output is never produced.
    #[error("graph output '{0}' is not produced by any node or input")]
    UnknownOutput(String),

    /// The graph as a whole is malformed.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}
