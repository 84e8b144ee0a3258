// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! A small JSON graph description that backends compile into executable
//! networks.
//!
//! - [`OpKind`]: the operators a graph may use.
//! - [`NodeDef`]: one operator application: named inputs, one named output.
//! - [`ValueDecl`]: a declared graph input or weight (name, shape, dtype).
//! - [`GraphDef`]: the whole graph, with a **type-state pattern**
//!   (`Parsed` → `Validated`). Validation resolves every name and infers the
//!   shape of every intermediate value.
//!
//! # Format
//! ```json
//! {
//!   "name": "tiny",
//!   "inputs":  [{ "name": "x", "shape": [1, 4], "dtype": "f32" }],
//!   "weights": [{ "name": "w", "shape": [4, 2], "dtype": "f32" }],
//!   "nodes":   [{ "name": "fc", "op": "mat_mul", "inputs": ["x", "w"], "output": "y" }],
//!   "outputs": ["y"]
//! }
//! ```
//!
//! # Example
//! ```
//! use graph_ir::GraphDef;
//!
//! let json = br#"{
//!     "name": "tiny",
//!     "inputs":  [{ "name": "x", "shape": [1, 4], "dtype": "f32" }],
//!     "weights": [{ "name": "w", "shape": [4, 2], "dtype": "f32" }],
//!     "nodes":   [{ "name": "fc", "op": "mat_mul", "inputs": ["x", "w"], "output": "y" }],
//!     "outputs": ["y"]
//! }"#;
//! let graph = GraphDef::from_json(json).unwrap().validate().unwrap();
//! assert_eq!(graph.value("y").unwrap().shape.dims(), &[1, 2]);
//! ```

mod error;
pub mod graph;
mod node;

pub use error::GraphError;
pub use graph::{GraphDef, Parsed, Validated};
pub use node::{NodeDef, OpKind, ValueDecl};
