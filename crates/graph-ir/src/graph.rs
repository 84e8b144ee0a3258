// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph definition with compile-time validation state.
//!
//! # Type-State Pattern
//!
//! ```text
//! GraphDef<Parsed>     : read from JSON or built in code, not yet checked.
//!       │  .validate()
//!       ▼
//! GraphDef<Validated>  : names resolved, shapes inferred, ready to compile.
//! ```
//!
//! Backends only accept `GraphDef<Validated>`, so they never see a dangling
//! name or an operator with the wrong number of inputs.

use crate::{GraphError, NodeDef, OpKind, ValueDecl};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tensor_core::{DType, Shape};

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph has been parsed but not validated.
#[derive(Debug, Clone)]
pub struct Parsed;

/// Marker: graph has been validated and is ready for compilation.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Parsed {}
impl GraphState for Validated {}

// ── Serialized form ────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct GraphDoc {
    name: String,
    #[serde(default)]
    inputs: Vec<ValueDecl>,
    #[serde(default)]
    weights: Vec<ValueDecl>,
    #[serde(default)]
    nodes: Vec<NodeDef>,
    #[serde(default)]
    outputs: Vec<String>,
}

// ── GraphDef ───────────────────────────────────────────────────────

/// A computation graph: declared inputs and weights, an ordered node list
/// and the names of the values returned to the caller.
#[derive(Debug, Clone)]
pub struct GraphDef<S: GraphState = Parsed> {
    doc: GraphDoc,
    /// Every value's shape and dtype; filled in by validation.
    values: HashMap<String, ValueDecl>,
    _state: std::marker::PhantomData<S>,
}

// ── Parsed state ───────────────────────────────────────────────────

impl GraphDef<Parsed> {
    /// Creates an empty graph to be filled with the builder methods.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_doc(GraphDoc {
            name: name.into(),
            inputs: Vec::new(),
            weights: Vec::new(),
            nodes: Vec::new(),
            outputs: Vec::new(),
        })
    }

    /// Parses a graph from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, GraphError> {
        let doc: GraphDoc = serde_json::from_slice(bytes)?;
        Ok(Self::from_doc(doc))
    }

    /// Reads and parses a graph file.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let bytes = std::fs::read(path)?;
        tracing::debug!("read graph file {} ({} bytes)", path.display(), bytes.len());
        Self::from_json(&bytes)
    }

    fn from_doc(doc: GraphDoc) -> Self {
        Self {
            doc,
            values: HashMap::new(),
            _state: std::marker::PhantomData,
        }
    }

    /// Declares a graph input.
    pub fn input(mut self, name: impl Into<String>, shape: Shape, dtype: DType) -> Self {
        self.doc.inputs.push(ValueDecl::new(name, shape, dtype));
        self
    }

    /// Declares a weight.
    pub fn weight(mut self, name: impl Into<String>, shape: Shape, dtype: DType) -> Self {
        self.doc.weights.push(ValueDecl::new(name, shape, dtype));
        self
    }

    /// Appends a node.
    pub fn node(mut self, node: NodeDef) -> Self {
        self.doc.nodes.push(node);
        self
    }

    /// Marks a value as a graph output.
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.doc.outputs.push(name.into());
        self
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - At least one output is declared.
    /// - Input, weight and node-output names are unique.
    /// - Declared inputs and weights have no zero-sized dimension.
    /// - Every value's byte size, and the weight and activation totals,
    ///   fit in `usize`.
    /// - Every node uses a known operator with the right number of inputs.
    /// - Every node input is defined earlier (inputs, weights, or a prior
    ///   node's output); this also rules out cycles.
    /// - Operand shapes are compatible; the result shape is inferred.
    /// - Every graph output names a defined value.
    pub fn validate(self) -> Result<GraphDef<Validated>, GraphError> {
        let doc = self.doc;
        if doc.outputs.is_empty() {
            return Err(GraphError::InvalidGraph(format!(
                "graph '{}' declares no outputs",
                doc.name
            )));
        }

        let mut values: HashMap<String, ValueDecl> = HashMap::new();
        for decl in doc.inputs.iter().chain(&doc.weights) {
            if decl.shape.dims().contains(&0) {
                return Err(GraphError::InvalidGraph(format!(
                    "value '{}' has zero-sized shape {}",
                    decl.name, decl.shape
                )));
            }
            check_size(decl)?;
            if values.insert(decl.name.clone(), decl.clone()).is_some() {
                return Err(GraphError::DuplicateValue(decl.name.clone()));
            }
        }

        for node in &doc.nodes {
            let op = node.op_kind()?;
            if node.inputs.len() != op.arity() {
                return Err(GraphError::InvalidNode {
                    node: node.name.clone(),
                    detail: format!(
                        "{op} takes {} inputs, got {}",
                        op.arity(),
                        node.inputs.len()
                    ),
                });
            }
            let operands = node
                .inputs
                .iter()
                .map(|name| {
                    values.get(name).ok_or_else(|| GraphError::UndefinedValue {
                        node: node.name.clone(),
                        value: name.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let shape = infer_shape(node, op, &operands)?;
            let out = ValueDecl::new(node.output.clone(), shape, operands[0].dtype);
            check_size(&out)?;
            if values.insert(node.output.clone(), out).is_some() {
                return Err(GraphError::DuplicateValue(node.output.clone()));
            }
        }

        for output in &doc.outputs {
            if !values.contains_key(output) {
                return Err(GraphError::UnknownOutput(output.clone()));
            }
        }

        let weight_bytes = checked_total(&doc.weights);
        let activation_bytes =
            checked_total(doc.nodes.iter().filter_map(|n| values.get(&n.output)));
        if weight_bytes
            .zip(activation_bytes)
            .and_then(|(w, a)| w.checked_add(a))
            .is_none()
        {
            return Err(GraphError::InvalidGraph(format!(
                "graph '{}' needs more memory than the address space holds",
                doc.name
            )));
        }

        tracing::debug!(
            "validated graph '{}': {} nodes, {} values",
            doc.name,
            doc.nodes.len(),
            values.len()
        );
        Ok(GraphDef {
            doc,
            values,
            _state: std::marker::PhantomData,
        })
    }
}

/// Rejects a value whose byte size overflows `usize`.
fn check_size(decl: &ValueDecl) -> Result<(), GraphError> {
    match decl.shape.checked_size_bytes(decl.dtype) {
        Some(_) => Ok(()),
        None => Err(GraphError::InvalidGraph(format!(
            "value '{}' with shape {} is too large to address",
            decl.name, decl.shape
        ))),
    }
}

/// Sums the byte sizes of `decls`, or `None` on overflow.
fn checked_total<'a>(decls: impl IntoIterator<Item = &'a ValueDecl>) -> Option<usize> {
    decls
        .into_iter()
        .try_fold(0usize, |acc, d| acc.checked_add(d.shape.checked_size_bytes(d.dtype)?))
}

/// Infers the output shape of `node` from its operand declarations.
fn infer_shape(node: &NodeDef, op: OpKind, operands: &[&ValueDecl]) -> Result<Shape, GraphError> {
    let invalid = |detail: String| GraphError::InvalidNode {
        node: node.name.clone(),
        detail,
    };

    match op {
        OpKind::MatMul => operands[0]
            .shape
            .matmul_output(&operands[1].shape)
            .ok_or_else(|| {
                invalid(format!(
                    "cannot multiply {} by {}",
                    operands[0].shape, operands[1].shape
                ))
            }),
        OpKind::Add => {
            if !operands[0].shape.broadcast_suffix(&operands[1].shape) {
                return Err(invalid(format!(
                    "cannot broadcast {} onto {}",
                    operands[1].shape, operands[0].shape
                )));
            }
            Ok(operands[0].shape.clone())
        }
        OpKind::LayerNorm => {
            let width = operands[0].shape.last_dim();
            for param in &operands[1..] {
                if param.shape.rank() != 1 || Some(param.shape.num_elements()) != width {
                    return Err(invalid(format!(
                        "parameter '{}' {} does not match normalised width of {}",
                        param.name, param.shape, operands[0].shape
                    )));
                }
            }
            if let Some(eps) = node.attr("eps") {
                if eps <= 0.0 {
                    return Err(invalid(format!("eps must be positive, got {eps}")));
                }
            }
            Ok(operands[0].shape.clone())
        }
        OpKind::Relu | OpKind::Gelu | OpKind::Softmax | OpKind::Identity => {
            Ok(operands[0].shape.clone())
        }
    }
}

// ── Validated state ────────────────────────────────────────────────

impl GraphDef<Validated> {
    /// Returns the shape and dtype of any value in the graph.
    pub fn value(&self, name: &str) -> Option<&ValueDecl> {
        self.values.get(name)
    }

    /// Total bytes of all declared weights.
    pub fn total_weight_bytes(&self) -> usize {
        checked_total(&self.doc.weights).unwrap_or(usize::MAX)
    }

    /// Bytes of every intermediate value produced during one execution.
    pub fn activation_bytes(&self) -> usize {
        checked_total(self.doc.nodes.iter().filter_map(|n| self.values.get(&n.output)))
            .unwrap_or(usize::MAX)
    }

    /// Returns a summary string describing the graph.
    pub fn summary(&self) -> String {
        format!(
            "Graph '{}': {} inputs, {} outputs, {} nodes, {:.2} KB weights, {:.2} KB activations",
            self.doc.name,
            self.doc.inputs.len(),
            self.doc.outputs.len(),
            self.doc.nodes.len(),
            self.total_weight_bytes() as f64 / 1024.0,
            self.activation_bytes() as f64 / 1024.0,
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> GraphDef<S> {
    pub fn name(&self) -> &str {
        &self.doc.name
    }

    pub fn inputs(&self) -> &[ValueDecl] {
        &self.doc.inputs
    }

    pub fn weights(&self) -> &[ValueDecl] {
        &self.doc.weights
    }

    pub fn nodes(&self) -> &[NodeDef] {
        &self.doc.nodes
    }

    pub fn outputs(&self) -> &[String] {
        &self.doc.outputs
    }

    /// Serializes the graph back to JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, GraphError> {
        Ok(serde_json::to_vec_pretty(&self.doc)?)
    }
}

impl<S: GraphState> fmt::Display for GraphDef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GraphDef '{}' ({} nodes):", self.doc.name, self.doc.nodes.len())?;
        for input in &self.doc.inputs {
            writeln!(f, "  input  {} {} {}", input.name, input.shape, input.dtype)?;
        }
        for weight in &self.doc.weights {
            writeln!(f, "  weight {} {} {}", weight.name, weight.shape, weight.dtype)?;
        }
        for node in &self.doc.nodes {
            writeln!(f, "  {}", node.summary())?;
        }
        writeln!(f, "  outputs: {}", self.doc.outputs.join(", "))
    }
}
