// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operators, nodes and value declarations.
//!
//! A [`NodeDef`] keeps its operator as the raw string from the graph file so
//! that an unknown operator is reported as [`GraphError::UnsupportedOp`]
//! with the node name, rather than as an opaque JSON error.

use crate::GraphError;
use std::collections::BTreeMap;
use tensor_core::{DType, Shape};

/// The operators a graph may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// `x @ w` with `w` of shape `[K, N]`.
    MatMul,
    /// Element-wise add with trailing-dimension broadcast.
    Add,
    /// Rectified linear unit.
    Relu,
    /// GELU (tanh approximation).
    Gelu,
    /// Softmax over the last dimension.
    Softmax,
    /// Layer normalisation with `gamma` and `beta`; optional `eps` attribute.
    LayerNorm,
    /// Pass-through.
    Identity,
}

impl OpKind {
    /// Parses an operator name. Accepts snake_case and a few common
    /// spellings (`"matmul"`, `"layernorm"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mat_mul" | "matmul" => Some(Self::MatMul),
            "add" => Some(Self::Add),
            "relu" => Some(Self::Relu),
            "gelu" => Some(Self::Gelu),
            "softmax" => Some(Self::Softmax),
            "layer_norm" | "layernorm" => Some(Self::LayerNorm),
            "identity" => Some(Self::Identity),
            _ => None,
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatMul => "mat_mul",
            Self::Add => "add",
            Self::Relu => "relu",
            Self::Gelu => "gelu",
            Self::Softmax => "softmax",
            Self::LayerNorm => "layer_norm",
            Self::Identity => "identity",
        }
    }

    /// Number of inputs the operator consumes.
    pub fn arity(&self) -> usize {
        match self {
            Self::MatMul | Self::Add => 2,
            Self::LayerNorm => 3,
            Self::Relu | Self::Gelu | Self::Softmax | Self::Identity => 1,
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared graph input or weight.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValueDecl {
    pub name: String,
    pub shape: Shape,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
}

fn default_dtype() -> DType {
    DType::F32
}

impl ValueDecl {
    pub fn new(name: impl Into<String>, shape: Shape, dtype: DType) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
        }
    }

    /// Size of a tensor matching this declaration.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }
}

/// One operator application.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeDef {
    /// Unique node name, used in errors and trace spans.
    pub name: String,
    /// Operator name as written in the graph file.
    pub op: String,
    /// Names of the values consumed, in operator order.
    pub inputs: Vec<String>,
    /// Name of the value produced.
    pub output: String,
    /// Numeric attributes (e.g. `eps` for `layer_norm`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, f64>,
}

impl NodeDef {
    pub fn new(
        name: impl Into<String>,
        op: OpKind,
        inputs: &[&str],
        output: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            op: op.as_str().to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            output: output.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Adds a numeric attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: f64) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Resolves the operator.
    pub fn op_kind(&self) -> Result<OpKind, GraphError> {
        OpKind::parse(&self.op).ok_or_else(|| GraphError::UnsupportedOp {
            node: self.name.clone(),
            op: self.op.clone(),
        })
    }

    /// Returns a numeric attribute, if present.
    pub fn attr(&self, key: &str) -> Option<f64> {
        self.attrs.get(key).copied()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} = {}({}) [{}]",
            self.output,
            self.op,
            self.inputs.join(", "),
            self.name
        )
    }
}
