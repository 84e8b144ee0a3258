// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The per-invocation execution context.
//!
//! A context is built by the caller, moved into the scheduler on submission
//! and handed back inside the completion outcome. Outputs can therefore only
//! be read once the request has reached a terminal state.

use crate::{ContextError, TraceSink};
use std::collections::HashMap;
use tensor_core::Tensor;

/// Bound inputs, produced outputs and an optional trace sink for one
/// execution.
///
/// # Example
/// ```
/// use host_runtime::ExecutionContext;
/// use tensor_core::{Shape, Tensor};
///
/// let ctx = ExecutionContext::new()
///     .with_input("x", Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap())
///     .with_trace();
/// assert!(ctx.input("x").is_some());
/// assert!(ctx.wants_trace());
/// ```
#[derive(Debug, Default)]
pub struct ExecutionContext {
    inputs: HashMap<String, Tensor>,
    outputs: HashMap<String, Tensor>,
    trace: Option<TraceSink>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an input, replacing any previous binding of the same name.
    pub fn with_input(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.set_input(name, tensor);
        self
    }

    /// Requests trace collection for this execution.
    pub fn with_trace(mut self) -> Self {
        self.trace.get_or_insert_with(TraceSink::new);
        self
    }

    pub fn set_input(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.inputs.insert(name.into(), tensor);
    }

    pub fn input(&self, name: &str) -> Option<&Tensor> {
        self.inputs.get(name)
    }

    pub fn inputs(&self) -> &HashMap<String, Tensor> {
        &self.inputs
    }

    /// Stores an output. Called by backends.
    pub fn set_output(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.outputs.insert(name.into(), tensor);
    }

    pub fn output(&self, name: &str) -> Option<&Tensor> {
        self.outputs.get(name)
    }

    pub fn outputs(&self) -> &HashMap<String, Tensor> {
        &self.outputs
    }

    /// Moves an output out of the context.
    pub fn take_output(&mut self, name: &str) -> Option<Tensor> {
        self.outputs.remove(name)
    }

    /// Maps each requested output name to its buffer.
    ///
    /// # Errors
    /// [`ContextError::UnknownOutput`] for the first name that was not
    /// produced.
    pub fn bind_outputs<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<HashMap<String, &Tensor>, ContextError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.outputs
                    .get(name)
                    .map(|t| (name.to_string(), t))
                    .ok_or_else(|| ContextError::UnknownOutput(name.to_string()))
            })
            .collect()
    }

    pub fn wants_trace(&self) -> bool {
        self.trace.is_some()
    }

    pub(crate) fn take_trace_sink(&mut self) -> Option<TraceSink> {
        self.trace.take()
    }
}
