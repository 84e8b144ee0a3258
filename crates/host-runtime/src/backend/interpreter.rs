// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference backend: interprets a graph-ir graph node by node on the host.
//!
//! Compilation validates the graph, resolves every weight and reserves its
//! bytes in the device pool for the life of the network. Each execution
//! additionally reserves the graph's activation footprint, so a crowded
//! pool surfaces as a runtime error instead of unbounded growth.

use super::{Backend, CompileRequest, Executable};
use crate::{CompileError, ExecutionContext, RuntimeError, TraceSink};
use graph_ir::{GraphDef, OpKind, ValueDecl};
use memory_manager::{DevicePool, Reservation};
use std::collections::HashMap;
use tensor_core::{ops, DType, Tensor};

/// Default `eps` for `layer_norm` when the node carries none.
const DEFAULT_LAYER_NORM_EPS: f32 = 1e-5;

/// Host-side interpreter for graph-ir JSON models (f32 only).
#[derive(Debug, Default, Clone, Copy)]
pub struct InterpreterBackend;

impl InterpreterBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for InterpreterBackend {
    fn name(&self) -> &str {
        "interpreter"
    }

    fn compile(&self, request: CompileRequest<'_>) -> Result<Box<dyn Executable>, CompileError> {
        let graph = GraphDef::from_json(request.model)?.validate()?;

        for decl in graph.inputs().iter().chain(graph.weights()) {
            if decl.dtype != DType::F32 {
                return Err(CompileError::Unsupported(format!(
                    "value '{}' has dtype {}; the interpreter only executes f32",
                    decl.name, decl.dtype
                )));
            }
        }

        // ── Weights ────────────────────────────────────────────────
        let supplied: HashMap<&str, &super::WeightDescriptor> = request
            .weights
            .iter()
            .map(|w| (w.name.as_str(), w))
            .collect();
        let mut weights = HashMap::with_capacity(graph.weights().len());
        for decl in graph.weights() {
            let descriptor = supplied
                .get(decl.name.as_str())
                .ok_or_else(|| CompileError::MissingWeight {
                    name: decl.name.clone(),
                })?;
            if descriptor.shape != decl.shape || descriptor.dtype != decl.dtype {
                return Err(CompileError::InvalidWeight {
                    name: decl.name.clone(),
                    detail: format!(
                        "declared {} {}, supplied {} {}",
                        decl.shape, decl.dtype, descriptor.shape, descriptor.dtype
                    ),
                });
            }
            weights.insert(decl.name.clone(), descriptor.resolve(request.reader)?);
        }
        for extra in request
            .weights
            .iter()
            .filter(|w| graph.value(&w.name).is_none())
        {
            tracing::warn!(
                "graph '{}' ignores supplied weight '{}'",
                graph.name(),
                extra.name
            );
        }

        let weight_bytes = graph.total_weight_bytes();
        let weight_reservation = if weight_bytes > 0 {
            Some(request.device.reserve(
                weight_bytes,
                format!("{}#{}/weights", graph.name(), request.graph_id),
            )?)
        } else {
            None
        };

        // ── Plan ───────────────────────────────────────────────────
        let steps = graph
            .nodes()
            .iter()
            .map(|node| {
                Ok(Step {
                    node: node.name.clone(),
                    op: node.op_kind()?,
                    inputs: node.inputs.clone(),
                    output: node.output.clone(),
                    eps: node
                        .attr("eps")
                        .map(|e| e as f32)
                        .unwrap_or(DEFAULT_LAYER_NORM_EPS),
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;

        tracing::debug!("interpreter compiled {}", graph.summary());
        Ok(Box::new(InterpretedNetwork {
            name: graph.name().to_string(),
            label: format!("{}#{}", graph.name(), request.graph_id),
            inputs: graph.inputs().to_vec(),
            outputs: graph.outputs().to_vec(),
            weights,
            steps,
            activation_bytes: graph.activation_bytes(),
            device: request.device.clone(),
            weight_reservation,
        }))
    }
}

/// One node, lowered.
#[derive(Debug)]
struct Step {
    node: String,
    op: OpKind,
    inputs: Vec<String>,
    output: String,
    eps: f32,
}

struct InterpretedNetwork {
    name: String,
    label: String,
    inputs: Vec<ValueDecl>,
    outputs: Vec<String>,
    weights: HashMap<String, Tensor>,
    steps: Vec<Step>,
    activation_bytes: usize,
    device: DevicePool,
    /// Held for the network's lifetime; dropping the network frees it.
    weight_reservation: Option<Reservation>,
}

impl InterpretedNetwork {
    fn check_inputs(&self, ctx: &ExecutionContext) -> Result<(), RuntimeError> {
        for decl in &self.inputs {
            let bound = ctx
                .input(&decl.name)
                .ok_or_else(|| RuntimeError::MissingInput(decl.name.clone()))?;
            if bound.shape() != &decl.shape || bound.dtype() != decl.dtype {
                return Err(RuntimeError::InputMismatch {
                    name: decl.name.clone(),
                    expected: format!("{} {}", decl.shape, decl.dtype),
                    actual: format!("{} {}", bound.shape(), bound.dtype()),
                });
            }
        }
        Ok(())
    }

    fn apply(&self, step: &Step, args: &[&Tensor]) -> Result<Tensor, RuntimeError> {
        let result = match step.op {
            OpKind::MatMul => ops::matmul(args[0], args[1]),
            OpKind::Add => ops::add(args[0], args[1]),
            OpKind::Relu => ops::relu(args[0]),
            OpKind::Gelu => ops::gelu(args[0]),
            OpKind::Softmax => ops::softmax(args[0]),
            OpKind::LayerNorm => ops::layer_norm(args[0], args[1], args[2], step.eps),
            OpKind::Identity => Ok(args[0].clone()),
        };
        result.map_err(|source| RuntimeError::Op {
            node: step.node.clone(),
            source,
        })
    }
}

impl Executable for InterpretedNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> &[ValueDecl] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn device_bytes(&self) -> usize {
        self.weight_reservation
            .as_ref()
            .map_or(0, |r| r.size_bytes())
    }

    fn run(
        &self,
        ctx: &mut ExecutionContext,
        mut trace: Option<&mut TraceSink>,
    ) -> Result<(), RuntimeError> {
        self.check_inputs(ctx)?;

        let _activations = if self.activation_bytes > 0 {
            Some(
                self.device
                    .reserve(self.activation_bytes, format!("{}/activations", self.label))?,
            )
        } else {
            None
        };

        let mut values: HashMap<&str, Tensor> = HashMap::with_capacity(self.steps.len());
        for step in &self.steps {
            if let Some(sink) = trace.as_deref_mut() {
                sink.begin(step.node.as_str());
            }

            let args = step
                .inputs
                .iter()
                .map(|name| {
                    values
                        .get(name.as_str())
                        .or_else(|| ctx.input(name))
                        .or_else(|| self.weights.get(name))
                        .ok_or_else(|| RuntimeError::MissingInput(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let out = self.apply(step, &args)?;
            values.insert(step.output.as_str(), out);

            if let Some(sink) = trace.as_deref_mut() {
                sink.end(step.node.as_str());
            }
        }

        for name in &self.outputs {
            let tensor = values
                .get(name.as_str())
                .or_else(|| ctx.input(name))
                .cloned()
                .ok_or_else(|| RuntimeError::MissingInput(name.clone()))?;
            ctx.set_output(name.clone(), tensor);
        }
        Ok(())
    }
}

impl std::fmt::Debug for InterpretedNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpretedNetwork")
            .field("label", &self.label)
            .field("steps", &self.steps.len())
            .field("weight_bytes", &self.device_bytes())
            .field("activation_bytes", &self.activation_bytes)
            .finish()
    }
}
