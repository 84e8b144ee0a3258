// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The backend capability.
//!
//! The registry and scheduler only ever talk to a backend through two
//! traits: [`Backend::compile`] turns model bytes plus weights into an
//! [`Executable`], and [`Executable::run`] executes it. Removal is dropping
//! the executable, which releases whatever device memory it reserved.

mod interpreter;
mod safetensors_reader;

pub use interpreter::InterpreterBackend;
pub use safetensors_reader::SafeTensorsReader;

use crate::{CompileError, ExecutionContext, GraphId, RuntimeError, TraceSink};
use graph_ir::ValueDecl;
use memory_manager::DevicePool;
use tensor_core::{DType, Shape, Tensor};

/// Lowers model bytes into an executable network.
pub trait Backend: Send + Sync {
    /// Short name used in logs and configuration.
    fn name(&self) -> &str;

    /// Compiles a model. Called outside any registry lock.
    fn compile(&self, request: CompileRequest<'_>) -> Result<Box<dyn Executable>, CompileError>;
}

/// A compiled, immutable network. Shared across concurrent executions.
pub trait Executable: Send + Sync {
    /// Graph name from the model.
    fn name(&self) -> &str;

    /// Declared inputs.
    fn inputs(&self) -> &[ValueDecl];

    /// Names of the outputs written into the context.
    fn outputs(&self) -> &[String];

    /// Device memory held for the lifetime of the executable.
    fn device_bytes(&self) -> usize;

    /// Executes once, reading inputs from and writing outputs to `ctx`.
    fn run(
        &self,
        ctx: &mut ExecutionContext,
        trace: Option<&mut TraceSink>,
    ) -> Result<(), RuntimeError>;
}

/// Everything a backend receives to compile one model.
pub struct CompileRequest<'a> {
    /// The id the network will be registered under.
    pub graph_id: GraphId,
    /// Opaque model encoding; the interpreter expects graph-ir JSON.
    pub model: &'a [u8],
    pub weights: &'a [WeightDescriptor],
    /// Source for weights whose descriptor carries no data.
    pub reader: Option<&'a dyn DeferredWeightReader>,
    /// Pool to reserve device memory from.
    pub device: &'a DevicePool,
}

/// Fetches weight bytes that were not supplied inline.
pub trait DeferredWeightReader {
    /// Returns the little-endian bytes for `descriptor`.
    fn read(&self, descriptor: &WeightDescriptor) -> Result<Vec<u8>, CompileError>;
}

/// A named weight, with its bytes inline or left to a
/// [`DeferredWeightReader`].
#[derive(Debug, Clone, PartialEq)]
pub struct WeightDescriptor {
    pub name: String,
    pub shape: Shape,
    pub dtype: DType,
    pub data: Option<Vec<u8>>,
}

impl WeightDescriptor {
    /// A weight whose bytes are supplied now.
    pub fn inline(name: impl Into<String>, tensor: Tensor) -> Self {
        let shape = tensor.shape().clone();
        let dtype = tensor.dtype();
        Self {
            name: name.into(),
            shape,
            dtype,
            data: Some(tensor.into_bytes()),
        }
    }

    /// A weight whose bytes come from the deferred reader at compile time.
    pub fn deferred(name: impl Into<String>, shape: Shape, dtype: DType) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
            data: None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.data.is_none()
    }

    /// Materialises the weight, going to `reader` if the bytes are not
    /// inline.
    pub fn resolve(
        &self,
        reader: Option<&dyn DeferredWeightReader>,
    ) -> Result<Tensor, CompileError> {
        let bytes = match (&self.data, reader) {
            (Some(data), _) => data.clone(),
            (None, Some(reader)) => reader.read(self)?,
            (None, None) => {
                return Err(CompileError::WeightRead {
                    name: self.name.clone(),
                    detail: "deferred weight but no reader was supplied".into(),
                })
            }
        };
        Tensor::from_bytes(self.shape.clone(), self.dtype, bytes).map_err(|e| {
            CompileError::InvalidWeight {
                name: self.name.clone(),
                detail: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ones;

    impl DeferredWeightReader for Ones {
        fn read(&self, d: &WeightDescriptor) -> Result<Vec<u8>, CompileError> {
            let n = d.shape.num_elements();
            Ok((0..n).flat_map(|_| 1.0f32.to_le_bytes()).collect())
        }
    }

    #[test]
    fn test_inline_resolve() {
        let t = Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap();
        let d = WeightDescriptor::inline("b", t.clone());
        assert!(!d.is_deferred());
        assert_eq!(d.resolve(None).unwrap(), t);
    }

    #[test]
    fn test_deferred_resolve() {
        let d = WeightDescriptor::deferred("w", Shape::matrix(2, 2), DType::F32);
        assert!(d.is_deferred());
        let t = d.resolve(Some(&Ones)).unwrap();
        assert_eq!(t.to_f32_vec().unwrap(), vec![1.0; 4]);
    }

    #[test]
    fn test_deferred_without_reader() {
        let d = WeightDescriptor::deferred("w", Shape::vector(2), DType::F32);
        assert!(matches!(d.resolve(None), Err(CompileError::WeightRead { .. })));
    }

    #[test]
    fn test_wrong_byte_count() {
        let d = WeightDescriptor {
            name: "w".into(),
            shape: Shape::vector(4),
            dtype: DType::F32,
            data: Some(vec![0u8; 3]),
        };
        assert!(matches!(d.resolve(None), Err(CompileError::InvalidWeight { .. })));
    }
}
