// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference f32 kernels.
//!
//! Each kernel takes its operands by reference and returns a freshly
//! allocated output tensor. They are deliberately simple scalar loops: the
//! host treats kernels as a backend concern, and these exist so the
//! reference interpreter can execute small graphs end to end.

mod elementwise;
mod linalg;
mod normalization;

pub use elementwise::{add, gelu, relu};
pub use linalg::matmul;
pub use normalization::{layer_norm, softmax};

use crate::{DType, Tensor, TensorError};

/// Decodes an operand, rejecting anything that is not `F32`.
fn f32_operand(op: &'static str, t: &Tensor) -> Result<Vec<f32>, TensorError> {
    if t.dtype() != DType::F32 {
        return Err(TensorError::UnsupportedDType {
            op,
            dtype: t.dtype(),
        });
    }
    t.to_f32_vec()
}
