// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element-wise kernels.

use super::f32_operand;
use crate::{Tensor, TensorError};

/// `sqrt(2/π)`, used by the tanh approximation of GELU.
const SQRT_2_OVER_PI: f32 = 0.797_884_6;

/// Cubic coefficient in the tanh approximation of GELU.
const GELU_COEFF: f32 = 0.044_715;

/// Adds `rhs` to `lhs`.
///
/// `rhs` must either match `lhs` exactly or match its trailing dimensions,
/// in which case it is repeated across the leading ones (the bias case:
/// `[B, N] + [N]`).
pub fn add(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor, TensorError> {
    let a = f32_operand("add", lhs)?;
    let b = f32_operand("add", rhs)?;

    if !lhs.shape().broadcast_suffix(rhs.shape()) || b.is_empty() {
        return Err(TensorError::ShapeMismatch {
            op: "add",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    let out: Vec<f32> = a
        .iter()
        .enumerate()
        .map(|(i, x)| x + b[i % b.len()])
        .collect();
    Tensor::from_f32(lhs.shape().clone(), &out)
}

/// Rectified linear unit: `max(x, 0)`.
pub fn relu(input: &Tensor) -> Result<Tensor, TensorError> {
    let x = f32_operand("relu", input)?;
    let out: Vec<f32> = x.iter().map(|v| v.max(0.0)).collect();
    Tensor::from_f32(input.shape().clone(), &out)
}

/// GELU with the tanh approximation used by GPT-2:
///
/// `0.5 * x * (1 + tanh(sqrt(2/π) * (x + 0.044715 * x³)))`
pub fn gelu(input: &Tensor) -> Result<Tensor, TensorError> {
    let x = f32_operand("gelu", input)?;
    let out: Vec<f32> = x
        .iter()
        .map(|&v| {
            let inner = SQRT_2_OVER_PI * (v + GELU_COEFF * v * v * v);
            0.5 * v * (1.0 + inner.tanh())
        })
        .collect();
    Tensor::from_f32(input.shape().clone(), &out)
}
