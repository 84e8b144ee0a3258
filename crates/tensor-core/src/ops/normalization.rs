// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Row-wise normalisation kernels over the last dimension.

use super::f32_operand;
use crate::{Tensor, TensorError};

/// Softmax over the last dimension, subtracting the row maximum before
/// exponentiation.
pub fn softmax(input: &Tensor) -> Result<Tensor, TensorError> {
    let x = f32_operand("softmax", input)?;
    let width = input.shape().last_dim().unwrap_or(1).max(1);

    let mut out = Vec::with_capacity(x.len());
    for row in x.chunks(width) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = row.iter().map(|v| (v - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        out.extend(exps.iter().map(|e| e / sum));
    }
    Tensor::from_f32(input.shape().clone(), &out)
}

/// Layer normalisation: `gamma * (x - mean) / sqrt(var + eps) + beta`.
///
/// `gamma` and `beta` must be 1-D with the length of the last dimension.
pub fn layer_norm(
    input: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    eps: f32,
) -> Result<Tensor, TensorError> {
    let width = match input.shape().last_dim() {
        Some(w) if w > 0 => w,
        _ => {
            return Err(TensorError::ShapeMismatch {
                op: "layer_norm",
                lhs: input.shape().clone(),
                rhs: gamma.shape().clone(),
            })
        }
    };
    for param in [gamma, beta] {
        if param.shape().rank() != 1 || param.shape().num_elements() != width {
            return Err(TensorError::ShapeMismatch {
                op: "layer_norm",
                lhs: input.shape().clone(),
                rhs: param.shape().clone(),
            });
        }
    }

    let x = f32_operand("layer_norm", input)?;
    let g = f32_operand("layer_norm", gamma)?;
    let b = f32_operand("layer_norm", beta)?;

    let mut out = Vec::with_capacity(x.len());
    for row in x.chunks(width) {
        let mean = row.iter().sum::<f32>() / width as f32;
        let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / width as f32;
        let inv_std = 1.0 / (var + eps).sqrt();
        out.extend(
            row.iter()
                .zip(g.iter().zip(&b))
                .map(|(v, (gi, bi))| gi * (v - mean) * inv_std + bi),
        );
    }
    Tensor::from_f32(input.shape().clone(), &out)
}
