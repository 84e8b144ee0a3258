// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication.

use super::f32_operand;
use crate::{Tensor, TensorError};

/// Computes `lhs @ rhs`.
///
/// `rhs` must be `[K, N]`. `lhs` is `[..., M, K]`; leading dimensions are
/// treated as extra rows, so the output is `[..., M, N]`.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the inner dimensions differ or
/// either operand has rank < 2.
pub fn matmul(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor, TensorError> {
    let out_shape = lhs
        .shape()
        .matmul_output(rhs.shape())
        .ok_or_else(|| TensorError::ShapeMismatch {
            op: "matmul",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        })?;

    let a = f32_operand("matmul", lhs)?;
    let b = f32_operand("matmul", rhs)?;
    let (k, n) = (rhs.shape().dims()[0], rhs.shape().dims()[1]);
    let rows = a.len() / k.max(1);

    let mut c = vec![0.0f32; rows * n];
    // ikj order keeps the inner loop streaming over a row of `b`.
    for i in 0..rows {
        let c_row = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (c_ij, &b_pj) in c_row.iter_mut().zip(b_row) {
                *c_ij += a_ip * b_pj;
            }
        }
    }

    Tensor::from_f32(out_shape, &c)
}
