// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor data carriers shared by the graph host and its backends.
//!
//! This crate provides:
//! - [`Tensor`]: an owned, shaped, typed byte buffer. Input bindings,
//!   output buffers and static weights all travel as tensors.
//! - [`Shape`]: dimension descriptors.
//! - [`DType`]: supported element data types (f32, f16, bf16, i8).
//! - [`ops`]: reference f32 kernels used by the interpreter backend:
//!   matrix multiplication, broadcasting add, ReLU, GELU, softmax and
//!   layer normalization.
//!
//! Element data is stored little-endian so tensors can be moved between
//! threads, files and devices without re-encoding.

mod dtype;
mod error;
pub mod ops;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use shape::Shape;
pub use tensor::Tensor;
