// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for device memory accounting.

/// Errors that can occur when reserving device memory or parsing budgets.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The requested reservation would exceed the memory budget.
    #[error("out of device memory reserving '{label}': requested {requested_bytes} bytes, {available_bytes} available (budget: {budget_bytes})")]
    OutOfMemory {
        label: String,
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    /// Attempted to reserve zero bytes.
    #[error("cannot reserve a zero-sized region")]
    ZeroSized,

    /// A budget string could not be parsed.
    #[error("invalid memory budget '{input}': {reason}")]
    InvalidBudget { input: String, reason: String },
}
