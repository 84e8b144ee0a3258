// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Deferred weight reads from a memory-mapped SafeTensors file.
//!
//! The file is mapped and its header indexed once; each
//! [`DeferredWeightReader::read`] copies a single tensor out of the mapping,
//! so only weights a graph actually declares are ever touched.

use super::{DeferredWeightReader, WeightDescriptor};
use crate::CompileError;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tensor_core::{DType, Shape};

/// Where one tensor lives inside the mapping.
#[derive(Debug, Clone)]
struct StoredTensor {
    dtype: Dtype,
    shape: Vec<usize>,
    /// Absolute byte range within the file.
    bytes: Range<usize>,
}

/// A [`DeferredWeightReader`] over a `.safetensors` file.
pub struct SafeTensorsReader {
    path: PathBuf,
    mmap: memmap2::Mmap,
    index: HashMap<String, StoredTensor>,
}

impl SafeTensorsReader {
    /// Maps the file, validates its header and indexes every tensor.
    pub fn open(path: &Path) -> Result<Self, CompileError> {
        let read_error = |detail: String| CompileError::WeightRead {
            name: path.display().to_string(),
            detail,
        };

        let file = std::fs::File::open(path).map_err(|e| read_error(format!("cannot open: {e}")))?;
        // SAFETY: the mapping is read-only and the file is not modified
        // while the reader is alive.
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| read_error(format!("mmap failed: {e}")))?;
        let (header_len, metadata) = SafeTensors::read_metadata(&mmap)
            .map_err(|e| read_error(format!("SafeTensors parse error: {e}")))?;

        // Offsets in the header are relative to the end of the header.
        let data_start = 8 + header_len;
        let index: HashMap<String, StoredTensor> = metadata
            .tensors()
            .into_iter()
            .map(|(name, info)| {
                let (start, end) = info.data_offsets;
                let stored = StoredTensor {
                    dtype: info.dtype,
                    shape: info.shape.clone(),
                    bytes: data_start + start..data_start + end,
                };
                (name, stored)
            })
            .collect();

        tracing::info!(
            "mapped {} ({:.2} MB, {} tensors)",
            path.display(),
            mmap.len() as f64 / (1024.0 * 1024.0),
            index.len(),
        );
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists every tensor in the file as a deferred descriptor, sorted by
    /// name. Tensors with a dtype this runtime has no equivalent for are
    /// skipped.
    pub fn descriptors(&self) -> Vec<WeightDescriptor> {
        let mut out: Vec<WeightDescriptor> = self
            .index
            .iter()
            .filter_map(|(name, stored)| {
                let dtype = convert_dtype(stored.dtype)?;
                Some(WeightDescriptor::deferred(
                    name.clone(),
                    Shape::new(stored.shape.clone()),
                    dtype,
                ))
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl DeferredWeightReader for SafeTensorsReader {
    fn read(&self, descriptor: &WeightDescriptor) -> Result<Vec<u8>, CompileError> {
        let stored = self
            .index
            .get(&descriptor.name)
            .ok_or_else(|| CompileError::WeightRead {
                name: descriptor.name.clone(),
                detail: format!("not found in {}", self.path.display()),
            })?;

        let stored_dtype = convert_dtype(stored.dtype);
        if stored_dtype != Some(descriptor.dtype) || stored.shape != descriptor.shape.dims() {
            return Err(CompileError::InvalidWeight {
                name: descriptor.name.clone(),
                detail: format!(
                    "file holds {:?} {:?}, descriptor says {} {}",
                    stored.dtype,
                    stored.shape,
                    descriptor.dtype,
                    descriptor.shape
                ),
            });
        }
        let data = self
            .mmap
            .get(stored.bytes.clone())
            .ok_or_else(|| CompileError::WeightRead {
                name: descriptor.name.clone(),
                detail: format!("byte range {:?} lies outside the file", stored.bytes),
            })?;
        Ok(data.to_vec())
    }
}

impl std::fmt::Debug for SafeTensorsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeTensorsReader")
            .field("path", &self.path)
            .field("bytes", &self.mmap.len())
            .field("tensors", &self.index.len())
            .finish()
    }
}

fn convert_dtype(dtype: Dtype) -> Option<DType> {
    match dtype {
        Dtype::F32 => Some(DType::F32),
        Dtype::F16 => Some(DType::F16),
        Dtype::BF16 => Some(DType::BF16),
        Dtype::I8 => Some(DType::I8),
        _ => None,
    }
}
