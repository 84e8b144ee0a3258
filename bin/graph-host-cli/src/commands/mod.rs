// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and the helpers they share.

pub mod bench;
pub mod inspect;
pub mod run;

use anyhow::Context;
use host_runtime::backend::{SafeTensorsReader, WeightDescriptor};
use host_runtime::{ExecutionManager, GraphId, ManagerConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();
}

/// Loads the manager config from `path`, or the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ManagerConfig> {
    match path {
        Some(path) => ManagerConfig::from_file(path)
            .with_context(|| format!("loading config from '{}'", path.display())),
        None => Ok(ManagerConfig::default()),
    }
}

/// Reads the model file and registers it, with weights from an optional
/// SafeTensors file.
pub fn register(
    manager: &ExecutionManager,
    model: &Path,
    weights: Option<&PathBuf>,
) -> anyhow::Result<GraphId> {
    let bytes = std::fs::read(model)
        .with_context(|| format!("reading model '{}'", model.display()))?;

    let id = match weights {
        Some(path) => {
            let reader = SafeTensorsReader::open(path)?;
            let descriptors: Vec<WeightDescriptor> = reader.descriptors();
            manager.register_graph(&bytes, &descriptors, Some(&reader))?
        }
        None => manager.register_graph(&bytes, &[], None)?,
    };
    Ok(id)
}

/// Shortens `s` to at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
