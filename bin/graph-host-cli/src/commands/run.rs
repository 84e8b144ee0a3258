// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `graph-host run` command: register a model, execute it once and print
//! its outputs.

use anyhow::{bail, Context};
use host_runtime::{to_chrome_trace, ExecutionContext, ExecutionManager};
use std::collections::HashMap;
use std::path::PathBuf;
use tensor_core::{DType, Tensor};

pub async fn execute(
    config: Option<PathBuf>,
    model: PathBuf,
    weights: Option<PathBuf>,
    inputs: Vec<String>,
    priority: u64,
    trace: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              graph-host · Graph Runner               ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    let config = super::load_config(config.as_deref())?;
    println!("  Config:");
    println!("   Model:    {}", model.display());
    if let Some(w) = &weights {
        println!("   Weights:  {}", w.display());
    }
    println!("   Backend:  {}", config.backend);
    println!("   Device:   {}", config.device_memory);
    println!("   Workers:  {}", config.resolve_workers());
    println!("   Priority: {priority}");
    println!();

    let manager = ExecutionManager::new(config)?;

    // ── Registration ───────────────────────────────────────────
    println!("  [1/2] Compiling and registering...");
    let id = super::register(&manager, &model, weights.as_ref())?;
    let network = manager
        .lookup(id)
        .context("network vanished right after registration")?;
    println!("        {}", network.summary());
    println!();

    // ── Execution ──────────────────────────────────────────────
    let mut values = parse_inputs(&inputs)?;
    let mut ctx = ExecutionContext::new();
    for decl in network.inputs() {
        let tensor = match values.remove(&decl.name) {
            Some(v) => {
                if v.len() != decl.shape.num_elements() {
                    bail!(
                        "input '{}' expects {} values for shape {}, got {}",
                        decl.name,
                        decl.shape.num_elements(),
                        decl.shape,
                        v.len()
                    );
                }
                Tensor::from_f32(decl.shape.clone(), &v)?
            }
            None => {
                tracing::warn!("input '{}' not given; using zeros", decl.name);
                Tensor::zeros(decl.shape.clone(), DType::F32)
            }
        };
        ctx.set_input(decl.name.clone(), tensor);
    }
    for unused in values.keys() {
        tracing::warn!("ignoring value for unknown input '{unused}'");
    }
    if trace.is_some() {
        ctx = ctx.with_trace();
    }
    drop(network);

    println!("  [2/2] Executing graph {id}...");
    let outcome = manager.run(id, ctx, priority).await;
    let ctx = outcome.result?;
    println!();

    // ── Outputs ────────────────────────────────────────────────
    println!("  Outputs:");
    let mut names: Vec<&String> = ctx.outputs().keys().collect();
    names.sort();
    for name in names {
        if let Some(tensor) = ctx.output(name) {
            let values = tensor.to_f32_vec()?;
            println!("   {name} {}: {}", tensor.shape(), format_values(&values, 8));
        }
    }
    println!();

    if let (Some(path), Some(events)) = (trace, outcome.trace) {
        let json = to_chrome_trace(&events)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing trace to '{}'", path.display()))?;
        println!("  Trace: {} events written to {}", events.len(), path.display());
        println!();
    }

    manager.unregister_graph(id)?;
    println!("{}", manager.stats().summary());
    println!("{}", manager.device().stats().summary());
    Ok(())
}

/// Parses `name=v1,v2,...` arguments.
fn parse_inputs(args: &[String]) -> anyhow::Result<HashMap<String, Vec<f32>>> {
    let mut out = HashMap::new();
    for arg in args {
        let (name, list) = arg
            .split_once('=')
            .with_context(|| format!("input '{arg}' is not of the form name=v1,v2,..."))?;
        let values = list
            .split(',')
            .map(|v| v.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("input '{name}' has a non-numeric value"))?;
        out.insert(name.trim().to_string(), values);
    }
    Ok(out)
}

fn format_values(values: &[f32], max: usize) -> String {
    let shown: Vec<String> = values.iter().take(max).map(|v| format!("{v:.4}")).collect();
    if values.len() > max {
        format!("[{}, ... ({} total)]", shown.join(", "), values.len())
    } else {
        format!("[{}]", shown.join(", "))
    }
}
