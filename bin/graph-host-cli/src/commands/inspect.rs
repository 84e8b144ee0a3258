// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `graph-host inspect` command: display a model's interface, nodes and
//! memory estimates.

use graph_ir::GraphDef;
use std::path::PathBuf;

pub async fn execute(model: PathBuf) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║             graph-host · Model Inspector             ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let graph = GraphDef::from_file(&model)
        .and_then(|g| g.validate())
        .map_err(|e| anyhow::anyhow!("failed to load model from '{}': {e}", model.display()))?;

    println!("  {}", graph.summary());
    println!();

    // ── Interface ──────────────────────────────────────────────
    println!("  Inputs:");
    for v in graph.inputs() {
        println!("   {:<24} {:<16} {}", super::truncate(&v.name, 24), v.shape.to_string(), v.dtype);
    }
    println!("  Weights:");
    for v in graph.weights() {
        println!(
            "   {:<24} {:<16} {:<5} {:>8.1} KB",
            super::truncate(&v.name, 24),
            v.shape.to_string(),
            v.dtype.to_string(),
            v.size_bytes() as f64 / 1024.0,
        );
    }
    println!("  Outputs:");
    for name in graph.outputs() {
        if let Some(v) = graph.value(name) {
            println!("   {:<24} {:<16} {}", super::truncate(name, 24), v.shape.to_string(), v.dtype);
        }
    }
    println!();

    // ── Nodes ──────────────────────────────────────────────────
    println!("  {:<4} {:<50} {:>16}", "Idx", "Node", "Output shape");
    println!("  {}", "-".repeat(72));
    for (i, node) in graph.nodes().iter().enumerate() {
        let shape = graph
            .value(&node.output)
            .map(|v| v.shape.to_string())
            .unwrap_or_default();
        println!("  {:<4} {:<50} {:>16}", i, super::truncate(&node.summary(), 50), shape);
    }
    println!();

    let total = graph.total_weight_bytes() + graph.activation_bytes();
    println!(
        "  Device memory: {:.2} KB resident, up to {:.2} KB while executing",
        graph.total_weight_bytes() as f64 / 1024.0,
        total as f64 / 1024.0,
    );
    Ok(())
}
