// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `graph-host bench` command: flood the scheduler with requests at mixed
//! priorities and report throughput and per-priority latency.

use host_runtime::{ExecutionContext, ExecutionManager, ManagerConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tensor_core::{DType, Tensor};

pub async fn execute(
    config: Option<PathBuf>,
    model: PathBuf,
    weights: Option<PathBuf>,
    requests: usize,
    priorities: u64,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║            graph-host · Scheduler Benchmark          ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let mut config: ManagerConfig = super::load_config(config.as_deref())?;
    if workers.is_some() {
        config.num_workers = workers;
    }
    let priorities = priorities.max(1);

    println!("  Config:");
    println!("   Model:      {}", model.display());
    println!("   Workers:    {}", config.resolve_workers());
    println!("   Requests:   {requests}");
    println!("   Priorities: 0..{}", priorities - 1);
    println!();

    let manager = ExecutionManager::new(config)?;
    let id = super::register(&manager, &model, weights.as_ref())?;
    let inputs: Vec<(String, Tensor)> = match manager.lookup(id) {
        Some(network) => network
            .inputs()
            .iter()
            .map(|d| (d.name.clone(), Tensor::zeros(d.shape.clone(), DType::F32)))
            .collect(),
        None => anyhow::bail!("graph {id} disappeared after registration"),
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let start = Instant::now();
    for i in 0..requests {
        let mut ctx = ExecutionContext::new();
        for (name, tensor) in &inputs {
            ctx.set_input(name.clone(), tensor.clone());
        }
        let priority = i as u64 % priorities;
        let submitted = Instant::now();
        let tx = tx.clone();
        manager.execute_async(id, ctx, priority, move |outcome| {
            let _ = tx.send((priority, submitted.elapsed(), outcome.is_ok()));
        });
    }
    drop(tx);

    let mut latencies: BTreeMap<u64, Vec<Duration>> = BTreeMap::new();
    let mut failures = 0usize;
    while let Some((priority, latency, ok)) = rx.recv().await {
        if !ok {
            failures += 1;
        }
        latencies.entry(priority).or_default().push(latency);
    }
    let elapsed = start.elapsed();

    // ── Results ────────────────────────────────────────────────
    println!(
        "  Completed {requests} requests in {:.2} ms ({:.0} req/s), {failures} failed",
        elapsed.as_secs_f64() * 1000.0,
        requests as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
    );
    println!();
    println!("  {:<10} {:>8} {:>12} {:>12}", "Priority", "Count", "Mean (ms)", "p95 (ms)");
    println!("  {}", "-".repeat(46));
    for (priority, mut samples) in latencies.into_iter().rev() {
        samples.sort();
        let mean = samples.iter().sum::<Duration>() / samples.len() as u32;
        let p95 = samples[(samples.len() * 95 / 100).min(samples.len() - 1)];
        println!(
            "  {:<10} {:>8} {:>12.3} {:>12.3}",
            priority,
            samples.len(),
            mean.as_secs_f64() * 1000.0,
            p95.as_secs_f64() * 1000.0,
        );
    }
    println!();

    manager.unregister_graph(id)?;
    println!("{}", manager.stats().summary());
    println!("{}", manager.device().stats().summary());
    Ok(())
}
