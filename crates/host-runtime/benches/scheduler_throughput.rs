// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for registration and scheduled execution.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use graph_ir::{GraphDef, NodeDef, OpKind};
use host_runtime::backend::WeightDescriptor;
use host_runtime::{ExecutionContext, ExecutionManager, ManagerConfig};
use std::sync::mpsc;
use tensor_core::{DType, Shape, Tensor};

const HIDDEN: usize = 64;

fn mlp_model() -> Vec<u8> {
    GraphDef::new("bench-mlp")
        .input("x", Shape::matrix(1, HIDDEN), DType::F32)
        .weight("w", Shape::matrix(HIDDEN, HIDDEN), DType::F32)
        .weight("b", Shape::vector(HIDDEN), DType::F32)
        .node(NodeDef::new("fc", OpKind::MatMul, &["x", "w"], "h"))
        .node(NodeDef::new("bias", OpKind::Add, &["h", "b"], "hb"))
        .node(NodeDef::new("act", OpKind::Gelu, &["hb"], "y"))
        .output("y")
        .to_json()
        .expect("static graph serialises")
}

fn mlp_weights() -> Vec<WeightDescriptor> {
    let w: Vec<f32> = (0..HIDDEN * HIDDEN).map(|i| (i % 17) as f32 * 0.01).collect();
    let b = vec![0.1; HIDDEN];
    vec![
        WeightDescriptor::inline("w", Tensor::from_f32(Shape::matrix(HIDDEN, HIDDEN), &w).unwrap()),
        WeightDescriptor::inline("b", Tensor::from_f32(Shape::vector(HIDDEN), &b).unwrap()),
    ]
}

fn input() -> ExecutionContext {
    let x = vec![0.5; HIDDEN];
    ExecutionContext::new().with_input("x", Tensor::from_f32(Shape::matrix(1, HIDDEN), &x).unwrap())
}

fn manager(workers: usize) -> ExecutionManager {
    ExecutionManager::new(ManagerConfig {
        num_workers: Some(workers),
        device_memory: "64M".into(),
        ..Default::default()
    })
    .unwrap()
}

fn bench_register(c: &mut Criterion) {
    let m = manager(1);
    let model = mlp_model();
    let weights = mlp_weights();
    c.bench_function("register_unregister", |b| {
        b.iter(|| {
            let id = m.register_graph(&model, &weights, None).unwrap();
            m.unregister_graph(id).unwrap();
        })
    });
}

fn bench_throughput(c: &mut Criterion) {
    const REQUESTS: usize = 256;
    let mut group = c.benchmark_group("scheduler_throughput");
    group.throughput(Throughput::Elements(REQUESTS as u64));

    for workers in [1, 2, 4] {
        let m = manager(workers);
        let id = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| {
                let (tx, rx) = mpsc::channel();
                for i in 0..REQUESTS {
                    let tx = tx.clone();
                    m.execute_async(id, input(), (i % 4) as u64, move |o| {
                        let _ = tx.send(o.is_ok());
                    });
                }
                drop(tx);
                assert_eq!(rx.iter().filter(|ok| *ok).count(), REQUESTS);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_register, bench_throughput);
criterion_main!(benches);
