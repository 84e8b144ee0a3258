// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the reference kernels.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tensor_core::{ops, Shape, Tensor};

fn square(n: usize) -> Tensor {
    let values: Vec<f32> = (0..n * n).map(|i| (i % 17) as f32 * 0.1).collect();
    Tensor::from_f32(Shape::matrix(n, n), &values).unwrap()
}

fn bench_matmul(c: &mut Criterion) {
    let a = square(64);
    let b = square(64);
    c.bench_function("matmul 64x64", |bench| {
        bench.iter(|| ops::matmul(black_box(&a), black_box(&b)).unwrap())
    });
}

fn bench_softmax(c: &mut Criterion) {
    let x = square(128);
    c.bench_function("softmax 128x128", |bench| {
        bench.iter(|| ops::softmax(black_box(&x)).unwrap())
    });
}

criterion_group!(benches, bench_matmul, bench_softmax);
criterion_main!(benches);
