// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: register, execute, cancel, remove and shut down.
//!
//! Ordering-sensitive cases use a gated backend whose executables report
//! when they start and then block until the test opens the gate, so the
//! queue contents are known exactly when requests are submitted.

use graph_ir::{GraphDef, NodeDef, OpKind, ValueDecl};
use host_runtime::backend::{Backend, CompileRequest, Executable, WeightDescriptor};
use host_runtime::{
    to_chrome_trace, CompileError, ErrorKind, ExecutionContext, ExecutionManager,
    ExecutionOutcome, GraphId, ManagerConfig, RemovalError, RequestState, RuntimeError,
    TraceSink,
};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tensor_core::{DType, Shape, Tensor};

const WAIT: Duration = Duration::from_secs(10);

// ── Helpers ────────────────────────────────────────────────────

#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }

    fn wait(&self) {
        let guard = self.open.lock().unwrap();
        let _ = self
            .changed
            .wait_timeout_while(guard, WAIT, |open| !*open)
            .unwrap();
    }
}

/// Compiles model bytes of the form `"gated:<tag>"`, `"free:<tag>"` or
/// `"panic:<tag>"`. Every run reports its tag on the `started` channel.
struct GateBackend {
    gate: Arc<Gate>,
    started: Mutex<Sender<String>>,
}

struct GateExecutable {
    tag: String,
    mode: String,
    gate: Arc<Gate>,
    started: Mutex<Sender<String>>,
}

impl Backend for GateBackend {
    fn name(&self) -> &str {
        "gate"
    }

    fn compile(&self, request: CompileRequest<'_>) -> Result<Box<dyn Executable>, CompileError> {
        let text = std::str::from_utf8(request.model)
            .map_err(|e| CompileError::Backend(e.to_string()))?;
        let (mode, tag) = text
            .split_once(':')
            .ok_or_else(|| CompileError::Backend(format!("bad test model '{text}'")))?;
        Ok(Box::new(GateExecutable {
            tag: tag.to_string(),
            mode: mode.to_string(),
            gate: Arc::clone(&self.gate),
            started: Mutex::new(self.started.lock().unwrap().clone()),
        }))
    }
}

impl Executable for GateExecutable {
    fn name(&self) -> &str {
        &self.tag
    }

    fn inputs(&self) -> &[ValueDecl] {
        &[]
    }

    fn outputs(&self) -> &[String] {
        &[]
    }

    fn device_bytes(&self) -> usize {
        0
    }

    fn run(
        &self,
        ctx: &mut ExecutionContext,
        _trace: Option<&mut TraceSink>,
    ) -> Result<(), RuntimeError> {
        let _ = self.started.lock().unwrap().send(self.tag.clone());
        match self.mode.as_str() {
            "gated" => self.gate.wait(),
            "panic" => panic!("executable {} exploded", self.tag),
            _ => {}
        }
        ctx.set_output("tag", Tensor::scalar_f32(self.tag.len() as f32));
        Ok(())
    }
}

struct Harness {
    manager: Arc<ExecutionManager>,
    gate: Arc<Gate>,
    started: Receiver<String>,
    done_tx: Sender<(String, ExecutionOutcome)>,
    done: Receiver<(String, ExecutionOutcome)>,
}

impl Harness {
    fn new(workers: usize, max_pending: Option<usize>) -> Self {
        let gate = Arc::new(Gate::default());
        let (started_tx, started) = mpsc::channel();
        let backend = GateBackend {
            gate: Arc::clone(&gate),
            started: Mutex::new(started_tx),
        };
        let config = ManagerConfig {
            num_workers: Some(workers),
            max_pending_requests: max_pending,
            ..Default::default()
        };
        let manager = ExecutionManager::builder(config)
            .backend(Arc::new(backend))
            .build()
            .unwrap();
        let (done_tx, done) = mpsc::channel();
        Self {
            manager: Arc::new(manager),
            gate,
            started,
            done_tx,
            done,
        }
    }

    fn register(&self, model: &str) -> GraphId {
        self.manager.register_graph(model.as_bytes(), &[], None).unwrap()
    }

    /// Submits `id`; the outcome arrives on `done` labelled with `label`.
    fn submit(&self, id: GraphId, priority: u64, label: &str) -> host_runtime::RequestHandle {
        let tx = self.done_tx.clone();
        let label = label.to_string();
        self.manager
            .execute_async(id, ExecutionContext::new(), priority, move |outcome| {
                let _ = tx.send((label, outcome));
            })
    }

    fn wait_started(&self) -> String {
        self.started.recv_timeout(WAIT).expect("executable never started")
    }

    fn next_done(&self) -> (String, ExecutionOutcome) {
        self.done.recv_timeout(WAIT).expect("completion never fired")
    }
}

/// y = relu(x @ w + b) with x:[1,2]; for x = [1, 2] the result is [5.5, 0].
fn mlp_model() -> Vec<u8> {
    GraphDef::new("mlp")
        .input("x", Shape::matrix(1, 2), DType::F32)
        .weight("w", Shape::matrix(2, 2), DType::F32)
        .weight("b", Shape::vector(2), DType::F32)
        .node(NodeDef::new("fc", OpKind::MatMul, &["x", "w"], "h"))
        .node(NodeDef::new("bias", OpKind::Add, &["h", "b"], "hb"))
        .node(NodeDef::new("act", OpKind::Relu, &["hb"], "y"))
        .output("y")
        .to_json()
        .unwrap()
}

fn mlp_weights() -> Vec<WeightDescriptor> {
    vec![
        WeightDescriptor::inline(
            "w",
            Tensor::from_f32(Shape::matrix(2, 2), &[1.0, -1.0, 2.0, 0.5]).unwrap(),
        ),
        WeightDescriptor::inline("b", Tensor::from_f32(Shape::vector(2), &[0.5, -10.0]).unwrap()),
    ]
}

fn mlp_input() -> ExecutionContext {
    ExecutionContext::new().with_input("x", Tensor::from_f32(Shape::matrix(1, 2), &[1.0, 2.0]).unwrap())
}

fn interpreter_manager(workers: usize) -> ExecutionManager {
    ExecutionManager::new(ManagerConfig {
        num_workers: Some(workers),
        device_memory: "4M".into(),
        ..Default::default()
    })
    .unwrap()
}

// ── Identifiers ────────────────────────────────────────────────

#[test]
fn test_ids_distinct_and_increasing() {
    let m = interpreter_manager(1);
    let ids: Vec<GraphId> = (0..5)
        .map(|_| m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap())
        .collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(m.registry().ids(), ids);
}

#[test]
fn test_concurrent_registration_distinct_ids() {
    let m = Arc::new(interpreter_manager(1));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            std::thread::spawn(move || {
                (0..10)
                    .map(|_| m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut all: Vec<GraphId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 40);
    assert_eq!(m.registry().len(), 40);
}

// ── Priority ordering ──────────────────────────────────────────

#[test]
fn test_higher_priority_runs_first() {
    let h = Harness::new(1, None);
    let blocker = h.register("gated:blocker");
    let work = h.register("free:work");

    h.submit(blocker, 0, "blocker");
    assert_eq!(h.wait_started(), "blocker");

    h.submit(work, 5, "e1");
    h.submit(work, 10, "e2");
    h.submit(work, 10, "e3");
    assert_eq!(h.manager.scheduler().pending(), 3);

    h.gate.open();
    let order: Vec<String> = (0..4).map(|_| h.next_done().0).collect();
    assert_eq!(order, vec!["blocker", "e2", "e3", "e1"]);
}

// ── Removal ────────────────────────────────────────────────────

#[test]
fn test_remove_busy_while_running() {
    let h = Harness::new(1, None);
    let id = h.register("gated:slow");
    h.submit(id, 0, "slow");
    h.wait_started();

    assert_eq!(
        h.manager.unregister_graph(id),
        Err(RemovalError::Busy { id, outstanding: 1 })
    );
    assert!(h.manager.lookup(id).is_some());

    h.gate.open();
    let (_, outcome) = h.next_done();
    assert!(outcome.is_ok());
    assert_eq!(h.manager.unregister_graph(id), Ok(()));
    assert_eq!(h.manager.unregister_graph(id), Err(RemovalError::NotFound(id)));
}

#[test]
fn test_remove_busy_while_queued() {
    let h = Harness::new(1, None);
    let blocker = h.register("gated:blocker");
    let queued = h.register("free:queued");
    h.submit(blocker, 0, "blocker");
    h.wait_started();
    let handle = h.submit(queued, 0, "queued");

    assert!(matches!(
        h.manager.unregister_graph(queued),
        Err(RemovalError::Busy { .. })
    ));
    assert!(handle.cancel());
    assert_eq!(h.manager.unregister_graph(queued), Ok(()));
    h.gate.open();
}

#[test]
fn test_unregister_from_callback() {
    let m = Arc::new(interpreter_manager(1));
    let id = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let (tx, rx) = mpsc::channel();
    let m2 = Arc::clone(&m);
    m.execute_async(id, mlp_input(), 0, move |_| {
        let _ = tx.send(m2.unregister_graph(id));
    });
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Ok(()));
    assert!(m.lookup(id).is_none());
}

// ── Cancellation ───────────────────────────────────────────────

#[test]
fn test_cancel_queued_request() {
    let h = Harness::new(1, None);
    let blocker = h.register("gated:blocker");
    let work = h.register("free:work");

    let running = h.submit(blocker, 0, "blocker");
    h.wait_started();
    let queued = h.submit(work, 1, "queued");
    assert_eq!(queued.state(), RequestState::Queued);
    assert_eq!(running.state(), RequestState::Running);

    assert!(queued.cancel());
    let (label, outcome) = h.next_done();
    assert_eq!(label, "queued");
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(queued.state(), RequestState::Finished);
    assert!(!queued.cancel());

    // Too late for the running one; it completes normally.
    assert!(!running.cancel());
    h.gate.open();
    let (label, outcome) = h.next_done();
    assert_eq!(label, "blocker");
    assert!(outcome.is_ok());
    assert!(h.done.recv_timeout(Duration::from_millis(100)).is_err());

    let stats = h.manager.stats();
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.completed, 1);
}

// ── Unknown graphs ─────────────────────────────────────────────

#[test]
fn test_unknown_graph_completes_immediately() {
    let h = Harness::new(1, None);
    let handle = h.submit(GraphId::from_raw(404), 0, "ghost");
    let (_, outcome) = h.done.try_recv().expect("completion should fire inside submit");
    assert_eq!(outcome.error_kind(), Some(ErrorKind::UnknownGraph));
    assert_eq!(outcome.graph_id, GraphId::from_raw(404));
    assert_eq!(handle.state(), RequestState::Finished);
    assert!(!handle.cancel());
}

#[test]
fn test_unknown_after_removal() {
    let h = Harness::new(1, None);
    let id = h.register("free:gone");
    h.manager.unregister_graph(id).unwrap();
    h.submit(id, 0, "gone");
    let (_, outcome) = h.next_done();
    assert_eq!(outcome.error_kind(), Some(ErrorKind::UnknownGraph));
    assert_eq!(h.manager.stats().rejected, 1);
}

// ── Failures ───────────────────────────────────────────────────

#[test]
fn test_panicking_executable_reports_runtime_error() {
    let h = Harness::new(1, None);
    let id = h.register("panic:boom");
    h.submit(id, 0, "boom");
    let (_, outcome) = h.next_done();
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Runtime));
    let err = outcome.result.unwrap_err();
    assert!(matches!(err.runtime_error(), Some(RuntimeError::Panicked(_))));

    // The worker survives.
    let ok = h.register("free:after");
    h.submit(ok, 0, "after");
    assert!(h.next_done().1.is_ok());
}

#[test]
fn test_missing_input_reports_runtime_error() {
    let m = interpreter_manager(1);
    let id = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let (tx, rx) = mpsc::channel();
    m.execute_async(id, ExecutionContext::new(), 0, move |o| {
        let _ = tx.send(o);
    });
    let outcome = rx.recv_timeout(WAIT).unwrap();
    let err = outcome.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert!(matches!(err.runtime_error(), Some(RuntimeError::MissingInput(name)) if name == "x"));
}

// ── Exactly-once delivery ──────────────────────────────────────

#[test]
fn test_every_request_completes_exactly_once() {
    let m = interpreter_manager(4);
    let id = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let counts: Arc<Mutex<HashMap<u64, usize>>> = Arc::default();
    let (tx, rx) = mpsc::channel();

    let total = 200;
    let mut handles = Vec::new();
    for i in 0..total {
        let counts = Arc::clone(&counts);
        let tx = tx.clone();
        let target = if i % 10 == 0 { GraphId::from_raw(9999) } else { id };
        handles.push(m.execute_async(target, mlp_input(), (i % 7) as u64, move |o| {
            *counts.lock().unwrap().entry(o.request_id).or_default() += 1;
            let _ = tx.send(o.error_kind());
        }));
    }
    // Some of these may already be running; either way they complete once.
    for h in handles.iter().step_by(3) {
        h.cancel();
    }

    let kinds: Vec<Option<ErrorKind>> = (0..total).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
    m.shutdown();
    drop(tx);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    let counts = counts.lock().unwrap();
    assert_eq!(counts.len(), total);
    assert!(counts.values().all(|&n| n == 1));
    assert_eq!(
        kinds.iter().filter(|k| **k == Some(ErrorKind::UnknownGraph)).count(),
        total / 10
    );

    let stats = m.stats();
    assert_eq!(stats.submitted, total as u64);
    assert_eq!(stats.finished(), total as u64);
    assert_eq!(stats.failed, 0);
    assert_eq!(m.registry().outstanding(id), Some(0));
}

// ── Back-pressure ──────────────────────────────────────────────

#[test]
fn test_queue_full() {
    let h = Harness::new(1, Some(2));
    let blocker = h.register("gated:blocker");
    let work = h.register("free:work");
    h.submit(blocker, 0, "blocker");
    h.wait_started();

    h.submit(work, 0, "a");
    h.submit(work, 0, "b");
    h.submit(work, 0, "c");
    let (label, outcome) = h.done.try_recv().expect("overflow should complete inside submit");
    assert_eq!(label, "c");
    assert_eq!(outcome.error_kind(), Some(ErrorKind::QueueFull));

    h.gate.open();
    let mut rest: Vec<String> = (0..3).map(|_| h.next_done().0).collect();
    rest.sort();
    assert_eq!(rest, vec!["a", "b", "blocker"]);
}

// ── Shutdown ───────────────────────────────────────────────────

#[test]
fn test_shutdown_completes_queued_requests() {
    let h = Harness::new(1, None);
    let blocker = h.register("gated:blocker");
    let work = h.register("free:work");
    h.submit(blocker, 0, "blocker");
    h.wait_started();
    h.submit(work, 1, "q1");
    h.submit(work, 2, "q2");

    let manager = Arc::clone(&h.manager);
    let stopper = std::thread::spawn(move || manager.shutdown());

    let mut drained: Vec<(String, Option<ErrorKind>)> = (0..2)
        .map(|_| {
            let (label, o) = h.next_done();
            (label, o.error_kind())
        })
        .collect();
    drained.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        drained,
        vec![
            ("q1".to_string(), Some(ErrorKind::ShutDown)),
            ("q2".to_string(), Some(ErrorKind::ShutDown)),
        ]
    );

    h.gate.open();
    let (label, outcome) = h.next_done();
    assert_eq!(label, "blocker");
    assert!(outcome.is_ok());
    stopper.join().unwrap();

    // Nothing is accepted afterwards.
    h.submit(work, 0, "late");
    let (_, outcome) = h.next_done();
    assert_eq!(outcome.error_kind(), Some(ErrorKind::ShutDown));
    assert_eq!(h.manager.registry().outstanding(work), Some(0));
}

// ── Device memory ──────────────────────────────────────────────

#[test]
fn test_device_memory_released() {
    let m = interpreter_manager(2);
    let a = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let b = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let per_graph = m.lookup(a).unwrap().device_bytes();
    assert_eq!(per_graph, 6 * 4);
    assert_eq!(m.device().reserved_bytes(), 2 * per_graph);

    let (tx, rx) = mpsc::channel();
    for _ in 0..10 {
        let tx = tx.clone();
        m.execute_async(b, mlp_input(), 0, move |o| {
            let _ = tx.send(o.is_ok());
        });
    }
    assert!((0..10).all(|_| rx.recv_timeout(WAIT).unwrap()));

    m.unregister_graph(a).unwrap();
    m.unregister_graph(b).unwrap();
    assert_eq!(m.device().reserved_bytes(), 0);
    assert_eq!(m.device().stats().live_reservations(), 0);
}

#[test]
fn test_registration_fails_when_device_full() {
    let m = ExecutionManager::new(ManagerConfig {
        num_workers: Some(1),
        device_memory: "40".into(),
        ..Default::default()
    })
    .unwrap();
    m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let err = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap_err();
    assert!(matches!(err, CompileError::OutOfDeviceMemory(_)));
    assert_eq!(m.registry().len(), 1);
}

#[test]
#[cfg(target_pointer_width = "64")]
fn test_oversized_model_is_a_compile_error() {
    let m = interpreter_manager(1);
    let model = br#"{
        "name": "huge",
        "inputs": [{ "name": "x", "shape": [4294967296, 4294967296, 16] }],
        "nodes": [{ "name": "r", "op": "relu", "inputs": ["x"], "output": "y" }],
        "outputs": ["y"]
    }"#;
    let err = m.register_graph(model, &[], None).unwrap_err();
    assert!(matches!(err, CompileError::Graph(_)), "got {err:?}");
    assert_eq!(m.registry().len(), 0);
    assert_eq!(m.device().reserved_bytes(), 0);

    // The manager is still usable afterwards.
    m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
}

// ── Async API ──────────────────────────────────────────────────

#[tokio::test]
async fn test_run_interpreter_mlp() {
    let m = interpreter_manager(2);
    let id = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let outcome = m.run(id, mlp_input(), 3).await;
    let mut ctx = outcome.result.unwrap();
    let y = ctx.take_output("y").unwrap();
    assert_eq!(y.shape().dims(), &[1, 2]);
    assert_eq!(y.to_f32_vec().unwrap(), vec![5.5, 0.0]);
    assert_eq!(ctx.input("x").unwrap().to_f32_vec().unwrap(), vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_concurrent_runs() {
    let m = Arc::new(interpreter_manager(4));
    let id = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let tasks: Vec<_> = (0..16u64)
        .map(|p| {
            let m = Arc::clone(&m);
            tokio::spawn(async move { m.run(id, mlp_input(), p).await.is_ok() })
        })
        .collect();
    for t in tasks {
        assert!(t.await.unwrap());
    }
    assert_eq!(m.stats().completed, 16);
}

// ── Tracing ────────────────────────────────────────────────────

#[tokio::test]
async fn test_trace_export() {
    let m = interpreter_manager(1);
    let id = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let outcome = m.run(id, mlp_input().with_trace(), 0).await;
    let events = outcome.trace.expect("trace requested");
    // queued, execute and three nodes, each a begin/end pair.
    assert_eq!(events.len(), 10);

    let json = to_chrome_trace(&events).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let trace_events = value["traceEvents"].as_array().unwrap();
    assert_eq!(trace_events.len(), 10);
    assert_eq!(trace_events[0]["name"], "queued");
    assert_eq!(trace_events[0]["ph"], "B");
}

#[test]
fn test_trace_by_default() {
    let m = ExecutionManager::new(ManagerConfig {
        num_workers: Some(1),
        trace_by_default: true,
        ..Default::default()
    })
    .unwrap();
    let id = m.register_graph(&mlp_model(), &mlp_weights(), None).unwrap();
    let (tx, rx) = mpsc::channel();
    m.execute_async(id, mlp_input(), 0, move |o| {
        let _ = tx.send(o.trace.map(|t| t.len()));
    });
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(10));
}
