// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Priority scheduler over a fixed pool of worker threads.
//!
//! # Request lifecycle
//! ```text
//! submit ──► Queued ──► Running ──► Completed | Failed
//!              │
//!              └─ cancel() ──► Cancelled
//! ```
//! Unknown graphs, a full queue and shutdown complete the request straight
//! from `submit` without queueing it. Every path fires the completion
//! exactly once.
//!
//! # Ordering
//! The queue is a `BTreeMap` keyed by `(Reverse(priority), request_id)`:
//! workers always pop the highest priority, and request ids increase with
//! submission, so equal priorities run in FIFO order. Running work is never
//! preempted.
//!
//! Before a completion fires the worker drops its network reference and its
//! [`ExecutionLease`], so a caller may unregister the graph from inside (or
//! right after) the callback.

use crate::registry::ExecutionLease;
use crate::request::{Completion, RequestId};
use crate::{
    lock, CompiledNetwork, ExecutionContext, ExecutionError, ExecutionRequest, GraphId,
    NetworkRegistry, RuntimeError, SchedulerStats, TraceSink,
};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Instant;

type QueueKey = (Reverse<u64>, RequestId);

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub num_workers: usize,
    /// Maximum queued (not yet running) requests; `None` is unbounded.
    pub max_pending_requests: Option<usize>,
    /// Trace every request.
    pub trace_by_default: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            max_pending_requests: None,
            trace_by_default: false,
        }
    }
}

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Queued,
    Running,
    /// Terminal: the completion has fired or is firing.
    Finished,
}

// ── Shared state ───────────────────────────────────────────────────

struct Job {
    request_id: RequestId,
    graph_id: GraphId,
    network: Arc<CompiledNetwork>,
    lease: ExecutionLease,
    context: ExecutionContext,
    trace: Option<TraceSink>,
    completion: Completion,
    enqueued_at: Instant,
}

#[derive(Default)]
struct QueueState {
    queue: BTreeMap<QueueKey, Job>,
    running: HashSet<RequestId>,
    shutting_down: bool,
}

struct Shared {
    registry: Arc<NetworkRegistry>,
    config: SchedulerConfig,
    state: Mutex<QueueState>,
    ready: Condvar,
    next_request: AtomicU64,
    stats: Mutex<SchedulerStats>,
}

impl Shared {
    fn worker_loop(&self, index: usize) {
        tracing::debug!("worker {index} started");
        loop {
            let job = {
                let mut state = lock(&self.state);
                loop {
                    if let Some((_, job)) = state.queue.pop_first() {
                        state.running.insert(job.request_id);
                        break job;
                    }
                    if state.shutting_down {
                        tracing::debug!("worker {index} exiting");
                        return;
                    }
                    state = self
                        .ready
                        .wait(state)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
            };
            self.execute(job);
        }
    }

    fn execute(&self, job: Job) {
        let Job {
            request_id,
            graph_id,
            network,
            lease,
            mut context,
            mut trace,
            completion,
            enqueued_at,
        } = job;

        let waited = enqueued_at.elapsed();
        if let Some(sink) = trace.as_mut() {
            sink.end("queued");
            sink.begin("execute");
        }
        tracing::debug!(
            "running request {request_id} on graph {graph_id} after {:.3}ms in queue",
            waited.as_secs_f64() * 1000.0
        );

        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| network.run(&mut context, trace.as_mut())))
            .unwrap_or_else(|panic| {
                let message = crate::panic_message(panic.as_ref());
                tracing::error!("request {request_id} panicked: {message}");
                Err(RuntimeError::Panicked(message))
            });
        let ran = started.elapsed();

        if let Some(sink) = trace.as_mut() {
            sink.end("execute");
        }
        // Release before completing so the graph can be removed from the
        // callback.
        drop(network);
        drop(lease);

        lock(&self.stats).record_run(result.is_ok(), waited, ran);
        let result = match result {
            Ok(()) => Ok(context),
            Err(e) => {
                tracing::warn!("request {request_id} on graph {graph_id} failed: {e}");
                Err(ExecutionError::runtime(graph_id, e))
            }
        };
        lock(&self.state).running.remove(&request_id);
        completion.fire(result, trace.map(TraceSink::into_events));
    }

    /// Completes a request that never ran.
    fn reject(&self, completion: Completion, error: ExecutionError) {
        tracing::warn!("request rejected: {error}");
        lock(&self.stats).rejected += 1;
        completion.fire(Err(error), None);
    }
}

// ── Scheduler ──────────────────────────────────────────────────────

/// Dispatches [`ExecutionRequest`]s onto a fixed worker pool in priority
/// order.
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Starts `config.num_workers` worker threads (at least one).
    pub fn new(registry: Arc<NetworkRegistry>, config: SchedulerConfig) -> std::io::Result<Self> {
        let num_workers = config.num_workers.max(1);
        let shared = Arc::new(Shared {
            registry,
            config,
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            next_request: AtomicU64::new(1),
            stats: Mutex::new(SchedulerStats::default()),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for index in 0..num_workers {
            let worker_shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("graph-worker-{index}"))
                .spawn(move || worker_shared.worker_loop(index));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Let the workers that did start exit.
                    lock(&shared.state).shutting_down = true;
                    shared.ready.notify_all();
                    return Err(e);
                }
            }
        }
        tracing::info!("scheduler started with {num_workers} worker(s)");

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Submits a request. The outcome arrives only through its callback;
    /// the returned handle can cancel it while it is still queued.
    pub fn submit(&self, request: ExecutionRequest) -> RequestHandle {
        let shared = &self.shared;
        let request_id = shared.next_request.fetch_add(1, Ordering::Relaxed);
        let ExecutionRequest {
            graph_id,
            mut context,
            priority,
            collect_trace,
            on_complete,
        } = request;
        let completion = Completion::new(request_id, graph_id, on_complete);
        lock(&shared.stats).submitted += 1;

        let Some((network, lease)) = shared.registry.acquire(graph_id) else {
            shared.reject(completion, ExecutionError::unknown_graph(graph_id));
            return RequestHandle::finished(request_id, graph_id);
        };

        let wants_trace = collect_trace || shared.config.trace_by_default || context.wants_trace();
        let mut trace = context
            .take_trace_sink()
            .or_else(|| wants_trace.then(TraceSink::new));
        if let Some(sink) = trace.as_mut() {
            sink.begin("queued");
        }

        let key = (Reverse(priority), request_id);
        let mut state = lock(&shared.state);
        let rejection = if state.shutting_down {
            Some(ExecutionError::shut_down(graph_id))
        } else {
            match shared.config.max_pending_requests {
                Some(limit) if state.queue.len() >= limit => {
                    Some(ExecutionError::queue_full(graph_id, limit))
                }
                _ => None,
            }
        };
        if let Some(error) = rejection {
            drop(state);
            drop(network);
            drop(lease);
            shared.reject(completion, error);
            return RequestHandle::finished(request_id, graph_id);
        }

        state.queue.insert(
            key,
            Job {
                request_id,
                graph_id,
                network,
                lease,
                context,
                trace,
                completion,
                enqueued_at: Instant::now(),
            },
        );
        let depth = state.queue.len();
        drop(state);
        shared.ready.notify_one();

        lock(&shared.stats).record_depth(depth);
        tracing::debug!(
            "queued request {request_id} for graph {graph_id} at priority {priority} (depth {depth})"
        );
        RequestHandle {
            request_id,
            graph_id,
            key: Some(key),
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of queued (not yet running) requests.
    pub fn pending(&self) -> usize {
        lock(&self.shared.state).queue.len()
    }

    /// Number of requests currently executing.
    pub fn running(&self) -> usize {
        lock(&self.shared.state).running.len()
    }

    pub fn num_workers(&self) -> usize {
        lock(&self.workers).len()
    }

    pub fn stats(&self) -> SchedulerStats {
        lock(&self.shared.stats).clone()
    }

    /// Stops accepting work, completes every queued request with
    /// [`ErrorKind::ShutDown`](crate::ErrorKind::ShutDown), lets running
    /// requests finish and joins the workers. Idempotent.
    pub fn shutdown(&self) {
        let drained: Vec<Job> = {
            let mut state = lock(&self.shared.state);
            if state.shutting_down {
                Vec::new()
            } else {
                state.shutting_down = true;
                std::mem::take(&mut state.queue).into_values().collect()
            }
        };
        self.shared.ready.notify_all();

        if !drained.is_empty() {
            tracing::info!("shutting down with {} queued request(s)", drained.len());
        }
        for job in drained {
            let Job {
                graph_id,
                network,
                lease,
                completion,
                ..
            } = job;
            drop(network);
            drop(lease);
            self.shared.reject(completion, ExecutionError::shut_down(graph_id));
        }

        let workers = std::mem::take(&mut *lock(&self.workers));
        let current = std::thread::current().id();
        for handle in workers {
            // A callback that drops the last manager runs on a worker.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("a worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.num_workers())
            .field("pending", &self.pending())
            .field("running", &self.running())
            .finish()
    }
}

// ── Request handle ─────────────────────────────────────────────────

/// Returned by [`Scheduler::submit`]; used to cancel or observe a request.
///
/// The handle does not keep the scheduler alive.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    request_id: RequestId,
    graph_id: GraphId,
    key: Option<QueueKey>,
    shared: Weak<Shared>,
}

impl RequestHandle {
    fn finished(request_id: RequestId, graph_id: GraphId) -> Self {
        Self {
            request_id,
            graph_id,
            key: None,
            shared: Weak::new(),
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    /// Cancels the request if it has not started running.
    ///
    /// Returns `true` if it was still queued: it is removed, its lease
    /// released and its completion fired with
    /// [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled). Returns
    /// `false` once it is running or finished; the real outcome is then
    /// delivered as usual.
    pub fn cancel(&self) -> bool {
        let (Some(key), Some(shared)) = (self.key, self.shared.upgrade()) else {
            return false;
        };
        let Some(job) = lock(&shared.state).queue.remove(&key) else {
            return false;
        };

        let Job {
            graph_id,
            network,
            lease,
            completion,
            ..
        } = job;
        drop(network);
        drop(lease);
        lock(&shared.stats).cancelled += 1;
        tracing::warn!("request {} cancelled while queued", self.request_id);
        completion.fire(Err(ExecutionError::cancelled(graph_id)), None);
        true
    }

    pub fn state(&self) -> RequestState {
        let (Some(key), Some(shared)) = (self.key, self.shared.upgrade()) else {
            return RequestState::Finished;
        };
        let state = lock(&shared.state);
        if state.queue.contains_key(&key) {
            RequestState::Queued
        } else if state.running.contains(&self.request_id) {
            RequestState::Running
        } else {
            RequestState::Finished
        }
    }
}
