// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution requests, their outcomes and the single-fire completion.

use crate::{ExecutionContext, ExecutionError, GraphId, TraceEvent};

/// Callback invoked exactly once per submitted request.
pub type CompletionCallback = Box<dyn FnOnce(ExecutionOutcome) + Send + 'static>;

/// Process-unique id of one submitted request.
pub type RequestId = u64;

/// One asynchronous invocation of a registered network.
pub struct ExecutionRequest {
    pub graph_id: GraphId,
    pub context: ExecutionContext,
    /// Higher runs sooner.
    pub priority: u64,
    /// Collect trace events even if the context did not ask for them.
    pub collect_trace: bool,
    pub on_complete: CompletionCallback,
}

impl ExecutionRequest {
    pub fn new<F>(graph_id: GraphId, context: ExecutionContext, priority: u64, on_complete: F) -> Self
    where
        F: FnOnce(ExecutionOutcome) + Send + 'static,
    {
        Self {
            graph_id,
            context,
            priority,
            collect_trace: false,
            on_complete: Box::new(on_complete),
        }
    }

    pub fn with_trace(mut self) -> Self {
        self.collect_trace = true;
        self
    }
}

impl std::fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("graph_id", &self.graph_id)
            .field("priority", &self.priority)
            .field("collect_trace", &self.collect_trace)
            .finish()
    }
}

/// What a completion callback receives.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub request_id: RequestId,
    pub graph_id: GraphId,
    /// The context with its outputs filled in, or why there are none.
    pub result: Result<ExecutionContext, ExecutionError>,
    /// Trace events, if tracing was requested.
    pub trace: Option<Vec<TraceEvent>>,
}

impl ExecutionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// The error kind, if the request did not succeed.
    pub fn error_kind(&self) -> Option<crate::ErrorKind> {
        self.result.as_ref().err().map(|e| e.kind())
    }
}

/// Single-fire wrapper around a [`CompletionCallback`].
///
/// [`fire`](Completion::fire) consumes the completion, so it cannot run
/// twice. If a completion is dropped without firing (a worker unwinding,
/// for instance) the callback still runs with [`ErrorKind::ShutDown`].
///
/// [`ErrorKind::ShutDown`]: crate::ErrorKind::ShutDown
pub(crate) struct Completion {
    request_id: RequestId,
    graph_id: GraphId,
    callback: Option<CompletionCallback>,
}

impl Completion {
    pub(crate) fn new(request_id: RequestId, graph_id: GraphId, callback: CompletionCallback) -> Self {
        Self {
            request_id,
            graph_id,
            callback: Some(callback),
        }
    }

    pub(crate) fn fire(
        mut self,
        result: Result<ExecutionContext, ExecutionError>,
        trace: Option<Vec<TraceEvent>>,
    ) {
        self.deliver(result, trace);
    }

    fn deliver(
        &mut self,
        result: Result<ExecutionContext, ExecutionError>,
        trace: Option<Vec<TraceEvent>>,
    ) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let outcome = ExecutionOutcome {
            request_id: self.request_id,
            graph_id: self.graph_id,
            result,
            trace,
        };
        let request_id = self.request_id;
        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(outcome))) {
            tracing::error!(
                "completion callback for request {request_id} panicked: {}",
                crate::panic_message(panic.as_ref())
            );
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.callback.is_some() {
            tracing::warn!(
                "request {} dropped without a result; completing as shut down",
                self.request_id
            );
            let graph_id = self.graph_id;
            self.deliver(Err(ExecutionError::shut_down(graph_id)), None);
        }
    }
}
