// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-execution trace events.
//!
//! A [`TraceSink`] travels with a request that asked for tracing. The
//! scheduler records how long the request waited in the queue and how long
//! it ran; backends add their own spans (one per node for the interpreter).
//! The collected events come back in the completion outcome and can be
//! exported with [`to_chrome_trace`] for `chrome://tracing` or Perfetto.

use std::collections::HashMap;
use std::time::Instant;

/// Whether an event opens a span, closes it, or marks a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TracePhase {
    Begin,
    End,
    Instant,
}

impl TracePhase {
    fn chrome_code(self) -> &'static str {
        match self {
            Self::Begin => "B",
            Self::End => "E",
            Self::Instant => "i",
        }
    }
}

/// A single timestamped event.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TraceEvent {
    pub name: String,
    pub phase: TracePhase,
    /// Microseconds since the sink was created.
    pub timestamp_us: u64,
    /// Name of the thread that recorded the event.
    pub thread: String,
}

/// Collects [`TraceEvent`]s for one execution.
#[derive(Debug, Clone)]
pub struct TraceSink {
    epoch: Instant,
    events: Vec<TraceEvent>,
}

impl TraceSink {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            events: Vec::new(),
        }
    }

    pub fn begin(&mut self, name: impl Into<String>) {
        self.record(name.into(), TracePhase::Begin);
    }

    pub fn end(&mut self, name: impl Into<String>) {
        self.record(name.into(), TracePhase::End);
    }

    pub fn instant(&mut self, name: impl Into<String>) {
        self.record(name.into(), TracePhase::Instant);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    fn record(&mut self, name: String, phase: TracePhase) {
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        self.events.push(TraceEvent {
            name,
            phase,
            timestamp_us: self.epoch.elapsed().as_micros() as u64,
            thread,
        });
    }
}

impl Default for TraceSink {
    fn default() -> Self {
        Self::new()
    }
}

// ── Chrome trace export ────────────────────────────────────────────

#[derive(serde::Serialize)]
struct ChromeEvent<'a> {
    name: &'a str,
    ph: &'static str,
    ts: u64,
    pid: u32,
    tid: usize,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ChromeTrace<'a> {
    trace_events: Vec<ChromeEvent<'a>>,
}

/// Renders events in the Chrome trace-event JSON format.
///
/// Thread names are mapped to small integer `tid`s in order of first
/// appearance.
pub fn to_chrome_trace(events: &[TraceEvent]) -> Result<String, serde_json::Error> {
    let mut tids: HashMap<&str, usize> = HashMap::new();
    let trace_events = events
        .iter()
        .map(|e| {
            let next = tids.len() + 1;
            let tid = *tids.entry(e.thread.as_str()).or_insert(next);
            ChromeEvent {
                name: &e.name,
                ph: e.phase.chrome_code(),
                ts: e.timestamp_us,
                pid: 1,
                tid,
            }
        })
        .collect();
    serde_json::to_string_pretty(&ChromeTrace { trace_events })
}
