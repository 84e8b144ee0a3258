// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph identifiers and their allocator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, process-unique identifier of a registered network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct GraphId(u64);

impl GraphId {
    /// Wraps a raw value. Only useful for lookups of ids obtained elsewhere
    /// (e.g. parsed from a command line); registration never hands these out.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues strictly increasing [`GraphId`]s.
///
/// There is no way to give an id back: a removed id stays consumed, so a
/// stale id can never alias a later registration. Share one allocator
/// (`Arc<GraphIdAllocator>`) between managers that must not collide.
#[derive(Debug)]
pub struct GraphIdAllocator {
    next: AtomicU64,
}

impl GraphIdAllocator {
    /// Creates an allocator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Returns a fresh id. Never blocks, never fails.
    pub fn allocate(&self) -> GraphId {
        GraphId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to [`allocate`](Self::allocate) would return.
    pub fn peek_next(&self) -> GraphId {
        GraphId(self.next.load(Ordering::Relaxed))
    }
}

impl Default for GraphIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
