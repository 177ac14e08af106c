// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Debug counters.
//!
//! Process-wide counters for structural-sharing behavior. They are
//! diagnostics only and never load-bearing; tests assert on deltas between
//! two [`snapshot`] calls.

use core::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct DebugCounter {
    #[allow(dead_code)]
    name: &'static str,
    value: AtomicU64,
}

impl DebugCounter {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

pub(crate) static SHAPES_ALLOCATED: DebugCounter = DebugCounter::new("shapes allocated");
pub(crate) static SHAPES_CLONED: DebugCounter = DebugCounter::new("shapes cloned");
pub(crate) static TRANSITION_CACHE_HITS: DebugCounter = DebugCounter::new("transition cache hits");
pub(crate) static TRANSITION_CACHE_MISSES: DebugCounter =
    DebugCounter::new("transition cache misses");
pub(crate) static PROPERTIES_GENERALIZED: DebugCounter =
    DebugCounter::new("properties generalized");
pub(crate) static SHAPES_INVALIDATED: DebugCounter = DebugCounter::new("shapes invalidated");
pub(crate) static FINAL_ASSUMPTIONS_INVALIDATED: DebugCounter =
    DebugCounter::new("final location assumptions invalidated");

/// A point-in-time snapshot of the engine's debug counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutStats {
    pub shapes_allocated: u64,
    pub shapes_cloned: u64,
    pub transition_cache_hits: u64,
    pub transition_cache_misses: u64,
    pub properties_generalized: u64,
    pub shapes_invalidated: u64,
    pub final_assumptions_invalidated: u64,
}

/// Snapshot the process-wide debug counters.
pub fn snapshot() -> LayoutStats {
    LayoutStats {
        shapes_allocated: SHAPES_ALLOCATED.get(),
        shapes_cloned: SHAPES_CLONED.get(),
        transition_cache_hits: TRANSITION_CACHE_HITS.get(),
        transition_cache_misses: TRANSITION_CACHE_MISSES.get(),
        properties_generalized: PROPERTIES_GENERALIZED.get(),
        shapes_invalidated: SHAPES_INVALIDATED.get(),
        final_assumptions_invalidated: FINAL_ASSUMPTIONS_INVALIDATED.get(),
    }
}
