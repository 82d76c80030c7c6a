//! Test utilities and mock types for Clockwork development.
//!
//! Provides a shared [`Journal`] for recording what simulated processes
//! did, a [`MockEntity`] for queue tests, configuration helpers that
//! cover both strand backends, and reusable process bodies in
//! [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Arc, Mutex, PoisonError};

use clockwork_core::{EntityId, Identified, Prioritized, TimeInstant, TimeSpan};
use clockwork_engine::{EventListKind, SimulationConfig, StrandBackend};

/// Both strand backends, threads first.
pub const BACKENDS: [StrandBackend; 2] = [StrandBackend::Threads, StrandBackend::Continuations];

/// Default configuration named `name` on `backend`.
pub fn config(name: &str, backend: StrandBackend) -> SimulationConfig {
    SimulationConfig::named(name, backend)
}

/// Configuration on `backend` using the bucketed event list.
pub fn bucketed_config(name: &str, backend: StrandBackend, width: i64) -> SimulationConfig {
    SimulationConfig {
        event_list: EventListKind::Bucketed {
            bucket_width: span(width),
        },
        ..config(name, backend)
    }
}

/// Shorthand for an instant `t` epsilons after zero.
pub fn at(t: i64) -> TimeInstant {
    TimeInstant::from_epsilons(t)
}

/// Shorthand for a span of `n` epsilons. Panics on negative `n`.
pub fn span(n: i64) -> TimeSpan {
    TimeSpan::new(n).expect("test spans are non-negative")
}

/// Shared, ordered log of what happened during a run.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Append `"label@t"` for the given time.
    pub fn stamp(&self, label: &str, now: TimeInstant) {
        self.record(format!("{label}@{}", now.epsilons()));
    }

    /// Snapshot of all entries so far.
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Minimal queueable entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockEntity {
    pub id: EntityId,
    pub priority: i32,
}

impl MockEntity {
    pub fn new(id: u64, priority: i32) -> Self {
        Self {
            id: EntityId(id),
            priority,
        }
    }
}

impl Identified for MockEntity {
    fn entity_id(&self) -> EntityId {
        self.id
    }
}

impl Prioritized for MockEntity {
    fn priority(&self) -> i32 {
        self.priority
    }
}
