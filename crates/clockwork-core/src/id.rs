//! Strongly-typed identifiers and the run-scoped [`RunCounters`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies an entity taking part in a run.
///
/// Every process is an entity; passive entities (customers waiting in a
/// queue, for instance) have an `EntityId` without a process behind it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies a simulated process.
///
/// Process ids are drawn from the entity sequence, so a process and the
/// entity it embodies share the same number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u64);

impl ProcessId {
    /// The entity this process embodies.
    #[inline]
    pub fn entity(self) -> EntityId {
        EntityId(self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl From<u64> for ProcessId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies a registered event routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Insertion sequence number of an event note.
///
/// Strictly increasing within a run; breaks ties between notes that
/// share time and priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(pub u64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

impl From<u64> for NoteId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies a wait list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueId(pub u32);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

impl From<u32> for QueueId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

// ── RunCounters ─────────────────────────────────────────────────────

/// Monotonic counters owned by one simulation run.
///
/// Everything that needs a fresh number (entity ids, event ids, note
/// sequence numbers, queue ids, interrupt-code serials) draws it from
/// the run's `RunCounters`, so two runs in one process never share a
/// sequence. Shared between strands via `Arc`; the counters are atomic
/// because thread-backed strands draw from them on worker threads.
#[derive(Debug)]
pub struct RunCounters {
    entity: AtomicU64,
    event: AtomicU64,
    note: AtomicU64,
    queue: AtomicU64,
    interrupt: AtomicU64,
}

// Compile-time assertion: RunCounters must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<RunCounters>();
};

impl Default for RunCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl RunCounters {
    /// Fresh counters. Entity, event and queue ids start at 1; note
    /// sequence numbers and interrupt serials start at 0.
    pub fn new() -> Self {
        Self {
            entity: AtomicU64::new(1),
            event: AtomicU64::new(1),
            note: AtomicU64::new(0),
            queue: AtomicU64::new(1),
            interrupt: AtomicU64::new(0),
        }
    }

    /// Allocate an entity id.
    pub fn next_entity(&self) -> EntityId {
        EntityId(self.entity.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate a process id (from the entity sequence).
    pub fn next_process(&self) -> ProcessId {
        ProcessId(self.entity.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate an event routine id.
    pub fn next_event(&self) -> EventId {
        EventId(self.event.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate the next note sequence number.
    pub fn next_note(&self) -> NoteId {
        NoteId(self.note.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate a queue id.
    ///
    /// Saturates at `u32::MAX`; a run creating four billion queues has
    /// bigger problems than id reuse.
    pub fn next_queue(&self) -> QueueId {
        let raw = self.queue.fetch_add(1, Ordering::Relaxed);
        QueueId(u32::try_from(raw).unwrap_or(u32::MAX))
    }

    /// Allocate an interrupt-code serial number.
    pub fn next_interrupt_serial(&self) -> u64 {
        self.interrupt.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of note sequence numbers issued so far.
    pub fn notes_issued(&self) -> u64 {
        self.note.load(Ordering::Relaxed)
    }
}
