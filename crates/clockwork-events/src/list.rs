//! The event-list contract and the pending-note index every strategy
//! shares.

use clockwork_core::{EntityId, EventId, KernelError, NoteId, TimeInstant};
use indexmap::{IndexMap, IndexSet};

use crate::note::EventNote;

// ── EventList ───────────────────────────────────────────────────────

/// Ordered store of event notes.
///
/// Implementations must yield notes in non-decreasing time order and
/// must refuse any note due before the current clock value. Every
/// insert attaches the note to the pending sets of the entities and
/// event it references; every removal detaches it from all of them.
///
/// Anchor-relative insertion and traversal are optional: a strategy
/// that cannot provide them returns
/// [`KernelError::UnsupportedOperation`] and never approximates.
pub trait EventList: Send {
    /// Name of the strategy, for diagnostics.
    fn strategy_name(&self) -> &'static str;

    /// Insert `note` in order.
    ///
    /// Fails with [`KernelError::SchedulingOrder`] if `note` is due
    /// before `now`; the list is unchanged in that case.
    fn insert(&mut self, note: EventNote, now: TimeInstant) -> Result<(), KernelError>;

    /// The globally earliest note, without removing it.
    ///
    /// Takes `&mut self` because a strategy may reorganize lazily.
    fn first_note(&mut self) -> Option<&EventNote>;

    /// Remove and return the globally earliest note.
    fn remove_first(&mut self) -> Option<EventNote>;

    /// Remove a specific note (cancellation).
    fn remove(&mut self, id: NoteId) -> Option<EventNote>;

    /// Look up a scheduled note.
    fn get(&self, id: NoteId) -> Option<&EventNote>;

    /// Whether the note is currently scheduled.
    fn contains(&self, id: NoteId) -> bool;

    /// Number of scheduled notes.
    fn len(&self) -> usize;

    /// Returns `true` if no notes are scheduled.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether notes with identical time and priority are deliberately
    /// shuffled.
    fn is_randomizing_concurrent_events(&self) -> bool;

    /// Insert `note` immediately before `anchor`, retiming it to the
    /// anchor's time and priority.
    fn insert_before(&mut self, anchor: NoteId, note: EventNote) -> Result<(), KernelError>;

    /// Insert `note` immediately after `anchor`, retiming it to the
    /// anchor's time and priority.
    fn insert_after(&mut self, anchor: NoteId, note: EventNote) -> Result<(), KernelError>;

    /// Insert `note` at the head of the list, retiming it to `now`.
    fn insert_as_first(&mut self, note: EventNote, now: TimeInstant) -> Result<(), KernelError>;

    /// The note following `id` in list order.
    fn next_note(&self, id: NoteId) -> Result<Option<&EventNote>, KernelError>;

    /// The note preceding `id` in list order.
    fn prev_note(&self, id: NoteId) -> Result<Option<&EventNote>, KernelError>;

    /// The latest scheduled note.
    fn last_note(&self) -> Result<Option<&EventNote>, KernelError>;

    /// Notes still pending for `entity`, in insertion order.
    fn pending_for_entity(&self, entity: EntityId) -> Vec<NoteId>;

    /// Notes still pending for the event routine `event`.
    fn pending_for_event(&self, event: EventId) -> Vec<NoteId>;
}

/// Refuse notes due before `now`.
pub(crate) fn check_order(note: &EventNote, now: TimeInstant) -> Result<(), KernelError> {
    if note.time() < now {
        return Err(KernelError::SchedulingOrder {
            requested: note.time(),
            now,
        });
    }
    Ok(())
}

// ── PendingIndex ────────────────────────────────────────────────────

/// Back-references from entities and event routines to their pending
/// notes.
///
/// Owned by the event list so that attach and detach happen in the same
/// call as the list mutation; there is no window in which a note is in
/// the list but missing from an entity's set, or the reverse.
#[derive(Debug, Default)]
pub struct PendingIndex {
    by_entity: IndexMap<EntityId, IndexSet<NoteId>>,
    by_event: IndexMap<EventId, IndexSet<NoteId>>,
}

impl PendingIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `note` as pending for everything it references.
    pub fn attach(&mut self, note: &EventNote) {
        for &entity in note.entities() {
            self.by_entity.entry(entity).or_default().insert(note.id());
        }
        if let Some(event) = note.event() {
            self.by_event.entry(event).or_default().insert(note.id());
        }
    }

    /// Forget `note` everywhere it was recorded.
    pub fn detach(&mut self, note: &EventNote) {
        for entity in note.entities() {
            if let Some(set) = self.by_entity.get_mut(entity) {
                set.shift_remove(&note.id());
                if set.is_empty() {
                    self.by_entity.swap_remove(entity);
                }
            }
        }
        if let Some(event) = note.event() {
            if let Some(set) = self.by_event.get_mut(&event) {
                set.shift_remove(&note.id());
                if set.is_empty() {
                    self.by_event.swap_remove(&event);
                }
            }
        }
    }

    /// Notes pending for `entity`.
    pub fn for_entity(&self, entity: EntityId) -> Vec<NoteId> {
        self.by_entity
            .get(&entity)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Notes pending for `event`.
    pub fn for_event(&self, event: EventId) -> Vec<NoteId> {
        self.by_event
            .get(&event)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether anything is pending for `entity`.
    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.by_entity.contains_key(&entity)
    }

    /// Drop all back-references.
    pub fn clear(&mut self) {
        self.by_entity.clear();
        self.by_event.clear();
    }
}
