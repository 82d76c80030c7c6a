//! Time-bucketed event list.
//!
//! Notes are grouped by `floor(time / bucket_width)`. Only the earliest
//! bucket is materialized, as a binary heap ordered by the notes'
//! natural order; later buckets wait in a [`BTreeMap`] of unsorted
//! vectors and are promoted lazily when the heap drains.
//!
//! The strategy has no linked order to anchor against, so anchor
//! insertion and traversal fail with
//! [`KernelError::UnsupportedOperation`].

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use clockwork_core::{EntityId, EventId, KernelError, NoteId, TimeInstant, TimeSpan};
use indexmap::IndexMap;

use crate::list::{check_order, EventList, PendingIndex};
use crate::note::EventNote;

const STRATEGY: &str = "bucketed";

/// Event list keeping only its earliest time bucket sorted.
#[derive(Debug)]
pub struct BucketedEventList {
    width: TimeSpan,
    current_key: Option<i64>,
    current: BinaryHeap<Reverse<EventNote>>,
    later: BTreeMap<i64, Vec<EventNote>>,
    /// Bucket key of every scheduled note.
    location: IndexMap<NoteId, i64>,
    pending: PendingIndex,
}

impl BucketedEventList {
    /// An empty list with buckets `bucket_width` epsilons wide.
    ///
    /// A zero width is treated as one epsilon.
    pub fn new(bucket_width: TimeSpan) -> Self {
        let width = if bucket_width.is_zero() {
            TimeSpan::new(1).unwrap_or(bucket_width)
        } else {
            bucket_width
        };
        Self {
            width,
            current_key: None,
            current: BinaryHeap::new(),
            later: BTreeMap::new(),
            location: IndexMap::new(),
            pending: PendingIndex::new(),
        }
    }

    /// Width of one bucket.
    pub fn bucket_width(&self) -> TimeSpan {
        self.width
    }

    /// Number of buckets holding notes, including the materialized one.
    pub fn bucket_count(&self) -> usize {
        self.later.len() + usize::from(!self.current.is_empty())
    }

    /// Materialize the next bucket if the current one has drained.
    fn promote(&mut self) {
        if !self.current.is_empty() {
            return;
        }
        match self.later.pop_first() {
            Some((key, notes)) => {
                self.current_key = Some(key);
                self.current.extend(notes.into_iter().map(Reverse));
            }
            None => self.current_key = None,
        }
    }

    /// Move the materialized bucket back into the map.
    fn demote(&mut self) {
        if let Some(key) = self.current_key.take() {
            let notes: Vec<EventNote> = std::mem::take(&mut self.current)
                .into_vec()
                .into_iter()
                .map(|Reverse(n)| n)
                .collect();
            if !notes.is_empty() {
                self.later.entry(key).or_default().extend(notes);
            }
        }
    }

    fn forget(&mut self, note: &EventNote) {
        self.location.swap_remove(&note.id());
        self.pending.detach(note);
    }

    fn unsupported(operation: &'static str) -> KernelError {
        KernelError::UnsupportedOperation {
            strategy: STRATEGY,
            operation,
        }
    }
}

impl EventList for BucketedEventList {
    fn strategy_name(&self) -> &'static str {
        STRATEGY
    }

    fn insert(&mut self, note: EventNote, now: TimeInstant) -> Result<(), KernelError> {
        check_order(&note, now)?;
        let key = note.time().bucket(self.width);
        self.pending.attach(&note);
        self.location.insert(note.id(), key);
        match self.current_key {
            Some(current) if key == current => self.current.push(Reverse(note)),
            Some(current) if key < current => {
                self.demote();
                self.later.entry(key).or_default().push(note);
            }
            _ => self.later.entry(key).or_default().push(note),
        }
        Ok(())
    }

    fn first_note(&mut self) -> Option<&EventNote> {
        self.promote();
        self.current.peek().map(|Reverse(n)| n)
    }

    fn remove_first(&mut self) -> Option<EventNote> {
        self.promote();
        let Reverse(note) = self.current.pop()?;
        self.forget(&note);
        Some(note)
    }

    fn remove(&mut self, id: NoteId) -> Option<EventNote> {
        let key = *self.location.get(&id)?;
        let note = if self.current_key == Some(key) {
            let mut notes = std::mem::take(&mut self.current).into_vec();
            let found = notes
                .iter()
                .position(|Reverse(n)| n.id() == id)
                .map(|pos| notes.swap_remove(pos).0);
            self.current = BinaryHeap::from(notes);
            found
        } else {
            let bucket = self.later.get_mut(&key)?;
            let found = bucket
                .iter()
                .position(|n| n.id() == id)
                .map(|pos| bucket.swap_remove(pos));
            if bucket.is_empty() {
                self.later.remove(&key);
            }
            found
        }?;
        self.forget(&note);
        Some(note)
    }

    fn get(&self, id: NoteId) -> Option<&EventNote> {
        let key = *self.location.get(&id)?;
        if self.current_key == Some(key) {
            self.current
                .iter()
                .map(|Reverse(n)| n)
                .find(|n| n.id() == id)
        } else {
            self.later.get(&key)?.iter().find(|n| n.id() == id)
        }
    }

    fn contains(&self, id: NoteId) -> bool {
        self.location.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.location.len()
    }

    fn is_randomizing_concurrent_events(&self) -> bool {
        false
    }

    fn insert_before(&mut self, _anchor: NoteId, _note: EventNote) -> Result<(), KernelError> {
        Err(Self::unsupported("insert_before"))
    }

    fn insert_after(&mut self, _anchor: NoteId, _note: EventNote) -> Result<(), KernelError> {
        Err(Self::unsupported("insert_after"))
    }

    fn insert_as_first(&mut self, _note: EventNote, _now: TimeInstant) -> Result<(), KernelError> {
        Err(Self::unsupported("insert_as_first"))
    }

    fn next_note(&self, _id: NoteId) -> Result<Option<&EventNote>, KernelError> {
        Err(Self::unsupported("next_note"))
    }

    fn prev_note(&self, _id: NoteId) -> Result<Option<&EventNote>, KernelError> {
        Err(Self::unsupported("prev_note"))
    }

    fn last_note(&self) -> Result<Option<&EventNote>, KernelError> {
        Err(Self::unsupported("last_note"))
    }

    fn pending_for_entity(&self, entity: EntityId) -> Vec<NoteId> {
        self.pending.for_entity(entity)
    }

    fn pending_for_event(&self, event: EventId) -> Vec<NoteId> {
        self.pending.for_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::Schedulable;
    use clockwork_core::ProcessId;

    fn at(t: i64) -> TimeInstant {
        TimeInstant::from_epsilons(t)
    }

    fn list(width: i64) -> BucketedEventList {
        BucketedEventList::new(TimeSpan::new(width).unwrap())
    }

    fn note(id: u64, time: i64) -> EventNote {
        EventNote::new(NoteId(id), at(time), Schedulable::Process(ProcessId(id + 1)))
    }

    fn drain(l: &mut BucketedEventList) -> Vec<u64> {
        std::iter::from_fn(|| l.remove_first().map(|n| n.id().0)).collect()
    }

    #[test]
    fn yields_in_natural_order_across_buckets() {
        let mut l = list(10);
        for (id, t) in [(0, 35), (1, 4), (2, 12), (3, 4), (4, 9)] {
            l.insert(note(id, t), at(0)).unwrap();
        }
        l.insert(note(5, 12).with_priority(3), at(0)).unwrap();
        assert_eq!(drain(&mut l), vec![1, 3, 4, 5, 2, 0]);
        assert!(l.is_empty());
    }

    #[test]
    fn first_note_promotes_lazily() {
        let mut l = list(10);
        l.insert(note(0, 25), at(0)).unwrap();
        assert_eq!(l.current.len(), 0);
        assert_eq!(l.first_note().map(|n| n.id()), Some(NoteId(0)));
        assert_eq!(l.current_key, Some(2));
    }

    #[test]
    fn earlier_bucket_demotes_current() {
        let mut l = list(10);
        l.insert(note(0, 25), at(0)).unwrap();
        l.first_note();
        l.insert(note(1, 3), at(0)).unwrap();
        assert_eq!(l.current_key, None);
        assert_eq!(l.bucket_count(), 2);
        assert_eq!(drain(&mut l), vec![1, 0]);
    }

    #[test]
    fn refuses_notes_in_the_past() {
        let mut l = list(10);
        let err = l.insert(note(0, 1), at(2)).unwrap_err();
        assert!(matches!(err, KernelError::SchedulingOrder { .. }));
        assert!(l.is_empty());
    }

    #[test]
    fn anchor_operations_are_unsupported() {
        let mut l = list(10);
        l.insert(note(0, 1), at(0)).unwrap();
        let expect_unsupported = |r: Result<(), KernelError>| {
            assert!(matches!(
                r,
                Err(KernelError::UnsupportedOperation {
                    strategy: "bucketed",
                    ..
                })
            ));
        };
        expect_unsupported(l.insert_before(NoteId(0), note(1, 1)));
        expect_unsupported(l.insert_after(NoteId(0), note(2, 1)));
        expect_unsupported(l.insert_as_first(note(3, 1), at(0)));
        assert!(l.next_note(NoteId(0)).is_err());
        assert!(l.prev_note(NoteId(0)).is_err());
        assert!(l.last_note().is_err());
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn cancellation_from_either_tier() {
        let mut l = list(10);
        l.insert(note(0, 1), at(0)).unwrap();
        l.insert(note(1, 2), at(0)).unwrap();
        l.insert(note(2, 50), at(0)).unwrap();
        l.first_note();

        assert_eq!(l.remove(NoteId(1)).map(|n| n.id()), Some(NoteId(1)));
        assert_eq!(l.remove(NoteId(2)).map(|n| n.id()), Some(NoteId(2)));
        assert!(l.remove(NoteId(2)).is_none());
        assert!(l.pending_for_entity(EntityId(3)).is_empty());
        assert_eq!(l.bucket_count(), 1);
        assert_eq!(drain(&mut l), vec![0]);
    }

    #[test]
    fn get_finds_notes_in_either_tier() {
        let mut l = list(5);
        l.insert(note(0, 1), at(0)).unwrap();
        l.insert(note(1, 40), at(0)).unwrap();
        l.first_note();
        assert_eq!(l.get(NoteId(0)).map(|n| n.time()), Some(at(1)));
        assert_eq!(l.get(NoteId(1)).map(|n| n.time()), Some(at(40)));
        assert!(l.get(NoteId(9)).is_none());
    }

    #[test]
    fn never_randomizes() {
        assert!(!list(1).is_randomizing_concurrent_events());
    }

    #[test]
    fn zero_width_is_one_epsilon() {
        let l = BucketedEventList::new(TimeSpan::ZERO);
        assert_eq!(l.bucket_width().epsilons(), 1);
    }
}
