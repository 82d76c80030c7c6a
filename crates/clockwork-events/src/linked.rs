//! Linked-list event list with anchor-relative insertion.
//!
//! Notes live in a slab of nodes chained by `prev`/`next` indices, with
//! a `NoteId → slot` map for O(1) lookup. Ordered insertion scans
//! backward from the tail, so notes with equal time and priority keep
//! their insertion order.
//!
//! The randomizing variant instead drops a new note at a uniformly
//! chosen position inside the run of notes sharing its time and
//! priority. Notes placed with [`insert_after`](EventList::insert_after)
//! or [`insert_before`](EventList::insert_before) are *connected* to
//! their predecessor and are never separated from it by a randomized
//! insertion.

use clockwork_core::{EntityId, EventId, KernelError, NoteId, SeededRng, TimeInstant};
use indexmap::IndexMap;

use crate::list::{check_order, EventList, PendingIndex};
use crate::note::EventNote;

const STRATEGY: &str = "linked";

#[derive(Debug)]
struct Node {
    note: EventNote,
    prev: Option<usize>,
    next: Option<usize>,
    /// Chained to `prev`; a randomized insert may not land in between.
    connected: bool,
}

/// Doubly linked event list.
#[derive(Debug, Default)]
pub struct LinkedEventList {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    slots: IndexMap<NoteId, usize>,
    pending: PendingIndex,
    shuffle: Option<SeededRng>,
}

impl LinkedEventList {
    /// An empty list with first-in-first-out tie-breaking.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty list that shuffles concurrent notes using `seed`.
    pub fn randomizing(seed: u64) -> Self {
        Self {
            shuffle: Some(SeededRng::new(seed)),
            ..Self::default()
        }
    }

    /// Restart the shuffle stream. No effect on a non-randomizing list.
    pub fn set_seed(&mut self, seed: u64) {
        if let Some(rng) = self.shuffle.as_mut() {
            rng.reseed(seed);
        }
    }

    /// Notes in list (dispatch) order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Drop every note and every back-reference.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.slots.clear();
        self.pending.clear();
    }

    // ── slab plumbing ───────────────────────────────────────────────

    fn node(&self, slot: usize) -> &Node {
        self.nodes[slot].as_ref().expect("linked slot occupied")
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node {
        self.nodes[slot].as_mut().expect("linked slot occupied")
    }

    fn slot_of(&self, id: NoteId) -> Result<usize, KernelError> {
        self.slots
            .get(&id)
            .copied()
            .ok_or(KernelError::NoteNotFound { note: id })
    }

    /// Store `note` in a free slot and index it. Does not link it.
    fn alloc(&mut self, note: EventNote, connected: bool) -> usize {
        self.pending.attach(&note);
        let id = note.id();
        let node = Node {
            note,
            prev: None,
            next: None,
            connected,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.slots.insert(id, slot);
        slot
    }

    /// Link `slot` right after `prev`, or at the head when `prev` is `None`.
    fn link_after(&mut self, prev: Option<usize>, slot: usize) {
        let next = match prev {
            Some(p) => self.node(p).next,
            None => self.head,
        };
        {
            let n = self.node_mut(slot);
            n.prev = prev;
            n.next = next;
        }
        match prev {
            Some(p) => self.node_mut(p).next = Some(slot),
            None => self.head = Some(slot),
        }
        match next {
            Some(n) => self.node_mut(n).prev = Some(slot),
            None => self.tail = Some(slot),
        }
    }

    /// Unlink and free `slot`, detaching its note everywhere.
    fn unlink(&mut self, slot: usize) -> EventNote {
        let node = self.nodes[slot].take().expect("linked slot occupied");
        match node.prev {
            Some(p) => self.node_mut(p).next = node.next,
            None => self.head = node.next,
        }
        if let Some(n) = node.next {
            let has_prev = node.prev.is_some();
            let next = self.node_mut(n);
            next.prev = node.prev;
            // A chain through the removed note survives only if both links did.
            next.connected = has_prev && node.connected && next.connected;
        } else {
            self.tail = node.prev;
        }
        self.free.push(slot);
        self.slots.swap_remove(&node.note.id());
        self.pending.detach(&node.note);
        node.note
    }

    /// The node after which `note` belongs in natural order, scanning
    /// backward from the tail.
    fn ordered_predecessor(&self, note: &EventNote) -> Option<usize> {
        let mut cursor = self.tail;
        while let Some(c) = cursor {
            let other = &self.node(c).note;
            let later = other.time() > note.time()
                || (other.time() == note.time() && other.priority() < note.priority());
            if !later {
                break;
            }
            cursor = self.node(c).prev;
        }
        cursor
    }

    /// Pick a random predecessor inside the run of notes concurrent with
    /// `note` that ends at `last`.
    fn shuffled_predecessor(&mut self, note: &EventNote, last: usize) -> Option<usize> {
        let mut run = Vec::new();
        let mut cursor = Some(last);
        while let Some(c) = cursor {
            if !self.node(c).note.concurrent_with(note) {
                break;
            }
            run.push(c);
            cursor = self.node(c).prev;
        }
        run.reverse();

        let k = match self.shuffle.as_mut() {
            Some(rng) => rng.index_inclusive(run.len()),
            None => run.len(),
        };
        let mut before = if k < run.len() {
            Some(run[k])
        } else {
            self.node(last).next
        };
        while let Some(b) = before {
            if !self.node(b).connected {
                break;
            }
            before = self.node(b).next;
        }
        match before {
            Some(b) => self.node(b).prev,
            None => self.tail,
        }
    }
}

impl EventList for LinkedEventList {
    fn strategy_name(&self) -> &'static str {
        STRATEGY
    }

    fn insert(&mut self, note: EventNote, now: TimeInstant) -> Result<(), KernelError> {
        check_order(&note, now)?;
        let mut prev = self.ordered_predecessor(&note);
        if self.shuffle.is_some() {
            if let Some(p) = prev {
                if self.node(p).note.concurrent_with(&note) {
                    prev = self.shuffled_predecessor(&note, p);
                }
            }
        }
        let slot = self.alloc(note, false);
        self.link_after(prev, slot);
        Ok(())
    }

    fn first_note(&mut self) -> Option<&EventNote> {
        self.head.map(|h| &self.node(h).note)
    }

    fn remove_first(&mut self) -> Option<EventNote> {
        let head = self.head?;
        Some(self.unlink(head))
    }

    fn remove(&mut self, id: NoteId) -> Option<EventNote> {
        let slot = self.slots.get(&id).copied()?;
        Some(self.unlink(slot))
    }

    fn get(&self, id: NoteId) -> Option<&EventNote> {
        self.slots.get(&id).map(|&s| &self.node(s).note)
    }

    fn contains(&self, id: NoteId) -> bool {
        self.slots.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn is_randomizing_concurrent_events(&self) -> bool {
        self.shuffle.is_some()
    }

    fn insert_before(&mut self, anchor: NoteId, mut note: EventNote) -> Result<(), KernelError> {
        let at = self.slot_of(anchor)?;
        let (time, priority, prev, anchor_connected) = {
            let a = self.node(at);
            (a.note.time(), a.note.priority(), a.prev, a.connected)
        };
        note.retime(time, priority);
        // The new note inherits the anchor's chain to its predecessor.
        let slot = self.alloc(note, anchor_connected);
        self.link_after(prev, slot);
        self.node_mut(at).connected = true;
        Ok(())
    }

    fn insert_after(&mut self, anchor: NoteId, mut note: EventNote) -> Result<(), KernelError> {
        let at = self.slot_of(anchor)?;
        let (time, priority) = {
            let a = &self.node(at).note;
            (a.time(), a.priority())
        };
        note.retime(time, priority);
        let slot = self.alloc(note, true);
        self.link_after(Some(at), slot);
        Ok(())
    }

    fn insert_as_first(&mut self, mut note: EventNote, now: TimeInstant) -> Result<(), KernelError> {
        let mut priority = note.priority();
        if let Some(h) = self.head {
            let head = &self.node(h).note;
            if head.time() == now {
                priority = priority.max(head.priority());
            }
        }
        note.retime(now, priority);
        let slot = self.alloc(note, false);
        self.link_after(None, slot);
        Ok(())
    }

    fn next_note(&self, id: NoteId) -> Result<Option<&EventNote>, KernelError> {
        let slot = self.slot_of(id)?;
        Ok(self.node(slot).next.map(|n| &self.node(n).note))
    }

    fn prev_note(&self, id: NoteId) -> Result<Option<&EventNote>, KernelError> {
        let slot = self.slot_of(id)?;
        Ok(self.node(slot).prev.map(|p| &self.node(p).note))
    }

    fn last_note(&self) -> Result<Option<&EventNote>, KernelError> {
        Ok(self.tail.map(|t| &self.node(t).note))
    }

    fn pending_for_entity(&self, entity: EntityId) -> Vec<NoteId> {
        self.pending.for_entity(entity)
    }

    fn pending_for_event(&self, event: EventId) -> Vec<NoteId> {
        self.pending.for_event(event)
    }
}

/// Iterator over a [`LinkedEventList`] in dispatch order.
pub struct Iter<'a> {
    list: &'a LinkedEventList,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a EventNote;

    fn next(&mut self) -> Option<&'a EventNote> {
        let slot = self.cursor?;
        let node = self.list.node(slot);
        self.cursor = node.next;
        Some(&node.note)
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

    fn proc_note(id: u64, time: i64, pid: u64) -> EventNote {
        EventNote::new(NoteId(id), at(time), Schedulable::Process(ProcessId(pid)))
    }

    fn ids(list: &LinkedEventList) -> Vec<u64> {
        list.iter().map(|n| n.id().0).collect()
    }

    #[test]
    fn orders_by_time_then_priority_then_fifo() {
        let mut l = LinkedEventList::new();
        l.insert(proc_note(0, 5, 1), at(0)).unwrap();
        l.insert(proc_note(1, 3, 2), at(0)).unwrap();
        l.insert(proc_note(2, 3, 3), at(0)).unwrap();
        l.insert(proc_note(3, 3, 4).with_priority(9), at(0)).unwrap();
        assert_eq!(ids(&l), vec![3, 1, 2, 0]);
        assert_eq!(l.remove_first().map(|n| n.id()), Some(NoteId(3)));
        assert_eq!(l.len(), 3);
    }

    #[test]
    fn refuses_notes_in_the_past() {
        let mut l = LinkedEventList::new();
        let err = l.insert(proc_note(0, 4, 1), at(5)).unwrap_err();
        assert!(matches!(err, KernelError::SchedulingOrder { .. }));
        assert!(l.is_empty());
        assert!(l.pending_for_entity(EntityId(1)).is_empty());
    }

    #[test]
    fn insert_after_retimes_and_chains() {
        let mut l = LinkedEventList::new();
        l.insert(proc_note(0, 10, 1).with_priority(2), at(0)).unwrap();
        l.insert(proc_note(1, 20, 2), at(0)).unwrap();
        l.insert_after(NoteId(0), proc_note(2, 99, 3)).unwrap();
        assert_eq!(ids(&l), vec![0, 2, 1]);
        let n = l.get(NoteId(2)).unwrap();
        assert_eq!(n.time(), at(10));
        assert_eq!(n.priority(), 2);
    }

    #[test]
    fn insert_before_places_ahead_of_anchor() {
        let mut l = LinkedEventList::new();
        l.insert(proc_note(0, 10, 1), at(0)).unwrap();
        l.insert(proc_note(1, 20, 2), at(0)).unwrap();
        l.insert_before(NoteId(1), proc_note(2, 0, 3)).unwrap();
        assert_eq!(ids(&l), vec![0, 2, 1]);
        assert_eq!(l.get(NoteId(2)).unwrap().time(), at(20));
    }

    #[test]
    fn insert_as_first_retimes_to_now() {
        let mut l = LinkedEventList::new();
        l.insert(proc_note(0, 7, 1), at(7)).unwrap();
        l.insert_as_first(proc_note(1, 50, 2), at(7)).unwrap();
        assert_eq!(ids(&l), vec![1, 0]);
        assert_eq!(l.first_note().unwrap().time(), at(7));
    }

    #[test]
    fn unknown_anchor_is_not_found() {
        let mut l = LinkedEventList::new();
        let err = l.insert_after(NoteId(42), proc_note(0, 1, 1)).unwrap_err();
        assert_eq!(err, KernelError::NoteNotFound { note: NoteId(42) });
        assert!(l.is_empty());
        assert!(l.next_note(NoteId(42)).is_err());
    }

    #[test]
    fn traversal_follows_list_order() {
        let mut l = LinkedEventList::new();
        for (id, t) in [(0, 1), (1, 2), (2, 3)] {
            l.insert(proc_note(id, t, id + 1), at(0)).unwrap();
        }
        assert_eq!(l.next_note(NoteId(0)).unwrap().map(|n| n.id()), Some(NoteId(1)));
        assert_eq!(l.prev_note(NoteId(0)).unwrap().map(|n| n.id()), None);
        assert_eq!(l.prev_note(NoteId(2)).unwrap().map(|n| n.id()), Some(NoteId(1)));
        assert_eq!(l.last_note().unwrap().map(|n| n.id()), Some(NoteId(2)));
    }

    #[test]
    fn cancellation_detaches_everywhere() {
        let mut l = LinkedEventList::new();
        l.insert(proc_note(0, 1, 5), at(0)).unwrap();
        l.insert(proc_note(1, 2, 5), at(0)).unwrap();
        assert_eq!(l.pending_for_entity(EntityId(5)), vec![NoteId(0), NoteId(1)]);
        let removed = l.remove(NoteId(0)).unwrap();
        assert_eq!(removed.id(), NoteId(0));
        assert!(!l.contains(NoteId(0)));
        assert_eq!(l.pending_for_entity(EntityId(5)), vec![NoteId(1)]);
        assert!(l.remove(NoteId(0)).is_none());
    }

    #[test]
    fn slots_are_reused() {
        let mut l = LinkedEventList::new();
        l.insert(proc_note(0, 1, 1), at(0)).unwrap();
        l.remove_first();
        l.insert(proc_note(1, 2, 1), at(0)).unwrap();
        assert_eq!(l.nodes.len(), 1);
        assert_eq!(ids(&l), vec![1]);
    }

    #[test]
    fn plain_list_does_not_randomize() {
        assert!(!LinkedEventList::new().is_randomizing_concurrent_events());
        assert!(LinkedEventList::randomizing(1).is_randomizing_concurrent_events());
    }

    #[test]
    fn randomizing_keeps_connected_notes_adjacent() {
        let mut l = LinkedEventList::randomizing(17);
        l.insert(proc_note(0, 5, 1), at(0)).unwrap();
        l.insert_after(NoteId(0), proc_note(1, 5, 2)).unwrap();
        l.insert_after(NoteId(1), proc_note(2, 5, 3)).unwrap();
        for id in 3..60 {
            l.insert(proc_note(id, 5, id + 1), at(0)).unwrap();
        }
        let order = ids(&l);
        let pos = order.iter().position(|&id| id == 0).unwrap();
        assert_eq!(&order[pos..pos + 3], &[0, 1, 2]);
    }

    #[test]
    fn randomizing_only_shuffles_within_time_and_priority() {
        let mut l = LinkedEventList::randomizing(99);
        for id in 0..40u64 {
            let t = (id % 4) as i64;
            l.insert(proc_note(id, t, id + 1), at(0)).unwrap();
        }
        let times: Vec<i64> = l.iter().map(|n| n.time().epsilons()).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[test]
    fn randomizing_actually_shuffles() {
        let mut shuffled = false;
        for seed in 0..10 {
            let mut l = LinkedEventList::randomizing(seed);
            for id in 0..8 {
                l.insert(proc_note(id, 1, id + 1), at(0)).unwrap();
            }
            if ids(&l) != (0..8).collect::<Vec<_>>() {
                shuffled = true;
            }
        }
        assert!(shuffled);
    }

    #[test]
    fn same_seed_same_order() {
        let build = || {
            let mut l = LinkedEventList::randomizing(5);
            for id in 0..20 {
                l.insert(proc_note(id, 1, id + 1), at(0)).unwrap();
            }
            ids(&l)
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn removing_head_clears_connection() {
        let mut l = LinkedEventList::randomizing(3);
        l.insert(proc_note(0, 1, 1), at(0)).unwrap();
        l.insert_after(NoteId(0), proc_note(1, 1, 2)).unwrap();
        l.remove_first();
        let head = l.head.unwrap();
        assert!(!l.node(head).connected);
    }
}
