//! The event note: one scheduled occurrence.

use std::cmp::{Ordering, Reverse};
use std::fmt;

use clockwork_core::{EntityId, EventId, KernelError, NoteId, ProcessId, TimeInstant};
use smallvec::SmallVec;

/// Maximum number of entities one note can reference.
pub const MAX_ENTITIES: usize = 3;

/// What runs when a note is dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Schedulable {
    /// Resume (or first start) a process.
    Process(ProcessId),
    /// Invoke a registered event routine.
    Event(EventId),
    /// Interrupt a process that armed a delayed interrupt.
    DelayedInterrupt(ProcessId),
    /// Stop the run.
    Stop,
}

impl fmt::Display for Schedulable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process(p) => write!(f, "process {p}"),
            Self::Event(e) => write!(f, "event {e}"),
            Self::DelayedInterrupt(p) => write!(f, "delayed interrupt of process {p}"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// A scheduled occurrence.
///
/// Notes compare by their natural order: time ascending, then priority
/// descending (higher priority first), then insertion sequence
/// ascending. The sequence number is unique within a run, so the order
/// is total and equality means identity.
#[derive(Clone, Debug)]
pub struct EventNote {
    id: NoteId,
    time: TimeInstant,
    priority: i32,
    entities: SmallVec<[EntityId; MAX_ENTITIES]>,
    event: Option<EventId>,
    target: Schedulable,
}

impl EventNote {
    /// A note that runs `target` at `time` with priority 0.
    ///
    /// A process or delayed-interrupt target references the process's
    /// entity; an event target references the event routine.
    pub fn new(id: NoteId, time: TimeInstant, target: Schedulable) -> Self {
        let mut entities = SmallVec::new();
        let mut event = None;
        match target {
            Schedulable::Process(p) | Schedulable::DelayedInterrupt(p) => {
                entities.push(p.entity())
            }
            Schedulable::Event(e) => event = Some(e),
            Schedulable::Stop => {}
        }
        Self {
            id,
            time,
            priority: 0,
            entities,
            event,
            target,
        }
    }

    /// Set the scheduling priority. Higher is more urgent.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Associate additional entities, up to [`MAX_ENTITIES`] in total.
    pub fn with_entities(mut self, entities: &[EntityId]) -> Result<Self, KernelError> {
        let given = self.entities.len() + entities.len();
        if given > MAX_ENTITIES {
            return Err(KernelError::TooManyEntities { given });
        }
        self.entities.extend_from_slice(entities);
        Ok(self)
    }

    /// Insertion sequence number; also the note's identity.
    #[inline]
    pub fn id(&self) -> NoteId {
        self.id
    }

    /// Due time.
    #[inline]
    pub fn time(&self) -> TimeInstant {
        self.time
    }

    /// Scheduling priority.
    #[inline]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Entities this note is pending for.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// The event routine this note is pending for, if any.
    pub fn event(&self) -> Option<EventId> {
        self.event
    }

    /// What runs when the note is dispatched.
    pub fn target(&self) -> Schedulable {
        self.target
    }

    /// Whether the note references `entity`.
    pub fn references(&self, entity: EntityId) -> bool {
        self.entities.contains(&entity)
    }

    /// Sort key of the natural order.
    #[inline]
    pub fn key(&self) -> (TimeInstant, Reverse<i32>, NoteId) {
        (self.time, Reverse(self.priority), self.id)
    }

    /// Whether `self` and `other` are concurrent: same time and priority.
    #[inline]
    pub fn concurrent_with(&self, other: &EventNote) -> bool {
        self.time == other.time && self.priority == other.priority
    }

    pub(crate) fn retime(&mut self, time: TimeInstant, priority: i32) {
        self.time = time;
        self.priority = priority;
    }
}

impl PartialEq for EventNote {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for EventNote {}

impl PartialOrd for EventNote {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventNote {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for EventNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} at {} prio {}",
            self.id, self.target, self.time, self.priority
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: u64, time: i64, priority: i32) -> EventNote {
        EventNote::new(NoteId(id), TimeInstant::from_epsilons(time), Schedulable::Stop)
            .with_priority(priority)
    }

    #[test]
    fn earlier_time_sorts_first() {
        assert!(note(5, 1, 0) < note(1, 2, 0));
    }

    #[test]
    fn higher_priority_sorts_first_at_equal_time() {
        assert!(note(5, 3, 10) < note(1, 3, 0));
    }

    #[test]
    fn sequence_breaks_remaining_ties() {
        assert!(note(1, 3, 0) < note(2, 3, 0));
        assert!(note(1, 3, 0).concurrent_with(&note(2, 3, 0)));
    }

    #[test]
    fn process_target_references_its_entity() {
        let n = EventNote::new(
            NoteId(0),
            TimeInstant::ZERO,
            Schedulable::Process(ProcessId(9)),
        );
        assert_eq!(n.entities(), &[EntityId(9)]);
        assert!(n.references(EntityId(9)));
        assert_eq!(n.event(), None);
    }

    #[test]
    fn delayed_interrupt_references_its_victim() {
        let n = EventNote::new(
            NoteId(0),
            TimeInstant::ZERO,
            Schedulable::DelayedInterrupt(ProcessId(4)),
        );
        assert_eq!(n.entities(), &[EntityId(4)]);
        assert_eq!(n.event(), None);
        assert_eq!(n.target().to_string(), "delayed interrupt of process P4");
    }

    #[test]
    fn event_target_holds_at_most_three_entities() {
        let n = EventNote::new(NoteId(0), TimeInstant::ZERO, Schedulable::Event(EventId(1)));
        assert_eq!(n.event(), Some(EventId(1)));
        let ok = n
            .clone()
            .with_entities(&[EntityId(1), EntityId(2), EntityId(3)])
            .unwrap();
        assert_eq!(ok.entities().len(), 3);
        let err = n
            .with_entities(&[EntityId(1), EntityId(2), EntityId(3), EntityId(4)])
            .unwrap_err();
        assert_eq!(err, KernelError::TooManyEntities { given: 4 });
    }
}
