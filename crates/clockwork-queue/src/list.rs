//! The ordered wait list shared by every discipline.

use std::fmt;
use std::sync::Arc;

use clockwork_core::{
    Condition, EntityId, Identified, Named, Prioritized, QueueId, QueueWarning, TimeInstant,
};

use crate::directory::QueueDirectory;
use crate::discipline::Discipline;
use crate::stats::{OccupancyStats, QueueStatistics};

/// One waiting entity and the instant it joined.
#[derive(Clone, Debug)]
pub struct QueueEntry<E> {
    /// The waiting entity.
    pub item: E,
    /// When it entered the list.
    pub entered: TimeInstant,
}

/// Ordered sequence of entities awaiting a shared resource.
///
/// No entity appears twice. FIFO and LIFO lists are ordered by
/// descending priority with the discipline breaking ties; a random list
/// ignores priority. Misuse (duplicate insert, removing an entity that
/// is not waiting) is a recoverable [`QueueWarning`]: it is logged, the
/// list is left unchanged, and the run continues.
pub struct QueueList<E, S = OccupancyStats> {
    id: QueueId,
    name: String,
    discipline: Discipline,
    entries: Vec<QueueEntry<E>>,
    stats: S,
    directory: Option<Arc<QueueDirectory>>,
}

impl<E, S: fmt::Debug> fmt::Debug for QueueList<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueList")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("discipline", &self.discipline.abbreviation())
            .field("len", &self.entries.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<E: Identified + Prioritized> QueueList<E, OccupancyStats> {
    /// A wait list collecting [`OccupancyStats`].
    pub fn new(id: QueueId, name: impl Into<String>, discipline: Discipline) -> Self {
        Self::with_statistics(id, name, discipline, OccupancyStats::default())
    }

    /// A first-in-first-out wait list.
    pub fn fifo(id: QueueId, name: impl Into<String>) -> Self {
        Self::new(id, name, Discipline::Fifo)
    }

    /// A last-in-first-out wait list.
    pub fn lifo(id: QueueId, name: impl Into<String>) -> Self {
        Self::new(id, name, Discipline::Lifo)
    }

    /// A random-order wait list seeded with `seed`.
    pub fn random(id: QueueId, name: impl Into<String>, seed: u64) -> Self {
        Self::new(id, name, Discipline::random(seed))
    }
}

impl<E: Identified + Prioritized, S: QueueStatistics> QueueList<E, S> {
    /// A wait list reporting to a custom statistics collaborator.
    pub fn with_statistics(
        id: QueueId,
        name: impl Into<String>,
        discipline: Discipline,
        stats: S,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            discipline,
            entries: Vec::new(),
            stats,
            directory: None,
        }
    }

    /// Keep `directory` informed of which entities wait here.
    pub fn attach_directory(mut self, directory: Arc<QueueDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// This list's id.
    pub fn id(&self) -> QueueId {
        self.id
    }

    /// The tie-break discipline.
    pub fn discipline(&self) -> &Discipline {
        &self.discipline
    }

    /// Short discipline name.
    pub fn abbreviation(&self) -> &'static str {
        self.discipline.abbreviation()
    }

    /// Restart the random stream of a random list.
    pub fn set_seed(&mut self, seed: u64) {
        self.discipline.set_seed(seed);
    }

    /// The statistics collaborator.
    pub fn stats(&self) -> &S {
        &self.stats
    }

    /// Mutable access to the statistics collaborator.
    pub fn stats_mut(&mut self) -> &mut S {
        &mut self.stats
    }

    /// Add `item` in discipline order.
    pub fn insert(&mut self, item: E, now: TimeInstant) -> Result<(), QueueWarning> {
        let entity = item.entity_id();
        if self.contains(entity) {
            let warning = QueueWarning::AlreadyQueued {
                entity,
                queue: self.name.clone(),
            };
            tracing::warn!(
                target: "clockwork::warning",
                queue = %self.name,
                %entity,
                "insert ignored: {warning}"
            );
            return Err(warning);
        }
        let priorities: Vec<i32> = self.entries.iter().map(|e| e.item.priority()).collect();
        let idx = self.discipline.insertion_index(&priorities, item.priority());
        self.entries.insert(
            idx,
            QueueEntry {
                item,
                entered: now,
            },
        );
        self.stats.on_insert(now, self.entries.len());
        if let Some(dir) = &self.directory {
            dir.attach(entity, self.id);
        }
        Ok(())
    }

    /// The entity at the front.
    pub fn first(&self) -> Option<&E> {
        self.entries.first().map(|e| &e.item)
    }

    /// The entity at the back.
    pub fn last(&self) -> Option<&E> {
        self.entries.last().map(|e| &e.item)
    }

    /// The entity at `index` (0 is the front).
    pub fn get(&self, index: usize) -> Option<&E> {
        self.entries.get(index).map(|e| &e.item)
    }

    /// The entry (entity plus entry time) at `index`.
    pub fn entry(&self, index: usize) -> Option<&QueueEntry<E>> {
        self.entries.get(index)
    }

    /// Position of `entity`, if it is waiting.
    pub fn position(&self, entity: EntityId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.item.entity_id() == entity)
    }

    /// Whether `entity` is waiting.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.position(entity).is_some()
    }

    /// The entity directly ahead of `entity`.
    pub fn pred(&self, entity: EntityId) -> Option<&E> {
        let idx = self.position(entity)?;
        idx.checked_sub(1).and_then(|i| self.get(i))
    }

    /// The entity directly behind `entity`.
    pub fn succ(&self, entity: EntityId) -> Option<&E> {
        let idx = self.position(entity)?;
        self.get(idx + 1)
    }

    /// The frontmost entity satisfying `condition`.
    pub fn first_matching<C: Condition<E> + ?Sized>(&self, condition: &C) -> Option<&E> {
        self.iter().find(|e| condition.check(e))
    }

    /// Remove `entity`.
    pub fn remove(&mut self, entity: EntityId, now: TimeInstant) -> Result<E, QueueWarning> {
        match self.position(entity) {
            Some(idx) => Ok(self.take(idx, now)),
            None => {
                let warning = QueueWarning::NotQueued {
                    entity,
                    queue: self.name.clone(),
                };
                tracing::warn!(
                    target: "clockwork::warning",
                    queue = %self.name,
                    %entity,
                    "remove ignored: {warning}"
                );
                Err(warning)
            }
        }
    }

    /// Remove the entity at `index`.
    pub fn remove_at(&mut self, index: usize, now: TimeInstant) -> Result<E, QueueWarning> {
        if index >= self.entries.len() {
            return Err(QueueWarning::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        Ok(self.take(index, now))
    }

    /// Remove the frontmost entity.
    pub fn remove_first(&mut self, now: TimeInstant) -> Option<E> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.take(0, now))
    }

    /// Remove the backmost entity.
    pub fn remove_last(&mut self, now: TimeInstant) -> Option<E> {
        let idx = self.entries.len().checked_sub(1)?;
        Some(self.take(idx, now))
    }

    fn take(&mut self, index: usize, now: TimeInstant) -> E {
        let entry = self.entries.remove(index);
        self.stats.on_remove(entry.entered, now, self.entries.len());
        if let Some(dir) = &self.directory {
            dir.detach(entry.item.entity_id(), self.id);
        }
        entry.item
    }

    /// Number of waiting entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waiting entities, front to back.
    pub fn iter(&self) -> impl Iterator<Item = &E> + '_ {
        self.entries.iter().map(|e| &e.item)
    }
}

impl<E, S> Named for QueueList<E, S> {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[derive(Clone, Debug, PartialEq)]
    struct Customer {
        id: u64,
        priority: i32,
    }

    impl Identified for Customer {
        fn entity_id(&self) -> EntityId {
            EntityId(self.id)
        }
    }

    impl Prioritized for Customer {
        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn c(id: u64, priority: i32) -> Customer {
        Customer { id, priority }
    }

    fn t(x: i64) -> TimeInstant {
        TimeInstant::from_epsilons(x)
    }

    fn ids<S: QueueStatistics>(q: &QueueList<Customer, S>) -> Vec<u64> {
        q.iter().map(|c| c.id).collect()
    }

    #[test]
    fn fifo_equal_priority_dequeues_in_arrival_order() {
        let mut q = QueueList::fifo(QueueId(1), "q");
        q.insert(c(1, 0), t(0)).unwrap();
        q.insert(c(2, 0), t(0)).unwrap();
        assert_eq!(q.remove_first(t(1)).map(|c| c.id), Some(1));
        assert_eq!(q.remove_first(t(1)).map(|c| c.id), Some(2));
    }

    #[test]
    fn lifo_equal_priority_dequeues_in_reverse() {
        let mut q = QueueList::lifo(QueueId(1), "q");
        q.insert(c(1, 0), t(0)).unwrap();
        q.insert(c(2, 0), t(0)).unwrap();
        assert_eq!(q.remove_first(t(1)).map(|c| c.id), Some(2));
        assert_eq!(q.remove_first(t(1)).map(|c| c.id), Some(1));
    }

    #[test]
    fn higher_priority_jumps_ahead() {
        let mut q = QueueList::fifo(QueueId(1), "q");
        q.insert(c(1, 0), t(0)).unwrap();
        q.insert(c(2, 5), t(0)).unwrap();
        q.insert(c(3, 5), t(0)).unwrap();
        q.insert(c(4, -1), t(0)).unwrap();
        assert_eq!(ids(&q), vec![2, 3, 1, 4]);

        let mut l = QueueList::lifo(QueueId(2), "l");
        for x in [c(1, 0), c(2, 5), c(3, 5), c(4, -1)] {
            l.insert(x, t(0)).unwrap();
        }
        assert_eq!(ids(&l), vec![3, 2, 1, 4]);
    }

    #[traced_test]
    #[test]
    fn duplicate_insert_is_a_logged_no_op() {
        let mut q = QueueList::fifo(QueueId(1), "checkout");
        q.insert(c(1, 0), t(0)).unwrap();
        let err = q.insert(c(1, 3), t(0)).unwrap_err();
        assert_eq!(
            err,
            QueueWarning::AlreadyQueued {
                entity: EntityId(1),
                queue: "checkout".into(),
            }
        );
        assert_eq!(q.len(), 1);
        assert_eq!(q.stats().insertions(), 1);
        assert!(logs_contain("insert ignored"));
    }

    #[traced_test]
    #[test]
    fn removing_a_stranger_is_a_logged_no_op() {
        let mut q: QueueList<Customer> = QueueList::fifo(QueueId(1), "q");
        let err = q.remove(EntityId(5), t(0)).unwrap_err();
        assert!(matches!(err, QueueWarning::NotQueued { .. }));
        assert!(logs_contain("remove ignored"));
    }

    #[test]
    fn neighbours_and_positions() {
        let mut q = QueueList::fifo(QueueId(1), "q");
        for i in 1..=3 {
            q.insert(c(i, 0), t(0)).unwrap();
        }
        assert_eq!(q.position(EntityId(2)), Some(1));
        assert_eq!(q.pred(EntityId(2)).map(|c| c.id), Some(1));
        assert_eq!(q.succ(EntityId(2)).map(|c| c.id), Some(3));
        assert!(q.pred(EntityId(1)).is_none());
        assert!(q.succ(EntityId(3)).is_none());
        assert_eq!(q.first().map(|c| c.id), Some(1));
        assert_eq!(q.last().map(|c| c.id), Some(3));
    }

    #[test]
    fn removal_updates_statistics_and_directory() {
        let dir = Arc::new(QueueDirectory::new());
        let mut q = QueueList::fifo(QueueId(7), "q").attach_directory(Arc::clone(&dir));
        q.insert(c(1, 0), t(0)).unwrap();
        q.insert(c(2, 0), t(2)).unwrap();
        assert_eq!(dir.queues_of(EntityId(1)), vec![QueueId(7)]);

        let first = q.remove(EntityId(1), t(5)).unwrap();
        assert_eq!(first.id, 1);
        assert!(!dir.is_queued(EntityId(1)));
        assert!(dir.is_queued(EntityId(2)));
        assert_eq!(q.stats().removals(), 1);
        assert_eq!(q.stats().max_wait().epsilons(), 5);

        assert_eq!(q.remove_last(t(6)).map(|c| c.id), Some(2));
        assert!(q.remove_first(t(6)).is_none());
        assert_eq!(
            q.remove_at(0, t(6)),
            Err(QueueWarning::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn first_matching_uses_conditions() {
        let mut q = QueueList::fifo(QueueId(1), "q");
        for x in [c(1, 0), c(2, 0), c(3, 0)] {
            q.insert(x, t(0)).unwrap();
        }
        let even = |x: &Customer| x.id % 2 == 0;
        assert_eq!(q.first_matching(&even).map(|c| c.id), Some(2));
        let none = |x: &Customer| x.id > 10;
        assert!(q.first_matching(&none).is_none());
    }

    #[test]
    fn random_ignores_priority_and_is_reproducible() {
        let build = |seed| {
            let mut q = QueueList::random(QueueId(1), "r", seed);
            for i in 0..20 {
                q.insert(c(i, (i % 3) as i32), t(0)).unwrap();
            }
            ids(&q)
        };
        assert_eq!(build(42), build(42));
        let mut q = QueueList::random(QueueId(1), "r", 42);
        q.insert(c(1, 0), t(0)).unwrap();
        q.set_seed(42);
        assert_eq!(q.abbreviation(), "Random");
    }
}
