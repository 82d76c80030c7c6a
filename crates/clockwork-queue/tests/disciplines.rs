//! Discipline-level properties of wait lists.

use clockwork_core::{EntityId, Identified, Prioritized, QueueId, TimeInstant};
use clockwork_queue::{Discipline, NoStatistics, QueueList};
use proptest::prelude::*;

#[derive(Clone, Debug)]
struct Job {
    id: u64,
    priority: i32,
}

impl Identified for Job {
    fn entity_id(&self) -> EntityId {
        EntityId(self.id)
    }
}

impl Prioritized for Job {
    fn priority(&self) -> i32 {
        self.priority
    }
}

const T0: TimeInstant = TimeInstant::ZERO;

// ── Random discipline uniformity ────────────────────────────────

/// Insert a marker into a list of `others` 10,000 times and count where
/// it lands. Returns per-slot counts.
fn landing_counts(seed: u64, marker_priority: i32, others: usize) -> Vec<u64> {
    let mut q = QueueList::with_statistics(QueueId(1), "r", Discipline::random(seed), NoStatistics);
    for i in 0..others as u64 {
        q.insert(
            Job {
                id: i,
                priority: (i as i32 % 5) - 2,
            },
            T0,
        )
        .unwrap();
    }
    let marker = EntityId(1_000);
    let mut counts = vec![0u64; others + 1];
    for _ in 0..10_000 {
        q.insert(
            Job {
                id: marker.0,
                priority: marker_priority,
            },
            T0,
        )
        .unwrap();
        let pos = q.position(marker).unwrap();
        counts[pos] += 1;
        q.remove(marker, T0).unwrap();
    }
    counts
}

fn chi_square(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    let expected = total as f64 / counts.len() as f64;
    counts
        .iter()
        .map(|&c| {
            let d = c as f64 - expected;
            d * d / expected
        })
        .sum()
}

#[test]
fn random_positions_are_uniform() {
    let counts = landing_counts(2024, 0, 9);
    assert_eq!(counts.iter().sum::<u64>(), 10_000);
    // 9 degrees of freedom, p = 0.001.
    assert!(chi_square(&counts) < 27.88, "counts {counts:?}");
}

#[test]
fn random_positions_ignore_priority() {
    let high = landing_counts(7, 1_000, 9);
    let low = landing_counts(7, -1_000, 9);
    // Same seed, same draws: priority has no say in placement.
    assert_eq!(high, low);
    assert!(chi_square(&high) < 27.88, "counts {high:?}");
}

// ── FIFO / LIFO ordering invariants ─────────────────────────────

fn arb_priorities() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(-3i32..4, 0..60)
}

fn fill(discipline: Discipline, priorities: &[i32]) -> QueueList<Job, NoStatistics> {
    let mut q = QueueList::with_statistics(QueueId(1), "q", discipline, NoStatistics);
    for (i, &p) in priorities.iter().enumerate() {
        q.insert(
            Job {
                id: i as u64,
                priority: p,
            },
            T0,
        )
        .unwrap();
    }
    q
}

proptest! {
    #[test]
    fn fifo_sorted_by_priority_then_arrival(priorities in arb_priorities()) {
        let q = fill(Discipline::Fifo, &priorities);
        prop_assert_eq!(q.len(), priorities.len());
        let jobs: Vec<&Job> = q.iter().collect();
        for w in jobs.windows(2) {
            prop_assert!(w[0].priority >= w[1].priority);
            if w[0].priority == w[1].priority {
                prop_assert!(w[0].id < w[1].id);
            }
        }
    }

    #[test]
    fn lifo_sorted_by_priority_then_reverse_arrival(priorities in arb_priorities()) {
        let q = fill(Discipline::Lifo, &priorities);
        let jobs: Vec<&Job> = q.iter().collect();
        for w in jobs.windows(2) {
            prop_assert!(w[0].priority >= w[1].priority);
            if w[0].priority == w[1].priority {
                prop_assert!(w[0].id > w[1].id);
            }
        }
    }

    #[test]
    fn duplicates_never_enter(priorities in arb_priorities(), seed in any::<u64>()) {
        let mut q = fill(Discipline::random(seed), &priorities);
        for (i, &p) in priorities.iter().enumerate() {
            let again = Job { id: i as u64, priority: p };
            prop_assert!(q.insert(again, T0).is_err());
        }
        prop_assert_eq!(q.len(), priorities.len());
    }
}
