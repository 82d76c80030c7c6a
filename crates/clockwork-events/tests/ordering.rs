//! Ordering properties shared by every event-list strategy.
//!
//! A random interleaving of inserts (never before the clock),
//! dispatches and cancellations is replayed against each strategy and a
//! plain sorted reference; every dispatch must return the reference's
//! minimum.

use clockwork_core::{EntityId, KernelError, NoteId, ProcessId, TimeInstant, TimeSpan};
use clockwork_events::{BucketedEventList, EventList, EventNote, LinkedEventList, Schedulable};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Op {
    Insert { delay: i64, priority: i32, pid: u64 },
    Dispatch,
    Cancel(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0i64..20, -2i32..3, 1u64..6)
            .prop_map(|(delay, priority, pid)| Op::Insert { delay, priority, pid }),
        2 => Just(Op::Dispatch),
        1 => (0usize..32).prop_map(Op::Cancel),
    ]
}

/// Replay `ops`, checking each dispatch against the sorted reference.
fn check_against_reference(list: &mut dyn EventList, ops: &[Op]) -> Result<(), TestCaseError> {
    let mut reference: Vec<EventNote> = Vec::new();
    let mut now = TimeInstant::ZERO;
    let mut next_id = 0u64;

    for op in ops {
        match op {
            Op::Insert {
                delay,
                priority,
                pid,
            } => {
                let time = TimeInstant::from_epsilons(now.epsilons() + delay);
                let note = EventNote::new(NoteId(next_id), time, Schedulable::Process(ProcessId(*pid)))
                    .with_priority(*priority);
                next_id += 1;
                list.insert(note.clone(), now).map_err(|e| TestCaseError::fail(e.to_string()))?;
                reference.push(note);
            }
            Op::Dispatch => {
                reference.sort();
                let expected = if reference.is_empty() {
                    None
                } else {
                    Some(reference.remove(0))
                };
                let got = list.remove_first();
                prop_assert_eq!(got.as_ref().map(|n| n.id()), expected.as_ref().map(|n| n.id()));
                if let Some(n) = got {
                    prop_assert!(n.time() >= now);
                    now = n.time();
                }
            }
            Op::Cancel(i) => {
                if reference.is_empty() {
                    continue;
                }
                let victim = reference.remove(i % reference.len());
                let removed = list.remove(victim.id());
                prop_assert_eq!(removed.map(|n| n.id()), Some(victim.id()));
                prop_assert!(!list.contains(victim.id()));
                for e in victim.entities() {
                    prop_assert!(!list.pending_for_entity(*e).contains(&victim.id()));
                }
            }
        }
        prop_assert_eq!(list.len(), reference.len());
    }

    for pid in 1..6u64 {
        let mut expected: Vec<NoteId> = reference
            .iter()
            .filter(|n| n.references(EntityId(pid)))
            .map(|n| n.id())
            .collect();
        let mut got = list.pending_for_entity(EntityId(pid));
        expected.sort();
        got.sort();
        prop_assert_eq!(got, expected);
    }
    Ok(())
}

proptest! {
    #[test]
    fn linked_dispatches_in_natural_order(ops in prop::collection::vec(arb_op(), 0..120)) {
        let mut list = LinkedEventList::new();
        check_against_reference(&mut list, &ops)?;
    }

    #[test]
    fn bucketed_dispatches_in_natural_order(
        width in 1i64..16,
        ops in prop::collection::vec(arb_op(), 0..120),
    ) {
        let mut list = BucketedEventList::new(TimeSpan::new(width).unwrap());
        check_against_reference(&mut list, &ops)?;
    }

    #[test]
    fn randomizing_never_breaks_time_order(
        seed in any::<u64>(),
        times in prop::collection::vec(0i64..5, 1..60),
    ) {
        let mut list = LinkedEventList::randomizing(seed);
        for (i, t) in times.iter().enumerate() {
            let note = EventNote::new(
                NoteId(i as u64),
                TimeInstant::from_epsilons(*t),
                Schedulable::Stop,
            );
            list.insert(note, TimeInstant::ZERO).unwrap();
        }
        let mut last = TimeInstant::ZERO;
        while let Some(n) = list.remove_first() {
            prop_assert!(n.time() >= last);
            last = n.time();
        }
    }
}

// ── Past-time refusal ───────────────────────────────────────────

fn refuses_past(list: &mut dyn EventList) {
    let now = TimeInstant::from_epsilons(10);
    let note = EventNote::new(NoteId(0), TimeInstant::from_epsilons(9), Schedulable::Stop);
    let err = list.insert(note, now).unwrap_err();
    assert_eq!(
        err,
        KernelError::SchedulingOrder {
            requested: TimeInstant::from_epsilons(9),
            now,
        }
    );
    assert!(list.is_empty());

    let on_time = EventNote::new(NoteId(1), now, Schedulable::Stop);
    list.insert(on_time, now).unwrap();
    assert_eq!(list.len(), 1);
}

#[test]
fn every_strategy_refuses_the_past() {
    refuses_past(&mut LinkedEventList::new());
    refuses_past(&mut LinkedEventList::randomizing(7));
    refuses_past(&mut BucketedEventList::new(TimeSpan::new(4).unwrap()));
}

#[test]
fn strategies_are_interchangeable_behind_the_trait() {
    let lists: Vec<Box<dyn EventList>> = vec![
        Box::new(LinkedEventList::new()),
        Box::new(BucketedEventList::new(TimeSpan::new(3).unwrap())),
    ];
    for mut list in lists {
        for (id, t) in [(0u64, 5i64), (1, 3), (2, 13)] {
            let n = EventNote::new(
                NoteId(id),
                TimeInstant::from_epsilons(t),
                Schedulable::Process(ProcessId(id + 1)),
            );
            list.insert(n, TimeInstant::ZERO).unwrap();
        }
        let order: Vec<u64> = std::iter::from_fn(|| list.remove_first().map(|n| n.id().0)).collect();
        assert_eq!(order, vec![1, 0, 2], "strategy {}", list.strategy_name());
    }
}
