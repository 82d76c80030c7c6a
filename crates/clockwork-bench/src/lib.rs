//! Benchmark profiles and utilities for the Clockwork simulation kernel.
//!
//! - [`note_workload`]: deterministic (time, priority) pairs for event
//!   list benchmarks, and [`fill_list`] to load them.
//! - [`bank_model`]: a single-clerk bank with a FIFO wait line, used to
//!   compare the strand backends end to end.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use clockwork_core::{
    BodyError, KernelError, ProcessId, RunCounters, SeededRng, TimeInstant, TimeSpan,
};
use clockwork_engine::{
    from_fn, ArrivalSource, EventListKind, FixedInterval, ProcessContext, Simulation,
    SimulationConfig, StrandBackend, Successor,
};
use clockwork_events::{EventList, EventNote, Schedulable};
use clockwork_queue::{OccupancyStats, QueueList};

/// `count` notes spread over `[0, horizon]` with priorities in `[0, 3]`.
pub fn note_workload(count: usize, horizon: usize, seed: u64) -> Vec<(TimeInstant, i32)> {
    let mut rng = SeededRng::new(seed);
    (0..count)
        .map(|_| {
            let time = TimeInstant::from_epsilons(rng.index_inclusive(horizon) as i64);
            let priority = rng.index_inclusive(3) as i32;
            (time, priority)
        })
        .collect()
}

/// Insert every workload entry into `list` as a process note.
pub fn fill_list(
    list: &mut dyn EventList,
    counters: &RunCounters,
    workload: &[(TimeInstant, i32)],
) -> Result<(), KernelError> {
    for &(time, priority) in workload {
        let pid = counters.next_process();
        let note = EventNote::new(counters.next_note(), time, Schedulable::Process(pid))
            .with_priority(priority);
        list.insert(note, TimeInstant::ZERO)?;
    }
    Ok(())
}

// ── Bank model ─────────────────────────────────────────────────────

/// Shared state of the bank model.
pub struct Bank {
    /// Customers waiting for the clerk.
    pub line: Mutex<QueueList<ProcessContext, OccupancyStats>>,
    /// Set while the clerk is passivated with an empty line.
    pub clerk_idle: AtomicBool,
    /// Customers who have been served.
    pub served: AtomicU64,
    clerk: Mutex<Option<ProcessId>>,
    service: TimeSpan,
}

impl Bank {
    /// Number of customers served so far.
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }

    /// Longest the line ever was.
    pub fn max_line(&self) -> usize {
        self.line
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats()
            .max_length()
    }

    fn clerk(&self) -> Option<ProcessId> {
        *self.clerk.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn customer(ctx: ProcessContext, bank: Arc<Bank>) -> Result<(), BodyError> {
    let now = ctx.now();
    // Already queued is impossible here; the warning is logged anyway.
    let _ = bank
        .line
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(ctx.clone(), now);
    if let Some(clerk) = bank.clerk() {
        if bank.clerk_idle.swap(false, Ordering::SeqCst) {
            ctx.activate(clerk, TimeSpan::ZERO)?;
        }
    }
    ctx.passivate().await?;
    bank.served.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

async fn clerk(ctx: ProcessContext, bank: Arc<Bank>) -> Result<(), BodyError> {
    loop {
        let now = ctx.now();
        let next = bank
            .line
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_first(now);
        match next {
            Some(served) => {
                ctx.hold(bank.service).await?;
                ctx.activate(served.id(), TimeSpan::ZERO)?;
            }
            None => {
                bank.clerk_idle.store(true, Ordering::SeqCst);
                ctx.passivate().await?;
            }
        }
    }
}

/// A bank where `customers` arrive every `interarrival` epsilons and one
/// clerk serves each for `service` epsilons.
pub fn bank_model(
    backend: StrandBackend,
    event_list: EventListKind,
    customers: usize,
    interarrival: i64,
    service: i64,
) -> Result<(Simulation, Arc<Bank>), Box<dyn Error>> {
    let config = SimulationConfig {
        event_list,
        ..SimulationConfig::named("bank", backend)
    };
    let sim = Simulation::new(config)?;
    let line =
        QueueList::fifo(sim.counters().next_queue(), "line").attach_directory(sim.directory());
    let bank = Arc::new(Bank {
        line: Mutex::new(line),
        clerk_idle: AtomicBool::new(false),
        served: AtomicU64::new(0),
        clerk: Mutex::new(None),
        service: TimeSpan::new(service)?,
    });

    let b = Arc::clone(&bank);
    let clerk_pid = sim.spawn("Clerk", from_fn(move |ctx| clerk(ctx, Arc::clone(&b))));
    *bank.clerk.lock().unwrap_or_else(PoisonError::into_inner) = Some(clerk_pid);

    let b = Arc::clone(&bank);
    let mut remaining = customers;
    let arrivals = move || {
        if remaining == 0 {
            return None;
        }
        remaining -= 1;
        let b = Arc::clone(&b);
        Some(Successor::new(
            "Customer",
            from_fn(move |ctx| customer(ctx, Arc::clone(&b))),
        ))
    };
    let source = sim.spawn(
        "Arrivals",
        ArrivalSource::new(arrivals, FixedInterval(TimeSpan::new(interarrival)?)),
    );
    sim.activate(clerk_pid, TimeSpan::ZERO)?;
    sim.activate(source, TimeSpan::ZERO)?;
    Ok((sim, bank))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_is_deterministic() {
        assert_eq!(note_workload(50, 100, 9), note_workload(50, 100, 9));
        assert!(note_workload(50, 100, 9)
            .iter()
            .all(|&(t, p)| t.epsilons() <= 100 && (0..=3).contains(&p)));
    }

    #[test]
    fn fill_list_loads_every_note() {
        let counters = RunCounters::new();
        let mut list = clockwork_events::LinkedEventList::new();
        fill_list(&mut list, &counters, &note_workload(64, 10, 1)).unwrap();
        assert_eq!(list.len(), 64);
        let mut last = TimeInstant::ZERO;
        while let Some(n) = list.remove_first() {
            assert!(!n.time().is_before(last));
            last = n.time();
        }
    }

    #[test]
    fn bank_serves_everyone_on_both_backends() {
        for backend in [StrandBackend::Threads, StrandBackend::Continuations] {
            let (mut sim, bank) =
                bank_model(backend, EventListKind::Linked, 20, 3, 5).unwrap();
            let report = sim.run().unwrap();
            assert_eq!(bank.served(), 20, "{backend}");
            // Service is slower than arrivals, so a line builds up.
            assert!(bank.max_line() > 1);
            // The idle clerk is the only strand left to tear down.
            assert_eq!(report.cleanup.torn_down, 1);
        }
    }
}
