//! Clockwork: a process-oriented discrete-event simulation kernel.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Clockwork sub-crates. Most models only need `clockwork` as a single
//! dependency.
//!
//! # Quick start
//!
//! ```rust
//! use clockwork::prelude::*;
//!
//! let config = SimulationConfig::named("quickstart", StrandBackend::Continuations);
//! let mut sim = Simulation::new(config).unwrap();
//!
//! let service = TimeSpan::new(5).unwrap();
//! let customer = sim.spawn(
//!     "Customer",
//!     from_fn(move |ctx: ProcessContext| async move {
//!         ctx.hold(service).await?;
//!         ctx.hold(service).await
//!     }),
//! );
//! sim.activate(customer, TimeSpan::ZERO).unwrap();
//!
//! let report = sim.run().unwrap();
//! assert_eq!(report.final_time, TimeInstant::from_epsilons(10));
//! assert_eq!(report.terminated, 1);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `clockwork-core` | Time, IDs, errors, interrupt codes, conditions |
//! | [`events`] | `clockwork-events` | Event notes and the event list strategies |
//! | [`queue`] | `clockwork-queue` | Ordered wait lines with statistics |
//! | [`strand`] | `clockwork-strand` | Thread and continuation strand backends |
//! | [`engine`] | `clockwork-engine` | Scheduler, clock, processes, event routines |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`clockwork-core`).
///
/// Simulation time ([`types::TimeInstant`], [`types::TimeSpan`]), the
/// error types, and [`types::InterruptCode`].
pub use clockwork_core as types;

/// Event notes and event lists (`clockwork-events`).
///
/// [`events::LinkedEventList`] supports anchor insertion and optional
/// tie shuffling; [`events::BucketedEventList`] trades those away for
/// bucketed lookup.
pub use clockwork_events as events;

/// Queues of waiting entities (`clockwork-queue`).
pub use clockwork_queue as queue;

/// Strand backends that carry process life cycles (`clockwork-strand`).
pub use clockwork_strand as strand;

/// Scheduler and process API (`clockwork-engine`).
///
/// [`engine::Simulation`] owns a run; process bodies receive an
/// [`engine::ProcessContext`] to hold, passivate, wait and schedule.
pub use clockwork_engine as engine;

/// Common imports for typical Clockwork models.
///
/// ```rust
/// use clockwork::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use clockwork_core::{
        Condition, EntityId, EventId, Identified, InterruptCode, Named, NoteId, Prioritized,
        ProcessId, TimeInstant, TimeSpan, Traced,
    };

    // Errors
    pub use clockwork_core::{BodyError, KernelError, QueueWarning, TimeError};

    // Queues
    pub use clockwork_queue::{Discipline, QueueList};

    // Engine
    pub use clockwork_engine::{
        from_fn, ArrivalSource, EventContext, EventListKind, FixedInterval, ProcessBody,
        ProcessContext, RunReport, Simulation, SimulationConfig, StopCondition, StopReason,
        StrandBackend, Successor,
    };
}
