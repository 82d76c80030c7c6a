//! Scheduler, clock and process API of the Clockwork simulation kernel.
//!
//! A [`Simulation`] is built from a [`SimulationConfig`], populated with
//! processes ([`ProcessBody`] implementations or [`from_fn`] closures)
//! and event routines, and then driven with [`Simulation::run`],
//! [`Simulation::run_until`] or single [`Simulation::step`]s.
//!
//! Simulated time only moves when the scheduler dispatches the next
//! note. Between dispatches exactly one party runs: the scheduler, one
//! process strand, or one event routine.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arrival;
pub mod clock;
pub mod config;
pub mod event;
pub(crate) mod kernel;
pub mod process;
pub mod simulation;

pub use arrival::{ArrivalSource, FixedInterval, IntervalSource, Successor, SuccessorFactory};
pub use clock::{ClockAdvance, ClockNotice, ClockObserver, ObserverId, SimClock};
pub use clockwork_strand::LifeCycleFuture;
pub use config::{ConfigError, EventListKind, SimulationConfig, StrandBackend, ThreadConfig};
pub use event::{EventContext, EventRoutine};
pub use process::{from_fn, FnBody, ProcessBody, ProcessContext};
pub use simulation::{ProcessStatus, RunReport, Simulation, StopCondition, StopReason};
