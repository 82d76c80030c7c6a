//! Execution strands: independently suspendable control units, one per
//! simulated process.
//!
//! A process body is an `async` future. It may suspend only by awaiting
//! a [`Suspender::park`] future, which the kernel's hold, passivate and
//! wait operations do on its behalf. Two interchangeable backends drive
//! these futures behind the [`StrandFactory`] contract:
//!
//! - [`ThreadStrandFactory`]: one named OS thread per strand, with the
//!   baton passed over bounded channels. Parking blocks the worker.
//! - [`ContinuationStrandFactory`]: every strand is polled on the
//!   scheduler's own thread. Parking is a single cooperative
//!   `Poll::Pending`; any other pending future stalls the run and is
//!   reported as [`KernelError::InvalidSuspension`].
//!
//! Exactly one backend serves a whole run. In both, at most one strand
//! executes user code at any instant.
//!
//! [`KernelError::InvalidSuspension`]: clockwork_core::KernelError::InvalidSuspension

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod continuation;
pub mod factory;
pub mod park;
pub mod run_loop;
pub mod thread;

pub use continuation::ContinuationStrandFactory;
pub use factory::{
    BodyBuilder, BodyFuture, CleanupReport, Strand, StrandBackend, StrandEvent, StrandFactory,
};
pub use park::{ParkFuture, Suspender, Wakeup};
pub use run_loop::{run_loop, LifeCycle, LifeCycleFuture, RunHost};
pub use thread::{ThreadConfig, ThreadStrandFactory};
