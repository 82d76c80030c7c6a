//! The strand factory contract shared by both backends.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use clockwork_core::{KernelError, ProcessId};

use crate::park::Suspender;

/// A strand's complete program: usually the process run-loop.
pub type BodyFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Builds a strand's program once its [`Suspender`] exists.
pub type BodyBuilder = Box<dyn FnOnce(Suspender) -> BodyFuture + Send + 'static>;

/// What a strand did with the control it was given.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrandEvent {
    /// Suspended at a kernel suspension point.
    Parked,
    /// Ran to completion and released the strand.
    Terminated,
}

/// Which backend serves a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrandBackend {
    /// One OS thread per strand.
    #[default]
    Threads,
    /// All strands polled on the scheduler's thread.
    Continuations,
}

impl fmt::Display for StrandBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threads => write!(f, "threads"),
            Self::Continuations => write!(f, "continuations"),
        }
    }
}

/// One independently suspendable control unit.
///
/// Created unstarted; the body first runs on the first
/// [`resume`](Strand::resume).
pub trait Strand: Send {
    /// The strand's name.
    fn name(&self) -> &str;

    /// The process this strand is bound to, if any.
    fn process(&self) -> Option<ProcessId>;

    /// Hand control to the strand and wait until it parks again or
    /// terminates.
    ///
    /// Resuming a terminated strand is a no-op returning
    /// [`StrandEvent::Terminated`].
    fn resume(&mut self) -> Result<StrandEvent, KernelError>;

    /// Whether the strand has been resumed at least once.
    fn is_started(&self) -> bool;

    /// Whether the strand's program has finished.
    fn is_terminated(&self) -> bool;
}

/// Outcome of [`StrandFactory::clean_up`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Parked strands sent a teardown wakeup.
    pub torn_down: usize,
    /// Strands that were never started and were discarded.
    pub discarded: usize,
    /// Strands whose teardown failed (panicked worker, stalled body).
    pub failed: usize,
}

/// Creates strands for one run and reclaims them at the end.
pub trait StrandFactory: Send + Sync {
    /// The backend this factory provides.
    fn backend(&self) -> StrandBackend;

    /// Create an unstarted strand bound to `process`.
    fn create_for_process(
        &self,
        process: ProcessId,
        name: &str,
        body: BodyBuilder,
    ) -> Result<Box<dyn Strand>, KernelError>;

    /// Create an unstarted strand not bound to a process.
    fn create_named(&self, name: &str, body: BodyBuilder) -> Result<Box<dyn Strand>, KernelError>;

    /// Retire every surviving strand and release backend resources.
    ///
    /// Parked strands are woken with a teardown so their run-loops
    /// finish normally. Idempotent.
    fn clean_up(&self) -> CleanupReport;
}
