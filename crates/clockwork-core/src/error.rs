//! Error types for the Clockwork simulation kernel.
//!
//! Organized by severity, following the kernel's propagation policy:
//!
//! - [`QueueWarning`]: recoverable, handled where it occurs, never
//!   crosses a component boundary.
//! - [`KernelError`]: everything that is escalated to the run
//!   controller, from scheduling-order violations to wrapped failures of
//!   process bodies.
//! - [`BodyError`]: what a process body or event routine returns; the
//!   run-loop funnels it into a [`KernelError`] or swallows it.
//! - [`TimeError`]: arithmetic on the epsilon grid.

use std::error::Error;
use std::fmt;

use crate::id::{EntityId, EventId, NoteId, ProcessId};
use crate::interrupt::InterruptCode;
use crate::time::TimeInstant;

// ── TimeError ───────────────────────────────────────────────────────

/// Errors from time arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeError {
    /// A span was constructed from a negative epsilon count.
    NegativeSpan {
        /// The rejected value.
        epsilons: i64,
    },
    /// The result does not fit the grid.
    Overflow,
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeSpan { epsilons } => {
                write!(f, "time span must not be negative, got {epsilons}")
            }
            Self::Overflow => write!(f, "time arithmetic overflowed"),
        }
    }
}

impl Error for TimeError {}

// ── KernelError ─────────────────────────────────────────────────────

/// Errors escalated to the run controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// Attempt to schedule or set time before the current clock value.
    SchedulingOrder {
        /// The instant that was requested.
        requested: TimeInstant,
        /// The clock value at the time of the request.
        now: TimeInstant,
    },
    /// A process tried to suspend on a new wakeup while one is pending.
    AlreadyScheduled {
        /// Name of the process.
        process: String,
        /// Due time of the pending wakeup.
        due: TimeInstant,
    },
    /// An event-list strategy was asked for an operation it cannot
    /// provide (anchor-relative insertion on the bucketed strategy).
    UnsupportedOperation {
        /// Name of the event-list strategy.
        strategy: &'static str,
        /// Name of the refused operation.
        operation: &'static str,
    },
    /// An anchor or cancellation target is not in the event list.
    NoteNotFound {
        /// The missing note.
        note: NoteId,
    },
    /// An event note was given more associated entities than it holds.
    TooManyEntities {
        /// Number of entities supplied.
        given: usize,
    },
    /// The referenced process is not registered in this run.
    UnknownProcess {
        /// The missing process.
        process: ProcessId,
    },
    /// The referenced event routine is not registered in this run.
    UnknownEvent {
        /// The missing event routine.
        event: EventId,
    },
    /// An interruption escaped every suspension point of a process body.
    UnhandledInterrupt {
        /// Name of the interrupted process.
        process: String,
        /// The code it was interrupted with.
        code: InterruptCode,
        /// Simulated time at which the interruption escaped.
        at: TimeInstant,
    },
    /// A process body failed with an error the kernel does not know.
    ProcessFailed {
        /// Name of the failing process.
        process: String,
        /// Description of the failing body.
        body: String,
        /// Simulated time of the failure.
        at: TimeInstant,
        /// The underlying error, rendered.
        reason: String,
    },
    /// A continuation-backed strand returned `Pending` outside a kernel
    /// suspension point and can never be resumed.
    InvalidSuspension {
        /// Name of the stalled strand.
        strand: String,
    },
    /// A strand's worker could not be spawned or died unexpectedly.
    StrandFailed {
        /// Name of the failing strand.
        strand: String,
        /// Description of the failure.
        reason: String,
    },
    /// Time arithmetic failed while computing a schedule.
    Time(TimeError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchedulingOrder { requested, now } => write!(
                f,
                "cannot schedule at {requested} when the clock is at {now}"
            ),
            Self::AlreadyScheduled { process, due } => write!(
                f,
                "process '{process}' is already scheduled for {due}"
            ),
            Self::UnsupportedOperation {
                strategy,
                operation,
            } => write!(f, "{strategy} event list does not support {operation}"),
            Self::NoteNotFound { note } => write!(f, "event note {note} is not scheduled"),
            Self::TooManyEntities { given } => {
                write!(f, "an event note holds at most three entities, got {given}")
            }
            Self::UnknownProcess { process } => write!(f, "process {process} not found"),
            Self::UnknownEvent { event } => write!(f, "event routine {event} not found"),
            Self::UnhandledInterrupt { process, code, at } => write!(
                f,
                "process '{process}' did not handle interrupt {code} at {at}"
            ),
            Self::ProcessFailed {
                process,
                body,
                at,
                reason,
            } => write!(f, "process '{process}' ({body}) failed at {at}: {reason}"),
            Self::InvalidSuspension { strand } => write!(
                f,
                "strand '{strand}' suspended outside hold/passivate/wait"
            ),
            Self::StrandFailed { strand, reason } => {
                write!(f, "strand '{strand}' failed: {reason}")
            }
            Self::Time(e) => write!(f, "time: {e}"),
        }
    }
}

impl Error for KernelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Time(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TimeError> for KernelError {
    fn from(e: TimeError) -> Self {
        Self::Time(e)
    }
}

// ── BodyError ───────────────────────────────────────────────────────

/// Outcome of a failed process body or event routine.
///
/// Suspension points return `Err(BodyError::Interrupted(..))` when the
/// process was interrupted while suspended, and
/// `Err(BodyError::Teardown)` when the run ends while it is parked.
/// Bodies are expected to handle interruptions locally; propagating one
/// with `?` aborts the run.
#[derive(Debug)]
pub enum BodyError {
    /// The run is tearing down; the strand must retire.
    Teardown,
    /// The process was interrupted while suspended.
    Interrupted(InterruptCode),
    /// A kernel operation failed.
    Kernel(KernelError),
    /// Any other failure raised by model code.
    Failed(Box<dyn Error + Send + Sync>),
}

impl BodyError {
    /// Wrap an arbitrary model failure.
    pub fn failed(e: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Failed(e.into())
    }

    /// The interrupt code, if this is an interruption.
    pub fn interrupt_code(&self) -> Option<&InterruptCode> {
        match self {
            Self::Interrupted(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Teardown => write!(f, "run is tearing down"),
            Self::Interrupted(code) => write!(f, "interrupted: {code}"),
            Self::Kernel(e) => write!(f, "kernel: {e}"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

impl Error for BodyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Kernel(e) => Some(e),
            Self::Failed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<KernelError> for BodyError {
    fn from(e: KernelError) -> Self {
        Self::Kernel(e)
    }
}

impl From<TimeError> for BodyError {
    fn from(e: TimeError) -> Self {
        Self::Kernel(KernelError::Time(e))
    }
}

// ── QueueWarning ────────────────────────────────────────────────────

/// Recoverable misuse of a wait list. The operation was a no-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueWarning {
    /// The entity is already waiting in this list.
    AlreadyQueued {
        /// The duplicate entity.
        entity: EntityId,
        /// Name of the wait list.
        queue: String,
    },
    /// The entity is not waiting in this list.
    NotQueued {
        /// The missing entity.
        entity: EntityId,
        /// Name of the wait list.
        queue: String,
    },
    /// A positional access was out of range.
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Length of the list at the time.
        len: usize,
    },
    /// The list is empty.
    Empty {
        /// Name of the wait list.
        queue: String,
    },
}

impl fmt::Display for QueueWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyQueued { entity, queue } => {
                write!(f, "entity {entity} is already enqueued in '{queue}'")
            }
            Self::NotQueued { entity, queue } => {
                write!(f, "entity {entity} is not enqueued in '{queue}'")
            }
            Self::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::Empty { queue } => write!(f, "queue '{queue}' is empty"),
        }
    }
}

impl Error for QueueWarning {}
