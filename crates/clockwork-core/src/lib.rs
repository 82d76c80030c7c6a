//! Core types and traits for the Clockwork simulation kernel.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Clockwork workspace:
//! the epsilon time grid, strongly-typed identifiers with their
//! run-scoped counters, interrupt codes, the error taxonomy, and the
//! capability traits that replace a deep entity hierarchy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod condition;
pub mod error;
pub mod id;
pub mod interrupt;
pub mod rng;
pub mod time;
pub mod traits;

pub use condition::Condition;
pub use error::{BodyError, KernelError, QueueWarning, TimeError};
pub use id::{EntityId, EventId, NoteId, ProcessId, QueueId, RunCounters};
pub use interrupt::InterruptCode;
pub use rng::SeededRng;
pub use time::{Epsilon, TimeInstant, TimeSpan};
pub use traits::{Identified, Named, Owned, Prioritized, Traced};
