//! Wait lists for entities contending for a shared resource.
//!
//! A [`QueueList`] keeps entities ordered by descending priority and
//! lets its [`Discipline`] break ties: first-in-first-out, last-in-
//! first-out, or a uniformly random slot that ignores priority. Every
//! successful insert or removal notifies the list's [`QueueStatistics`]
//! collaborator and updates the run-wide [`QueueDirectory`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod directory;
pub mod discipline;
pub mod list;
pub mod stats;

pub use directory::QueueDirectory;
pub use discipline::Discipline;
pub use list::{QueueEntry, QueueList};
pub use stats::{NoStatistics, OccupancyStats, QueueStatistics};
