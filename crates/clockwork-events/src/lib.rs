//! Event notes and the event-list strategies that order them.
//!
//! The event list is the authoritative answer to "what happens next".
//! Every strategy implements the [`EventList`] contract and keeps the
//! shared [`PendingIndex`] in sync on every insert and removal, so a
//! note can be cancelled through any entity or event it references.
//!
//! Two strategies are provided:
//!
//! - [`LinkedEventList`]: a doubly linked list with anchor-relative
//!   insertion and traversal. [`LinkedEventList::randomizing`] shuffles
//!   notes that share time and priority.
//! - [`BucketedEventList`]: time buckets with a binary heap for the
//!   earliest one. Refuses anchor operations and traversal.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bucketed;
pub mod linked;
pub mod list;
pub mod note;

pub use bucketed::BucketedEventList;
pub use linked::LinkedEventList;
pub use list::{EventList, PendingIndex};
pub use note::{EventNote, Schedulable, MAX_ENTITIES};
