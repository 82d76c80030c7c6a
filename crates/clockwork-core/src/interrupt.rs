//! Interrupt codes: the token delivered to an interrupted process.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::id::RunCounters;

/// Why a process was interrupted.
///
/// Constructed once with a fresh serial number drawn from the run's
/// [`RunCounters`]; [`Clone`] copies both name and serial, so a clone is
/// a distinct instance that compares equal to its source. Equality and
/// hashing use the serial number only. Immutable after construction.
#[derive(Clone, Debug)]
pub struct InterruptCode {
    name: Arc<str>,
    serial: u64,
}

impl InterruptCode {
    /// Create a code with a fresh serial number.
    pub fn new(counters: &RunCounters, name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            serial: counters.next_interrupt_serial(),
        }
    }

    /// The code's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The serial number that identifies this code.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Compare two possibly-absent codes.
    ///
    /// Returns `false` when either side is `None`.
    pub fn equals(a: Option<&InterruptCode>, b: Option<&InterruptCode>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.serial == b.serial,
            _ => false,
        }
    }
}

impl PartialEq for InterruptCode {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for InterruptCode {}

impl Hash for InterruptCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

impl fmt::Display for InterruptCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.serial)
    }
}
