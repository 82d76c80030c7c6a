//! Simulation configuration, validation, and error types.
//!
//! [`SimulationConfig`] is the input for constructing a
//! [`Simulation`](crate::simulation::Simulation). It selects the event
//! list strategy and the strand backend once for the whole run;
//! [`validate()`](SimulationConfig::validate) checks structural
//! invariants at startup.

use std::error::Error;
use std::fmt;

use clockwork_core::{Epsilon, TimeInstant, TimeSpan};

pub use clockwork_strand::{StrandBackend, ThreadConfig};

// ── EventListKind ──────────────────────────────────────────────────

/// Which event list strategy orders the run's notes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventListKind {
    /// Doubly linked list with anchor insertion; same (time, priority)
    /// notes are dispatched in insertion order.
    #[default]
    Linked,
    /// Linked list that shuffles notes sharing (time, priority).
    RandomizingLinked {
        /// Seed of the shuffle.
        seed: u64,
    },
    /// Time buckets with a heap for the earliest one. No anchor
    /// insertion, no traversal.
    Bucketed {
        /// Width of one bucket. Must not be zero.
        bucket_width: TimeSpan,
    },
}

impl fmt::Display for EventListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linked => write!(f, "linked"),
            Self::RandomizingLinked { seed } => write!(f, "randomizing linked (seed {seed})"),
            Self::Bucketed { bucket_width } => write!(f, "bucketed ({bucket_width} buckets)"),
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`SimulationConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The simulation name is empty.
    EmptyName,
    /// The bucketed strategy was configured with zero-width buckets.
    ZeroBucketWidth,
    /// The stop time lies before the initial time.
    StopBeforeStart {
        /// Configured initial time.
        init: TimeInstant,
        /// Configured stop time.
        stop: TimeInstant,
    },
    /// The thread backend was given a zero stack size.
    ZeroStackSize,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "simulation name must not be empty"),
            Self::ZeroBucketWidth => write!(f, "bucket_width must be at least one epsilon"),
            Self::StopBeforeStart { init, stop } => {
                write!(f, "stop time {stop} lies before initial time {init}")
            }
            Self::ZeroStackSize => write!(f, "thread stack_size must not be zero"),
        }
    }
}

impl Error for ConfigError {}

// ── SimulationConfig ───────────────────────────────────────────────

/// Complete configuration of one simulation run.
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    /// Name of the model, used as the clock name and the owner of every
    /// process.
    pub name: String,
    /// Event list strategy. Default: [`EventListKind::Linked`].
    pub event_list: EventListKind,
    /// Strand backend, fixed for the whole run. Default: threads.
    pub backend: StrandBackend,
    /// Clock value at run start. May be negative.
    pub init_time: TimeInstant,
    /// Schedule a stop note at this instant.
    pub stop_time: Option<TimeInstant>,
    /// Grid resolution used to convert real-valued spans.
    pub epsilon: Epsilon,
    /// Default trace flag of newly spawned processes.
    pub trace: bool,
    /// Settings for the thread backend.
    pub thread: ThreadConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: "model".into(),
            event_list: EventListKind::default(),
            backend: StrandBackend::default(),
            init_time: TimeInstant::ZERO,
            stop_time: None,
            epsilon: Epsilon::default(),
            trace: false,
            thread: ThreadConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Default configuration with the given name and backend.
    pub fn named(name: impl Into<String>, backend: StrandBackend) -> Self {
        Self {
            name: name.into(),
            backend,
            ..Self::default()
        }
    }

    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if let EventListKind::Bucketed { bucket_width } = self.event_list {
            if bucket_width.is_zero() {
                return Err(ConfigError::ZeroBucketWidth);
            }
        }
        if let Some(stop) = self.stop_time {
            if stop.is_before(self.init_time) {
                return Err(ConfigError::StopBeforeStart {
                    init: self.init_time,
                    stop,
                });
            }
        }
        if self.backend == StrandBackend::Threads && self.thread.stack_size == Some(0) {
            return Err(ConfigError::ZeroStackSize);
        }
        Ok(())
    }
}
