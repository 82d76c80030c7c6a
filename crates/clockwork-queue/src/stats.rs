//! Queue statistics collaborators.
//!
//! The wait list only reports what happened; aggregation lives here.

use clockwork_core::{TimeInstant, TimeSpan};

/// Receives a notification for every successful insert and removal.
pub trait QueueStatistics: Send {
    /// An entity entered the queue; `len` is the length afterwards.
    fn on_insert(&mut self, now: TimeInstant, len: usize);

    /// An entity that entered at `entered` left; `len` is the length
    /// afterwards.
    fn on_remove(&mut self, entered: TimeInstant, now: TimeInstant, len: usize);

    /// Restart aggregation at `now`, keeping the current length.
    fn reset(&mut self, _now: TimeInstant) {}
}

/// Discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStatistics;

impl QueueStatistics for NoStatistics {
    fn on_insert(&mut self, _now: TimeInstant, _len: usize) {}

    fn on_remove(&mut self, _entered: TimeInstant, _now: TimeInstant, _len: usize) {}
}

/// Occupancy and waiting-time aggregates.
///
/// Keeps the time-weighted length integral, the maximum length, and
/// total, maximum and zero-length waits since the last reset.
#[derive(Clone, Debug, Default)]
pub struct OccupancyStats {
    reset_at: TimeInstant,
    last_change: TimeInstant,
    len: usize,
    max_len: usize,
    len_integral: i128,
    insertions: u64,
    removals: u64,
    zero_waits: u64,
    total_wait: i128,
    max_wait: TimeSpan,
}

impl OccupancyStats {
    /// Aggregates starting at `now`.
    pub fn starting_at(now: TimeInstant) -> Self {
        Self {
            reset_at: now,
            last_change: now,
            ..Self::default()
        }
    }

    fn integrate(&mut self, now: TimeInstant) {
        let dt = i128::from(now.epsilons()) - i128::from(self.last_change.epsilons());
        if dt > 0 {
            self.len_integral += dt * self.len as i128;
            self.last_change = now;
        }
    }

    /// Length after the latest notification.
    pub fn current_length(&self) -> usize {
        self.len
    }

    /// Longest length observed since the last reset.
    pub fn max_length(&self) -> usize {
        self.max_len
    }

    /// Successful inserts since the last reset.
    pub fn insertions(&self) -> u64 {
        self.insertions
    }

    /// Removals since the last reset.
    pub fn removals(&self) -> u64 {
        self.removals
    }

    /// Entities that left at the instant they arrived.
    pub fn zero_waits(&self) -> u64 {
        self.zero_waits
    }

    /// Longest wait observed.
    pub fn max_wait(&self) -> TimeSpan {
        self.max_wait
    }

    /// Time-averaged queue length over `[reset, now]`, in entities.
    ///
    /// Zero when no time has elapsed.
    pub fn average_length(&self, now: TimeInstant) -> f64 {
        let span = i128::from(now.epsilons()) - i128::from(self.reset_at.epsilons());
        if span <= 0 {
            return 0.0;
        }
        let pending =
            (i128::from(now.epsilons()) - i128::from(self.last_change.epsilons())).max(0);
        let integral = self.len_integral + pending * self.len as i128;
        integral as f64 / span as f64
    }

    /// Mean wait of removed entities, in epsilons. Zero with no removals.
    pub fn average_wait(&self) -> f64 {
        if self.removals == 0 {
            return 0.0;
        }
        self.total_wait as f64 / self.removals as f64
    }
}

impl QueueStatistics for OccupancyStats {
    fn on_insert(&mut self, now: TimeInstant, len: usize) {
        self.integrate(now);
        self.len = len;
        self.max_len = self.max_len.max(len);
        self.insertions += 1;
    }

    fn on_remove(&mut self, entered: TimeInstant, now: TimeInstant, len: usize) {
        self.integrate(now);
        self.len = len;
        self.removals += 1;
        let wait = now.span_since(entered).unwrap_or(TimeSpan::ZERO);
        if wait.is_zero() {
            self.zero_waits += 1;
        }
        self.total_wait += i128::from(wait.epsilons());
        self.max_wait = self.max_wait.max(wait);
    }

    fn reset(&mut self, now: TimeInstant) {
        let len = self.len;
        *self = Self::starting_at(now);
        self.len = len;
        self.max_len = len;
    }
}
