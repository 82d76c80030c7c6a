//! The simulation clock: the run's single mutable "now".
//!
//! Read by anyone, written only by the scheduler. Observers registered
//! with [`SimClock::subscribe`] are called synchronously, in
//! subscription order, exactly once per advance and with the time that
//! is about to end, so statistics can sample state as of that instant.
//!
//! The scheduler claims the notification with [`SimClock::announce`]
//! and delivers it with the kernel lock released; the following
//! [`SimClock::set_time`] then advances without calling observers again.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use clockwork_core::{KernelError, Named, TimeInstant};
use indexmap::IndexMap;

/// Callback invoked with the previous time before the clock advances.
///
/// Inside a run it is called with the kernel lock released, so it may
/// query the simulation through a process context.
pub type ClockObserver = Box<dyn FnMut(TimeInstant) + Send>;

type SharedObserver = Arc<Mutex<ClockObserver>>;

/// Observers owed a call before an advance, taken by [`SimClock::announce`].
#[must_use = "observers are only called by `deliver`"]
pub struct ClockNotice {
    from: TimeInstant,
    observers: Vec<SharedObserver>,
}

impl ClockNotice {
    /// The time that is about to end.
    pub fn from(&self) -> TimeInstant {
        self.from
    }

    /// Call every observer, in subscription order.
    pub fn deliver(self) {
        for observer in &self.observers {
            let mut observer = observer.lock().unwrap_or_else(PoisonError::into_inner);
            (*observer)(self.from);
        }
    }
}

impl fmt::Debug for ClockNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockNotice")
            .field("from", &self.from)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Handle returned by [`SimClock::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// What [`SimClock::set_time`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockAdvance {
    /// The requested time equals the current time.
    Unchanged,
    /// The clock moved forward.
    Advanced {
        /// Time before the advance.
        from: TimeInstant,
        /// Time after the advance.
        to: TimeInstant,
    },
}

/// The clock of one simulation run.
pub struct SimClock {
    name: String,
    now: TimeInstant,
    observers: IndexMap<ObserverId, SharedObserver>,
    next_observer: u64,
    /// Set once observers have been told that `now` is ending.
    announced: Option<TimeInstant>,
}

impl SimClock {
    /// A clock named `name` standing at `init`.
    pub fn new(name: impl Into<String>, init: TimeInstant) -> Self {
        Self {
            name: name.into(),
            now: init,
            observers: IndexMap::new(),
            next_observer: 0,
            announced: None,
        }
    }

    /// The current time.
    pub fn time(&self) -> TimeInstant {
        self.now
    }

    /// Advance the clock to `t`.
    ///
    /// An earlier `t` is a scheduling-order violation and leaves the
    /// clock unchanged. An equal `t` is a silent no-op. A later `t`
    /// notifies every observer with the current time, unless that was
    /// already [announced](Self::announce), then advances.
    pub fn set_time(&mut self, t: TimeInstant) -> Result<ClockAdvance, KernelError> {
        if t.is_before(self.now) {
            return Err(KernelError::SchedulingOrder {
                requested: t,
                now: self.now,
            });
        }
        if t == self.now {
            return Ok(ClockAdvance::Unchanged);
        }
        let from = self.now;
        if self.announced != Some(from) {
            self.snapshot(from).deliver();
        }
        self.announced = None;
        self.now = t;
        Ok(ClockAdvance::Advanced { from, to: t })
    }

    /// Claim the observer calls owed before advancing to `t`.
    ///
    /// `None` if `t` does not lie ahead or the current time was already
    /// announced. The caller delivers the notice, typically with its own
    /// locks released, and the next advance skips the observers.
    pub fn announce(&mut self, t: TimeInstant) -> Option<ClockNotice> {
        if !self.now.is_before(t) || self.announced == Some(self.now) {
            return None;
        }
        self.announced = Some(self.now);
        Some(self.snapshot(self.now))
    }

    fn snapshot(&self, from: TimeInstant) -> ClockNotice {
        ClockNotice {
            from,
            observers: self.observers.values().cloned().collect(),
        }
    }

    /// Set the clock without ordering checks or notifications.
    ///
    /// Used once, at run start, to allow arbitrary starting epochs.
    pub fn set_init_time(&mut self, t: TimeInstant) {
        self.now = t;
        self.announced = None;
    }

    /// Register a pre-advance observer.
    pub fn subscribe(&mut self, observer: ClockObserver) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.insert(id, Arc::new(Mutex::new(observer)));
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.shift_remove(&id).is_some()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl Named for SimClock {
    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SimClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimClock")
            .field("name", &self.name)
            .field("now", &self.now)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn at(t: i64) -> TimeInstant {
        TimeInstant::from_epsilons(t)
    }

    fn recording(clock: &mut SimClock) -> Arc<Mutex<Vec<TimeInstant>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        clock.subscribe(Box::new(move |t| sink.lock().unwrap().push(t)));
        seen
    }

    #[test]
    fn earlier_time_is_refused_and_clock_unchanged() {
        let mut clock = SimClock::new("c", at(10));
        let seen = recording(&mut clock);
        let err = clock.set_time(at(9)).unwrap_err();
        assert_eq!(
            err,
            KernelError::SchedulingOrder {
                requested: at(9),
                now: at(10)
            }
        );
        assert_eq!(clock.time(), at(10));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn equal_time_is_a_silent_no_op() {
        let mut clock = SimClock::new("c", at(10));
        let seen = recording(&mut clock);
        assert_eq!(clock.set_time(at(10)), Ok(ClockAdvance::Unchanged));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn advance_notifies_once_with_previous_time() {
        let mut clock = SimClock::new("c", at(10));
        let seen = recording(&mut clock);
        assert_eq!(
            clock.set_time(at(15)),
            Ok(ClockAdvance::Advanced {
                from: at(10),
                to: at(15)
            })
        );
        assert_eq!(*seen.lock().unwrap(), vec![at(10)]);
        assert_eq!(clock.time(), at(15));
    }

    #[test]
    fn observers_run_in_subscription_order() {
        let mut clock = SimClock::new("c", TimeInstant::ZERO);
        let order = Arc::new(Mutex::new(Vec::new()));
        let ids: Vec<ObserverId> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                clock.subscribe(Box::new(move |_| order.lock().unwrap().push(i)))
            })
            .collect();
        assert!(clock.unsubscribe(ids[1]));
        assert!(!clock.unsubscribe(ids[1]));
        clock.set_time(at(1)).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 2]);
        assert_eq!(clock.observer_count(), 2);
    }

    #[test]
    fn announced_advance_does_not_notify_twice() {
        let mut clock = SimClock::new("c", at(4));
        let seen = recording(&mut clock);
        let notice = clock.announce(at(9)).unwrap();
        assert_eq!(notice.from(), at(4));
        assert!(seen.lock().unwrap().is_empty());
        assert!(clock.announce(at(9)).is_none());
        notice.deliver();
        assert_eq!(*seen.lock().unwrap(), vec![at(4)]);

        // The advance may land earlier than announced; still one call.
        clock.set_time(at(6)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![at(4)]);
        clock.set_time(at(8)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![at(4), at(6)]);
    }

    #[test]
    fn nothing_to_announce_without_an_advance() {
        let mut clock = SimClock::new("c", at(4));
        assert!(clock.announce(at(4)).is_none());
        assert!(clock.announce(at(3)).is_none());
    }

    #[test]
    fn init_time_bypasses_ordering() {
        let mut clock = SimClock::new("c", at(100));
        let seen = recording(&mut clock);
        clock.set_init_time(at(-50));
        assert_eq!(clock.time(), at(-50));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(clock.name(), "c");
    }
}
