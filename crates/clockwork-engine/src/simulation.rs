//! The scheduler loop and the public handle on one run.
//!
//! [`Simulation`] owns the kernel, the strand factory and every live
//! strand. Each [`step`](Simulation::step) removes the first note,
//! advances the clock, dispatches the note's target, and re-checks the
//! condition waiters. User code, clock observers included, runs with the
//! kernel lock released.

use std::fmt;
use std::sync::Arc;

use clockwork_core::{
    BodyError, Condition, EntityId, EventId, InterruptCode, KernelError, NoteId, ProcessId,
    RunCounters, TimeInstant, TimeSpan,
};
use clockwork_events::{BucketedEventList, EventList, EventNote, LinkedEventList, Schedulable};
use clockwork_queue::QueueDirectory;
use clockwork_strand::{
    CleanupReport, ContinuationStrandFactory, Strand, StrandBackend, StrandEvent, StrandFactory,
    ThreadStrandFactory,
};
use indexmap::IndexMap;

use crate::clock::{ClockObserver, ObserverId};
use crate::config::{ConfigError, EventListKind, SimulationConfig};
use crate::event::{EventContext, EventRoutine};
use crate::kernel::{Actor, Kernel};
use crate::process::{strand_program, ProcessBody};

// ── Reports ────────────────────────────────────────────────────────

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The event list ran empty.
    Exhausted,
    /// A stop note was dispatched.
    StopNote,
    /// A stop condition held after a dispatch.
    Condition,
    /// [`Simulation::run_until`] reached its horizon.
    Horizon(TimeInstant),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "event list exhausted"),
            Self::StopNote => write!(f, "stop note dispatched"),
            Self::Condition => write!(f, "stop condition met"),
            Self::Horizon(t) => write!(f, "horizon {t} reached"),
        }
    }
}

/// Summary of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Clock value when the run ended.
    pub final_time: TimeInstant,
    /// Notes dispatched over the whole run.
    pub dispatched: u64,
    /// Processes whose strand ran to completion.
    pub terminated: u64,
    /// Why the run ended.
    pub stop_reason: StopReason,
    /// What the strand factory reclaimed at the end.
    pub cleanup: CleanupReport,
}

/// Snapshot of one process's kernel record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessStatus {
    /// Unique name, e.g. `"Clerk#2"`.
    pub name: String,
    /// Scheduling priority.
    pub priority: i32,
    /// Whether the life cycle repeats.
    pub repeating: bool,
    /// Whether the body has been entered at least once.
    pub started: bool,
    /// Whether the body is inside a life cycle pass.
    pub running: bool,
    /// Whether the process has finished for good.
    pub terminated: bool,
    /// Whether an activation is pending.
    pub scheduled: bool,
    /// The last interrupt received, until cleared.
    pub interrupt_code: Option<InterruptCode>,
}

/// A predicate over the current time that ends the run once it holds.
///
/// Usually a closure over shared model state; the time argument is the
/// clock value after the dispatch that was just completed.
pub type StopCondition = Box<dyn Condition<TimeInstant> + Send>;

// ── Simulation ─────────────────────────────────────────────────────

/// One simulation run.
///
/// Dropping the simulation cleans up every surviving strand.
pub struct Simulation {
    kernel: Arc<Kernel>,
    factory: Box<dyn StrandFactory>,
    strands: IndexMap<ProcessId, Box<dyn Strand>>,
    stop_conditions: Vec<StopCondition>,
    dispatched: u64,
    terminated: u64,
    stop_reason: StopReason,
    finished: bool,
}

impl Simulation {
    /// Build a run from a validated configuration.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let events: Box<dyn EventList> = match config.event_list {
            EventListKind::Linked => Box::new(LinkedEventList::new()),
            EventListKind::RandomizingLinked { seed } => {
                Box::new(LinkedEventList::randomizing(seed))
            }
            EventListKind::Bucketed { bucket_width } => {
                Box::new(BucketedEventList::new(bucket_width))
            }
        };
        let factory: Box<dyn StrandFactory> = match config.backend {
            StrandBackend::Threads => Box::new(ThreadStrandFactory::new(config.thread.clone())),
            StrandBackend::Continuations => Box::new(ContinuationStrandFactory::new()),
        };
        let kernel = Arc::new(Kernel::new(
            &config.name,
            events,
            config.init_time,
            config.trace,
        ));
        if let Some(stop) = config.stop_time {
            // Validated: stop is not before init.
            let _ = kernel.stop_at(stop);
        }
        tracing::info!(
            name = %config.name,
            event_list = %config.event_list,
            backend = %config.backend,
            init = %config.init_time,
            "simulation created"
        );
        Ok(Self {
            kernel,
            factory,
            strands: IndexMap::new(),
            stop_conditions: Vec::new(),
            dispatched: 0,
            terminated: 0,
            stop_reason: StopReason::Exhausted,
            finished: false,
        })
    }

    /// Name of the model.
    pub fn name(&self) -> &str {
        self.kernel.name()
    }

    /// The strand backend serving this run.
    pub fn backend(&self) -> StrandBackend {
        self.factory.backend()
    }

    /// Current simulated time.
    pub fn now(&self) -> TimeInstant {
        self.kernel.now()
    }

    // ── Model set-up ───────────────────────────────────────────────

    /// Register a new, unstarted process. Its body first runs on its
    /// first activation.
    pub fn spawn<B: ProcessBody>(&self, name: &str, body: B) -> ProcessId {
        self.kernel.spawn(name, Box::new(body))
    }

    /// Register an event routine.
    pub fn register_event<R: EventRoutine + 'static>(&self, name: &str, routine: R) -> EventId {
        self.kernel.register_event(name, Box::new(routine))
    }

    /// Activate `pid` after `span`.
    pub fn activate(&self, pid: ProcessId, span: TimeSpan) -> Result<(), KernelError> {
        let when = self.now().checked_add(span)?;
        self.kernel.activate(Actor::External, pid, when)
    }

    /// Activate `pid` at `when`.
    pub fn activate_at(&self, pid: ProcessId, when: TimeInstant) -> Result<(), KernelError> {
        self.kernel.activate(Actor::External, pid, when)
    }

    /// Interrupt `pid` from outside the run.
    pub fn interrupt(&self, pid: ProcessId, code: InterruptCode) -> Result<(), KernelError> {
        self.kernel.interrupt(Actor::External, pid, code)
    }

    /// Arm an interrupt of `pid` that fires after `span`. `None`, with a
    /// warning, if one is already armed.
    pub fn interrupt_delayed(
        &self,
        pid: ProcessId,
        span: TimeSpan,
    ) -> Result<Option<InterruptCode>, KernelError> {
        let when = self.now().checked_add(span)?;
        self.kernel.interrupt_delayed(Actor::External, pid, when)
    }

    /// Disarm `pid`'s delayed interrupt. `false` if none was armed.
    pub fn cancel_interrupt_delayed(&self, pid: ProcessId) -> Result<bool, KernelError> {
        self.kernel.cancel_interrupt_delayed(Actor::External, pid)
    }

    /// Schedule event routine `event` after `span`, with up to three
    /// associated entities.
    pub fn schedule_event(
        &self,
        event: EventId,
        entities: &[EntityId],
        span: TimeSpan,
    ) -> Result<NoteId, KernelError> {
        let when = self.now().checked_add(span)?;
        self.kernel
            .schedule_event(Actor::External, event, entities, when)
    }

    /// Schedule an external event, one with no associated entities, at `at`.
    pub fn schedule_external(&self, event: EventId, at: TimeInstant) -> Result<NoteId, KernelError> {
        self.kernel.schedule_event(Actor::External, event, &[], at)
    }

    /// End the run at `at`, after every other note due then.
    pub fn stop_at(&self, at: TimeInstant) -> Result<NoteId, KernelError> {
        self.kernel.stop_at(at)
    }

    /// Remove any pending note. `false` if it was not scheduled.
    pub fn cancel_note(&self, note: NoteId) -> bool {
        self.kernel.cancel_note(note)
    }

    /// Stop the run after the first dispatch that leaves `condition`
    /// holding.
    ///
    /// Conditions accumulate and any one of them ends the run. A model
    /// whose conditions never hold runs until its notes are exhausted,
    /// so pairing one with [`stop_at`](Self::stop_at) is advisable.
    pub fn stop_when<C>(&mut self, condition: C)
    where
        C: Condition<TimeInstant> + Send + 'static,
    {
        self.stop_conditions.push(Box::new(condition));
    }

    /// Number of registered stop conditions.
    pub fn stop_condition_count(&self) -> usize {
        self.stop_conditions.len()
    }

    /// Remove every stop condition.
    pub fn clear_stop_conditions(&mut self) {
        self.stop_conditions.clear();
    }

    /// A fresh interrupt code with a run-unique serial.
    pub fn new_interrupt_code(&self, name: &str) -> InterruptCode {
        self.kernel.new_interrupt_code(name)
    }

    /// Register an observer called with the outgoing time before every
    /// clock advance.
    pub fn clock_subscribe(&self, observer: ClockObserver) -> ObserverId {
        self.kernel.lock().clock.subscribe(observer)
    }

    /// Remove a clock observer.
    pub fn clock_unsubscribe(&self, id: ObserverId) -> bool {
        self.kernel.lock().clock.unsubscribe(id)
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Whether the event list shuffles notes due at the same time and
    /// priority.
    pub fn event_list_is_randomizing(&self) -> bool {
        self.kernel.lock().events.is_randomizing_concurrent_events()
    }

    /// The run's queue directory.
    pub fn directory(&self) -> Arc<QueueDirectory> {
        Arc::clone(self.kernel.directory())
    }

    /// The run's id counters.
    pub fn counters(&self) -> Arc<RunCounters> {
        Arc::clone(self.kernel.counters())
    }

    /// Number of pending notes.
    pub fn pending(&self) -> usize {
        self.kernel.lock().events.len()
    }

    /// Pending notes referencing `entity`.
    pub fn pending_notes(&self, entity: EntityId) -> Vec<NoteId> {
        self.kernel.pending_notes(entity)
    }

    /// Pending notes of event routine `event`.
    pub fn pending_event_notes(&self, event: EventId) -> Vec<NoteId> {
        self.kernel.pending_event_notes(event)
    }

    /// Snapshot of `pid`'s record, or `None` for an unknown process.
    pub fn process_status(&self, pid: ProcessId) -> Option<ProcessStatus> {
        let st = self.kernel.lock();
        st.processes.get(&pid).map(|r| ProcessStatus {
            name: r.name.clone(),
            priority: r.priority,
            repeating: r.repeating,
            started: r.started,
            running: r.running,
            terminated: r.terminated,
            scheduled: r.note.is_some(),
            interrupt_code: r.interrupt_code.clone(),
        })
    }

    /// The error that aborted the run, if any.
    pub fn abort_error(&self) -> Option<KernelError> {
        self.kernel.aborted()
    }

    // ── Running ────────────────────────────────────────────────────

    /// Dispatch the next note.
    ///
    /// Returns `Ok(false)` once the run has stopped or the event list is
    /// empty, and the abort error once the run has been aborted.
    pub fn step(&mut self) -> Result<bool, KernelError> {
        if let Some(e) = self.kernel.aborted() {
            return Err(e);
        }
        let notice = {
            let mut st = self.kernel.lock();
            if st.stopped {
                return Ok(false);
            }
            let Some(upcoming) = st.events.first_note().map(|n| n.time()) else {
                self.stop_reason = StopReason::Exhausted;
                return Ok(false);
            };
            st.clock.announce(upcoming)
        };
        if let Some(notice) = notice {
            notice.deliver();
        }
        let note = {
            let mut st = self.kernel.lock();
            // An observer may have cancelled the note it was told about.
            let Some(note) = st.events.remove_first() else {
                self.stop_reason = StopReason::Exhausted;
                return Ok(false);
            };
            st.clock.set_time(note.time())?;
            note
        };
        self.dispatched += 1;
        tracing::trace!(%note, "dispatching");

        match note.target() {
            Schedulable::Process(pid) => self.dispatch_process(pid, note.id()),
            Schedulable::Event(eid) => self.dispatch_event(eid, &note),
            Schedulable::DelayedInterrupt(pid) => {
                if let Err(e) = self.kernel.fire_delayed_interrupt(pid, note.id()) {
                    self.kernel.abort(e);
                }
            }
            Schedulable::Stop => {
                self.kernel.lock().stopped = true;
                self.stop_reason = StopReason::StopNote;
                tracing::info!(time = %note.time(), "stop note dispatched");
            }
        }
        self.wake_waiters();
        self.check_stop_conditions();

        match self.kernel.aborted() {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }

    /// Run until the event list is exhausted or a stop note is reached,
    /// then clean up.
    pub fn run(&mut self) -> Result<RunReport, KernelError> {
        tracing::info!(name = %self.name(), start = %self.now(), "run started");
        loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.finish();
                    return Err(e);
                }
            }
        }
        let cleanup = self.finish();
        let report = self.report(cleanup);
        tracing::info!(
            final_time = %report.final_time,
            dispatched = report.dispatched,
            terminated = report.terminated,
            "run finished: {}",
            report.stop_reason
        );
        Ok(report)
    }

    /// Dispatch every note due at or before `horizon`, then advance the
    /// clock to `horizon`. Does not clean up, so the run can continue.
    pub fn run_until(&mut self, horizon: TimeInstant) -> Result<RunReport, KernelError> {
        loop {
            let due = {
                let mut st = self.kernel.lock();
                if st.stopped {
                    break;
                }
                st.events
                    .first_note()
                    .is_some_and(|n| !horizon.is_before(n.time()))
            };
            if !due {
                break;
            }
            if let Err(e) = self.step() {
                self.finish();
                return Err(e);
            }
        }
        let notice = {
            let mut st = self.kernel.lock();
            if st.stopped {
                None
            } else {
                st.clock.announce(horizon)
            }
        };
        if let Some(notice) = notice {
            notice.deliver();
        }
        let stopped = {
            let mut st = self.kernel.lock();
            if !st.stopped && !horizon.is_before(st.now()) {
                st.clock.set_time(horizon)?;
            }
            st.stopped
        };
        if !stopped {
            self.stop_reason = StopReason::Horizon(horizon);
        }
        Ok(self.report(CleanupReport::default()))
    }

    /// Retire every surviving strand. Idempotent; also called on drop.
    pub fn finish(&mut self) -> CleanupReport {
        if self.finished {
            return CleanupReport::default();
        }
        self.finished = true;
        let report = self.factory.clean_up();
        self.strands.clear();
        let mut st = self.kernel.lock();
        st.unstarted.clear();
        st.waiters.clear();
        tracing::debug!(
            torn_down = report.torn_down,
            discarded = report.discarded,
            failed = report.failed,
            "strands cleaned up"
        );
        report
    }

    fn report(&self, cleanup: CleanupReport) -> RunReport {
        RunReport {
            final_time: self.now(),
            dispatched: self.dispatched,
            terminated: self.terminated,
            stop_reason: self.stop_reason,
            cleanup,
        }
    }

    // ── Dispatch ───────────────────────────────────────────────────

    fn dispatch_process(&mut self, pid: ProcessId, note: NoteId) {
        let (name, fresh) = {
            let mut st = self.kernel.lock();
            let Some(rec) = st.processes.get_mut(&pid) else {
                st.controller
                    .abort(KernelError::UnknownProcess { process: pid });
                return;
            };
            if rec.note == Some(note) {
                rec.note = None;
            }
            if rec.terminated {
                tracing::warn!(
                    target: "clockwork::warning",
                    "activation of terminated process {} skipped",
                    rec.quoted()
                );
                return;
            }
            rec.started = true;
            rec.running = true;
            let name: Arc<str> = Arc::from(rec.name.as_str());
            let fresh = if self.strands.contains_key(&pid) {
                None
            } else {
                st.unstarted.swap_remove(&pid)
            };
            (name, fresh)
        };

        if let Some(body) = fresh {
            let program = strand_program(Arc::clone(&self.kernel), pid, Arc::clone(&name), body);
            match self.factory.create_for_process(pid, &name, program) {
                Ok(strand) => {
                    self.strands.insert(pid, strand);
                }
                Err(e) => {
                    self.kernel.abort(e);
                    return;
                }
            }
        }
        let Some(strand) = self.strands.get_mut(&pid) else {
            return;
        };
        match strand.resume() {
            Ok(StrandEvent::Parked) => {}
            Ok(StrandEvent::Terminated) => {
                self.strands.swap_remove(&pid);
                self.terminated += 1;
            }
            Err(e) => {
                self.strands.swap_remove(&pid);
                let _ = self.kernel.with_record(pid, |r| {
                    r.running = false;
                    r.terminated = true;
                });
                self.kernel.abort(e);
            }
        }
    }

    fn dispatch_event(&mut self, eid: EventId, note: &EventNote) {
        let (routine, name) = {
            let mut st = self.kernel.lock();
            let Some(record) = st.routines.get_mut(&eid) else {
                st.controller
                    .abort(KernelError::UnknownEvent { event: eid });
                return;
            };
            (record.routine.take(), record.name.clone())
        };
        let Some(mut routine) = routine else {
            return;
        };
        let mut ctx = EventContext::new(
            Arc::clone(&self.kernel),
            eid,
            name.clone(),
            note.id(),
            note.entities().to_vec(),
        );
        let outcome = routine.run(&mut ctx);
        if let Some(record) = self.kernel.lock().routines.get_mut(&eid) {
            record.routine = Some(routine);
        }
        let at = self.now();
        match outcome {
            Ok(()) | Err(BodyError::Teardown) => {}
            Err(BodyError::Interrupted(code)) => {
                self.kernel.abort(KernelError::UnhandledInterrupt {
                    process: name,
                    code,
                    at,
                })
            }
            Err(BodyError::Kernel(e)) => self.kernel.abort(e),
            Err(BodyError::Failed(e)) => self.kernel.abort(KernelError::ProcessFailed {
                process: name,
                body: "event routine".to_string(),
                at,
                reason: e.to_string(),
            }),
        }
    }

    /// Stop the run if any stop condition holds now.
    fn check_stop_conditions(&mut self) {
        if self.stop_conditions.is_empty() || self.kernel.lock().stopped {
            return;
        }
        let now = self.now();
        if self.stop_conditions.iter().any(|c| c.check(&now)) {
            self.kernel.lock().stopped = true;
            self.stop_reason = StopReason::Condition;
            tracing::info!(time = %now, "stop condition met");
        }
    }

    /// Wake every waiter whose condition holds now, in registration order.
    fn wake_waiters(&mut self) {
        let (now, waiting) = {
            let st = self.kernel.lock();
            if st.waiters.is_empty() {
                return;
            }
            let waiting: Vec<_> = st
                .waiters
                .iter()
                .map(|w| (w.process, Arc::clone(&w.condition)))
                .collect();
            (st.now(), waiting)
        };
        let satisfied: Vec<ProcessId> = waiting
            .into_iter()
            .filter(|(_, condition)| condition.check(&now))
            .map(|(pid, _)| pid)
            .collect();
        if satisfied.is_empty() {
            return;
        }
        let mut st = self.kernel.lock();
        for pid in satisfied {
            if let Err(e) = st.satisfy_waiter(self.kernel.counters(), pid) {
                st.controller.abort(e);
            }
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("name", &self.name())
            .field("backend", &self.backend())
            .field("live_strands", &self.strands.len())
            .field("stop_conditions", &self.stop_conditions.len())
            .field("dispatched", &self.dispatched)
            .finish()
    }
}
