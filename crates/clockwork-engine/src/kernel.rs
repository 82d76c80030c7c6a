//! Kernel state shared by the scheduler and every running body.
//!
//! All mutable run state lives in one [`KernelState`] behind one mutex.
//! Only the logically active party (the scheduler, or the one strand it
//! resumed) ever takes the lock, and never across a suspension point,
//! so with the thread backend the mutex doubles as the baton that
//! serialises real OS threads.
//!
//! The operations here are the shared core of the process context, the
//! event context and the simulation handle. Misuse that does not corrupt
//! state (activating a terminated process, cancelling an unscheduled
//! one) is logged under `clockwork::warning` and ignored; everything
//! else is returned as a [`KernelError`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use clockwork_core::{
    Condition, EntityId, EventId, InterruptCode, KernelError, NoteId, ProcessId, RunCounters,
    TimeInstant,
};
use clockwork_events::{EventList, EventNote, Schedulable};
use clockwork_queue::QueueDirectory;
use indexmap::IndexMap;

use crate::clock::SimClock;
use crate::event::EventRoutine;
use crate::process::ProcessBody;

/// Shared predicate a waiting process is parked on.
pub(crate) type WaitCondition = Arc<dyn Condition<TimeInstant> + Send + Sync>;

// ── Actor ──────────────────────────────────────────────────────────

/// Who is calling into the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Actor {
    /// A process body, from inside its strand.
    Process(ProcessId),
    /// An event routine.
    Event(EventId),
    /// Code outside the run (the simulation handle).
    External,
}

// ── Records ────────────────────────────────────────────────────────

/// Kernel-side bookkeeping of one process.
#[derive(Debug)]
pub(crate) struct ProcessRecord {
    pub(crate) name: String,
    pub(crate) priority: i32,
    pub(crate) repeating: bool,
    pub(crate) running: bool,
    pub(crate) started: bool,
    pub(crate) terminated: bool,
    pub(crate) trace: bool,
    /// The pending activation note, if scheduled.
    pub(crate) note: Option<NoteId>,
    pub(crate) interrupt_code: Option<InterruptCode>,
    /// Set by an interrupt, consumed by the next suspension point.
    pub(crate) interrupt_pending: bool,
    /// Set when a condition wait was satisfied.
    pub(crate) wait_satisfied: bool,
    /// The armed delayed interrupt: its note and the code it delivers.
    pub(crate) delayed_interrupt: Option<(NoteId, InterruptCode)>,
}

impl ProcessRecord {
    fn new(name: String, trace: bool, repeating: bool) -> Self {
        Self {
            name,
            priority: 0,
            repeating,
            running: false,
            started: false,
            terminated: false,
            trace,
            note: None,
            interrupt_code: None,
            interrupt_pending: false,
            wait_satisfied: false,
            delayed_interrupt: None,
        }
    }

    pub(crate) fn quoted(&self) -> String {
        format!("'{}'", self.name)
    }
}

/// A registered event routine.
pub(crate) struct RoutineRecord {
    pub(crate) name: String,
    pub(crate) trace: bool,
    /// Taken out while the routine runs.
    pub(crate) routine: Option<Box<dyn EventRoutine>>,
}

/// A process parked on a condition.
pub(crate) struct Waiter {
    pub(crate) process: ProcessId,
    pub(crate) condition: WaitCondition,
}

// ── RunController ──────────────────────────────────────────────────

/// Records the error that aborts the run.
///
/// The first error wins and is logged once; any later failure is logged
/// as a warning and dropped, however many strands fail.
#[derive(Debug, Default)]
pub(crate) struct RunController {
    error: Option<KernelError>,
    dropped: usize,
}

impl RunController {
    pub(crate) fn abort(&mut self, error: KernelError) {
        if self.error.is_none() {
            tracing::error!("simulation aborted: {error}");
            self.error = Some(error);
        } else {
            self.dropped += 1;
            tracing::warn!(
                target: "clockwork::warning",
                "failure after abort dropped: {error}"
            );
        }
    }

    pub(crate) fn error(&self) -> Option<&KernelError> {
        self.error.as_ref()
    }

    pub(crate) fn dropped(&self) -> usize {
        self.dropped
    }
}

// ── KernelState ────────────────────────────────────────────────────

/// Everything mutable about one run.
pub(crate) struct KernelState {
    pub(crate) clock: SimClock,
    pub(crate) events: Box<dyn EventList>,
    pub(crate) processes: IndexMap<ProcessId, ProcessRecord>,
    /// Bodies of spawned processes whose strand does not exist yet.
    pub(crate) unstarted: IndexMap<ProcessId, Box<dyn ProcessBody>>,
    pub(crate) routines: IndexMap<EventId, RoutineRecord>,
    pub(crate) waiters: Vec<Waiter>,
    pub(crate) controller: RunController,
    /// Per-name counters used to make process names unique.
    name_counts: IndexMap<String, u64>,
    default_trace: bool,
    pub(crate) stopped: bool,
}

impl KernelState {
    pub(crate) fn now(&self) -> TimeInstant {
        self.clock.time()
    }

    pub(crate) fn record(&self, pid: ProcessId) -> Result<&ProcessRecord, KernelError> {
        self.processes
            .get(&pid)
            .ok_or(KernelError::UnknownProcess { process: pid })
    }

    pub(crate) fn record_mut(&mut self, pid: ProcessId) -> Result<&mut ProcessRecord, KernelError> {
        self.processes
            .get_mut(&pid)
            .ok_or(KernelError::UnknownProcess { process: pid })
    }

    /// Emit a trace note on behalf of `actor`, if its trace flag is on.
    pub(crate) fn trace(&self, actor: Actor, note: impl FnOnce() -> String) {
        let subject = match actor {
            Actor::Process(pid) => self.processes.get(&pid).map(|r| (r.name.as_str(), r.trace)),
            Actor::Event(eid) => self.routines.get(&eid).map(|r| (r.name.as_str(), r.trace)),
            Actor::External => None,
        };
        if let Some((name, true)) = subject {
            tracing::debug!(
                target: "clockwork::trace",
                process = name,
                time = %self.clock.time(),
                "{}",
                note()
            );
        }
    }

    fn unique_name(&mut self, base: &str) -> String {
        let n = self.name_counts.entry(base.to_string()).or_insert(0);
        *n += 1;
        format!("{base}#{n}")
    }

    /// Schedule `pid`'s activation note at `time`.
    pub(crate) fn schedule_process_at(
        &mut self,
        counters: &RunCounters,
        pid: ProcessId,
        time: TimeInstant,
    ) -> Result<NoteId, KernelError> {
        let now = self.now();
        let priority = self.record(pid)?.priority;
        let note = EventNote::new(counters.next_note(), time, Schedulable::Process(pid))
            .with_priority(priority);
        let id = note.id();
        self.events.insert(note, now)?;
        self.record_mut(pid)?.note = Some(id);
        Ok(id)
    }

    /// Refuse a new wakeup for `pid` while its activation note is pending.
    pub(crate) fn ensure_unscheduled(&self, pid: ProcessId) -> Result<(), KernelError> {
        let rec = self.record(pid)?;
        match rec.note.and_then(|id| self.events.get(id)) {
            Some(note) => Err(KernelError::AlreadyScheduled {
                process: rec.name.clone(),
                due: note.time(),
            }),
            None => Ok(()),
        }
    }

    /// Schedule `pid` ahead of everything else due now.
    ///
    /// Strategies without anchor insertion get a maximum-priority note at
    /// the current time instead.
    pub(crate) fn schedule_process_first(
        &mut self,
        counters: &RunCounters,
        pid: ProcessId,
    ) -> Result<NoteId, KernelError> {
        let now = self.now();
        self.record(pid)?;
        let note = EventNote::new(counters.next_note(), now, Schedulable::Process(pid))
            .with_priority(i32::MAX);
        let id = note.id();
        match self.events.insert_as_first(note.clone(), now) {
            Ok(()) => {}
            Err(KernelError::UnsupportedOperation { .. }) => self.events.insert(note, now)?,
            Err(e) => return Err(e),
        }
        self.record_mut(pid)?.note = Some(id);
        Ok(id)
    }

    /// Remove `pid`'s pending activation note. `false` if none.
    pub(crate) fn unschedule(&mut self, pid: ProcessId) -> bool {
        let Some(note) = self.processes.get_mut(&pid).and_then(|r| r.note.take()) else {
            return false;
        };
        self.events.remove(note).is_some()
    }

    /// Wake a waiter whose condition now holds.
    pub(crate) fn satisfy_waiter(
        &mut self,
        counters: &RunCounters,
        pid: ProcessId,
    ) -> Result<(), KernelError> {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.process != pid);
        if self.waiters.len() == before {
            return Ok(());
        }
        // The losing timeout note, or any other pending activation.
        self.unschedule(pid);
        self.record_mut(pid)?.wait_satisfied = true;
        self.trace(Actor::Process(pid), || "condition satisfied".to_string());
        let now = self.now();
        self.schedule_process_at(counters, pid, now)?;
        Ok(())
    }
}

// ── Kernel ─────────────────────────────────────────────────────────

/// Shared handle on one run's state.
pub(crate) struct Kernel {
    name: Arc<str>,
    counters: Arc<RunCounters>,
    directory: Arc<QueueDirectory>,
    state: Mutex<KernelState>,
}

// Compile-time assertion: the kernel is shared with every strand.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Kernel>();
};

impl Kernel {
    pub(crate) fn new(
        name: &str,
        events: Box<dyn EventList>,
        init_time: TimeInstant,
        default_trace: bool,
    ) -> Self {
        Self {
            name: Arc::from(name),
            counters: Arc::new(RunCounters::new()),
            directory: Arc::new(QueueDirectory::new()),
            state: Mutex::new(KernelState {
                clock: SimClock::new(name, init_time),
                events,
                processes: IndexMap::new(),
                unstarted: IndexMap::new(),
                routines: IndexMap::new(),
                waiters: Vec::new(),
                controller: RunController::default(),
                name_counts: IndexMap::new(),
                default_trace,
                stopped: false,
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, KernelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn counters(&self) -> &Arc<RunCounters> {
        &self.counters
    }

    pub(crate) fn directory(&self) -> &Arc<QueueDirectory> {
        &self.directory
    }

    pub(crate) fn now(&self) -> TimeInstant {
        self.lock().now()
    }

    pub(crate) fn abort(&self, error: KernelError) {
        self.lock().controller.abort(error);
    }

    pub(crate) fn aborted(&self) -> Option<KernelError> {
        self.lock().controller.error().cloned()
    }

    // ── Registration ───────────────────────────────────────────────

    pub(crate) fn spawn(&self, name: &str, body: Box<dyn ProcessBody>) -> ProcessId {
        let pid = self.counters.next_process();
        let repeating = body.repeating();
        let mut st = self.lock();
        let unique = st.unique_name(name);
        let trace = st.default_trace;
        st.processes
            .insert(pid, ProcessRecord::new(unique, trace, repeating));
        st.unstarted.insert(pid, body);
        pid
    }

    pub(crate) fn register_event(&self, name: &str, routine: Box<dyn EventRoutine>) -> EventId {
        let eid = self.counters.next_event();
        let mut st = self.lock();
        let trace = st.default_trace;
        st.routines.insert(
            eid,
            RoutineRecord {
                name: name.to_string(),
                trace,
                routine: Some(routine),
            },
        );
        eid
    }

    pub(crate) fn new_interrupt_code(&self, name: &str) -> InterruptCode {
        InterruptCode::new(&self.counters, name)
    }

    // ── Scheduling ─────────────────────────────────────────────────

    /// Schedule `pid` at `when`. Ignored with a warning if it is
    /// terminated or already scheduled.
    pub(crate) fn activate(
        &self,
        actor: Actor,
        pid: ProcessId,
        when: TimeInstant,
    ) -> Result<(), KernelError> {
        let mut st = self.lock();
        let now = st.now();
        if when.is_before(now) {
            return Err(KernelError::SchedulingOrder {
                requested: when,
                now,
            });
        }
        if !Self::may_activate(&st, pid, "activate")? {
            return Ok(());
        }
        let target = st.record(pid)?.quoted();
        st.trace(actor, || format!("activates {target} at {when}"));
        st.schedule_process_at(&self.counters, pid, when)?;
        Ok(())
    }

    /// Schedule `pid` directly after (or before) `anchor`'s pending
    /// activation, at the anchor's time and priority.
    ///
    /// When the anchor is the calling process itself, which is running
    /// and therefore unscheduled, `pid` is scheduled first instead.
    pub(crate) fn activate_relative(
        &self,
        actor: Actor,
        pid: ProcessId,
        anchor: ProcessId,
        after: bool,
    ) -> Result<(), KernelError> {
        let operation = if after {
            "activate_after"
        } else {
            "activate_before"
        };
        let mut st = self.lock();
        if !Self::may_activate(&st, pid, operation)? {
            return Ok(());
        }
        let anchor_record = st.record(anchor)?;
        let anchor_name = anchor_record.quoted();
        let target = st.record(pid)?.quoted();
        let Some(anchor_note) = anchor_record.note else {
            if actor == Actor::Process(anchor) {
                st.trace(actor, || format!("activates {target} after itself"));
                st.schedule_process_first(&self.counters, pid)?;
            } else {
                tracing::warn!(
                    target: "clockwork::warning",
                    "{operation} ignored: anchor {anchor_name} is not scheduled"
                );
            }
            return Ok(());
        };
        let now = st.now();
        let priority = st.record(pid)?.priority;
        let note = EventNote::new(self.counters.next_note(), now, Schedulable::Process(pid))
            .with_priority(priority);
        let id = note.id();
        if after {
            st.events.insert_after(anchor_note, note)?;
        } else {
            st.events.insert_before(anchor_note, note)?;
        }
        st.record_mut(pid)?.note = Some(id);
        let relation = if after { "after" } else { "before" };
        st.trace(actor, || format!("activates {target} {relation} {anchor_name}"));
        Ok(())
    }

    /// Schedule `pid` ahead of everything else due now.
    pub(crate) fn activate_first(&self, actor: Actor, pid: ProcessId) -> Result<(), KernelError> {
        let mut st = self.lock();
        if !Self::may_activate(&st, pid, "activate_first")? {
            return Ok(());
        }
        let target = st.record(pid)?.quoted();
        st.trace(actor, || format!("activates {target} first"));
        st.schedule_process_first(&self.counters, pid)?;
        Ok(())
    }

    /// Move an already scheduled activation to `when`.
    pub(crate) fn reactivate(
        &self,
        actor: Actor,
        pid: ProcessId,
        when: TimeInstant,
    ) -> Result<(), KernelError> {
        let mut st = self.lock();
        let now = st.now();
        if when.is_before(now) {
            return Err(KernelError::SchedulingOrder {
                requested: when,
                now,
            });
        }
        let rec = st.record(pid)?;
        let target = rec.quoted();
        if rec.terminated {
            tracing::warn!(
                target: "clockwork::warning",
                "reactivate ignored: process {target} is terminated"
            );
            return Ok(());
        }
        if rec.note.is_none() {
            tracing::warn!(
                target: "clockwork::warning",
                "reactivate ignored: process {target} is not scheduled; use activate"
            );
            return Ok(());
        }
        st.unschedule(pid);
        st.trace(actor, || format!("reactivates {target} at {when}"));
        st.schedule_process_at(&self.counters, pid, when)?;
        Ok(())
    }

    /// Remove `pid`'s pending activation.
    pub(crate) fn cancel(&self, actor: Actor, pid: ProcessId) -> Result<(), KernelError> {
        let mut st = self.lock();
        let target = st.record(pid)?.quoted();
        if st.unschedule(pid) {
            st.trace(actor, || format!("cancels {target}"));
        } else {
            tracing::warn!(
                target: "clockwork::warning",
                "cancel ignored: process {target} is not scheduled"
            );
        }
        Ok(())
    }

    /// Deliver `code` to `pid` and schedule it to run next.
    pub(crate) fn interrupt(
        &self,
        actor: Actor,
        pid: ProcessId,
        code: InterruptCode,
    ) -> Result<(), KernelError> {
        let mut st = self.lock();
        let rec = st.record(pid)?;
        let target = rec.quoted();
        let refusal = if rec.terminated {
            Some("is terminated")
        } else if rec.interrupt_code.is_some() {
            Some("has already been interrupted")
        } else if actor == Actor::Process(pid) {
            Some("is the current process")
        } else {
            None
        };
        if let Some(reason) = refusal {
            tracing::warn!(
                target: "clockwork::warning",
                "interrupt ignored: process {target} {reason}"
            );
            return Ok(());
        }
        st.trace(actor, || format!("interrupts {target} with reason {code}"));
        let rec = st.record_mut(pid)?;
        rec.interrupt_code = Some(code);
        rec.interrupt_pending = true;
        st.waiters.retain(|w| w.process != pid);
        st.unschedule(pid);
        st.schedule_process_first(&self.counters, pid)?;
        Ok(())
    }

    /// Arm a delayed interrupt of `pid` at `when`. `None`, with a
    /// warning, if one is already armed.
    pub(crate) fn interrupt_delayed(
        &self,
        actor: Actor,
        pid: ProcessId,
        when: TimeInstant,
    ) -> Result<Option<InterruptCode>, KernelError> {
        let mut st = self.lock();
        let now = st.now();
        if when.is_before(now) {
            return Err(KernelError::SchedulingOrder {
                requested: when,
                now,
            });
        }
        let rec = st.record(pid)?;
        let target = rec.quoted();
        if rec.delayed_interrupt.is_some() {
            tracing::warn!(
                target: "clockwork::warning",
                "delayed interrupt ignored: process {target} already has one scheduled"
            );
            return Ok(None);
        }
        let code = InterruptCode::new(&self.counters, "delayed interrupt");
        let note = EventNote::new(
            self.counters.next_note(),
            when,
            Schedulable::DelayedInterrupt(pid),
        );
        let id = note.id();
        st.events.insert(note, now)?;
        st.record_mut(pid)?.delayed_interrupt = Some((id, code.clone()));
        st.trace(actor, || {
            format!("schedules a delayed interrupt of {target} at {when}")
        });
        Ok(Some(code))
    }

    /// Disarm `pid`'s delayed interrupt. `false`, with a warning, if none
    /// is armed.
    pub(crate) fn cancel_interrupt_delayed(
        &self,
        actor: Actor,
        pid: ProcessId,
    ) -> Result<bool, KernelError> {
        let mut st = self.lock();
        let rec = st.record_mut(pid)?;
        let target = rec.quoted();
        let Some((note, _)) = rec.delayed_interrupt.take() else {
            tracing::warn!(
                target: "clockwork::warning",
                "cancel ignored: process {target} has no delayed interrupt scheduled"
            );
            return Ok(false);
        };
        st.events.remove(note);
        st.trace(actor, || format!("cancels the delayed interrupt of {target}"));
        Ok(true)
    }

    pub(crate) fn has_delayed_interrupt(&self, pid: ProcessId) -> Result<bool, KernelError> {
        Ok(self.lock().record(pid)?.delayed_interrupt.is_some())
    }

    /// Deliver the delayed interrupt carried by `note`, disarming it
    /// first so the victim may arm another.
    pub(crate) fn fire_delayed_interrupt(
        &self,
        pid: ProcessId,
        note: NoteId,
    ) -> Result<(), KernelError> {
        let code = {
            let mut st = self.lock();
            let armed = st
                .record_mut(pid)?
                .delayed_interrupt
                .take_if(|(armed, _)| *armed == note);
            match armed {
                Some((_, code)) => code,
                None => return Ok(()),
            }
        };
        self.interrupt(Actor::External, pid, code)
    }

    fn may_activate(st: &KernelState, pid: ProcessId, operation: &str) -> Result<bool, KernelError> {
        let rec = st.record(pid)?;
        if rec.terminated {
            tracing::warn!(
                target: "clockwork::warning",
                "{operation} ignored: process {} is terminated",
                rec.quoted()
            );
            return Ok(false);
        }
        if rec.note.is_some() {
            tracing::warn!(
                target: "clockwork::warning",
                "{operation} ignored: process {} is already scheduled; use reactivate",
                rec.quoted()
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Schedule event routine `event` at `when` with up to three entities.
    pub(crate) fn schedule_event(
        &self,
        actor: Actor,
        event: EventId,
        entities: &[EntityId],
        when: TimeInstant,
    ) -> Result<NoteId, KernelError> {
        let mut st = self.lock();
        let name = st
            .routines
            .get(&event)
            .map(|r| r.name.clone())
            .ok_or(KernelError::UnknownEvent { event })?;
        let now = st.now();
        let note = EventNote::new(self.counters.next_note(), when, Schedulable::Event(event))
            .with_entities(entities)?;
        let id = note.id();
        st.events.insert(note, now)?;
        st.trace(actor, || format!("schedules '{name}' at {when}"));
        Ok(id)
    }

    /// Schedule the end of the run at `when`, after everything else due then.
    pub(crate) fn stop_at(&self, when: TimeInstant) -> Result<NoteId, KernelError> {
        let mut st = self.lock();
        let now = st.now();
        let note = EventNote::new(self.counters.next_note(), when, Schedulable::Stop)
            .with_priority(i32::MIN);
        let id = note.id();
        st.events.insert(note, now)?;
        Ok(id)
    }

    /// Remove any pending note. `false` if it was not scheduled.
    pub(crate) fn cancel_note(&self, note: NoteId) -> bool {
        let mut st = self.lock();
        let Some(removed) = st.events.remove(note) else {
            return false;
        };
        match removed.target() {
            Schedulable::Process(pid) => {
                if let Some(rec) = st.processes.get_mut(&pid) {
                    if rec.note == Some(note) {
                        rec.note = None;
                    }
                }
            }
            Schedulable::DelayedInterrupt(pid) => {
                if let Some(rec) = st.processes.get_mut(&pid) {
                    if rec
                        .delayed_interrupt
                        .as_ref()
                        .is_some_and(|(armed, _)| *armed == note)
                    {
                        rec.delayed_interrupt = None;
                    }
                }
            }
            Schedulable::Event(_) | Schedulable::Stop => {}
        }
        true
    }

    // ── Queries and flags ──────────────────────────────────────────

    pub(crate) fn is_scheduled(&self, pid: ProcessId) -> Result<bool, KernelError> {
        Ok(self.lock().record(pid)?.note.is_some())
    }

    pub(crate) fn pending_notes(&self, entity: EntityId) -> Vec<NoteId> {
        self.lock().events.pending_for_entity(entity)
    }

    pub(crate) fn pending_event_notes(&self, event: EventId) -> Vec<NoteId> {
        self.lock().events.pending_for_event(event)
    }

    pub(crate) fn with_record<R>(
        &self,
        pid: ProcessId,
        f: impl FnOnce(&mut ProcessRecord) -> R,
    ) -> Result<R, KernelError> {
        let mut st = self.lock();
        Ok(f(st.record_mut(pid)?))
    }
}
