//! Simulated processes: bodies, the context they run against, and the
//! glue that turns a body into a strand program.
//!
//! A process body is an `async` life cycle. It suspends only through the
//! [`ProcessContext`] operations [`hold`](ProcessContext::hold),
//! [`hold_until`](ProcessContext::hold_until),
//! [`passivate`](ProcessContext::passivate) and the condition waits.
//! Every one of them returns `Err(BodyError::Interrupted(code))` when the
//! process was interrupted while suspended, and `Err(BodyError::Teardown)`
//! when the run is being cleaned up. Both are meant to be propagated with
//! `?` unless the body handles the interrupt itself.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use clockwork_core::{
    BodyError, Condition, EntityId, EventId, Identified, InterruptCode, KernelError, Named,
    NoteId, Owned, Prioritized, ProcessId, RunCounters, TimeInstant, TimeSpan, Traced,
};
use clockwork_queue::QueueDirectory;
use clockwork_strand::{
    run_loop, BodyBuilder, BodyFuture, LifeCycle, LifeCycleFuture, RunHost, Suspender, Wakeup,
};

use crate::event::EventRoutine;
use crate::kernel::{Actor, Kernel, WaitCondition, Waiter};

// ── ProcessBody ────────────────────────────────────────────────────

/// The behaviour of a simulated process.
///
/// # Example
///
/// ```ignore
/// struct Clerk;
///
/// impl ProcessBody for Clerk {
///     fn life_cycle(&mut self, ctx: ProcessContext) -> LifeCycleFuture<'_> {
///         Box::pin(async move {
///             ctx.hold(TimeSpan::new(5)?).await?;
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait ProcessBody: Send + 'static {
    /// One pass of the process's behaviour.
    fn life_cycle(&mut self, ctx: ProcessContext) -> LifeCycleFuture<'_>;

    /// Description used in failure reports.
    fn describe(&self) -> String {
        "life_cycle".to_string()
    }

    /// Whether the life cycle repeats from the start. Read once at spawn;
    /// the body may change it later with
    /// [`ProcessContext::set_repeating`].
    fn repeating(&self) -> bool {
        false
    }
}

/// A [`ProcessBody`] made from an async closure. See [`from_fn`].
pub struct FnBody<F> {
    f: F,
    label: String,
    repeating: bool,
}

/// Wrap an async closure as a process body.
pub fn from_fn<F, Fut>(f: F) -> FnBody<F>
where
    F: FnMut(ProcessContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BodyError>> + Send + 'static,
{
    FnBody {
        f,
        label: "closure".to_string(),
        repeating: false,
    }
}

impl<F> FnBody<F> {
    /// Set the description used in failure reports.
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Make the closure repeat.
    pub fn repeat(mut self) -> Self {
        self.repeating = true;
        self
    }
}

impl<F, Fut> ProcessBody for FnBody<F>
where
    F: FnMut(ProcessContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BodyError>> + Send + 'static,
{
    fn life_cycle(&mut self, ctx: ProcessContext) -> LifeCycleFuture<'_> {
        Box::pin((self.f)(ctx))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }

    fn repeating(&self) -> bool {
        self.repeating
    }
}

impl ProcessBody for Box<dyn ProcessBody> {
    fn life_cycle(&mut self, ctx: ProcessContext) -> LifeCycleFuture<'_> {
        (**self).life_cycle(ctx)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn repeating(&self) -> bool {
        (**self).repeating()
    }
}

// ── Strand glue ────────────────────────────────────────────────────

/// [`RunHost`] view of one process record.
struct ProcessHost {
    kernel: Arc<Kernel>,
    pid: ProcessId,
    name: Arc<str>,
}

impl RunHost for ProcessHost {
    fn process_name(&self) -> String {
        self.name.to_string()
    }

    fn is_repeating(&self) -> bool {
        self.kernel
            .with_record(self.pid, |r| r.repeating)
            .unwrap_or(false)
    }

    fn trace_enabled(&self) -> bool {
        self.kernel.with_record(self.pid, |r| r.trace).unwrap_or(false)
    }

    fn now(&self) -> TimeInstant {
        self.kernel.now()
    }

    fn set_running(&self, running: bool) {
        let _ = self.kernel.with_record(self.pid, |r| r.running = running);
    }

    fn set_terminated(&self) {
        let mut st = self.kernel.lock();
        st.waiters.retain(|w| w.process != self.pid);
        if let Ok(rec) = st.record_mut(self.pid) {
            rec.terminated = true;
        }
    }

    fn abort(&self, error: KernelError) {
        self.kernel.abort(error);
    }
}

/// A body bound to its context: the run-loop's [`LifeCycle`].
struct BoundBody {
    body: Box<dyn ProcessBody>,
    ctx: ProcessContext,
}

impl LifeCycle for BoundBody {
    fn describe(&self) -> String {
        self.body.describe()
    }

    fn run(&mut self) -> LifeCycleFuture<'_> {
        let ctx = self.ctx.clone();
        self.body.life_cycle(ctx)
    }
}

/// The strand program of process `pid`: its run-loop over `body`.
pub(crate) fn strand_program(
    kernel: Arc<Kernel>,
    pid: ProcessId,
    name: Arc<str>,
    body: Box<dyn ProcessBody>,
) -> BodyBuilder {
    Box::new(move |suspender: Suspender| -> BodyFuture {
        let ctx = ProcessContext {
            kernel: Arc::clone(&kernel),
            pid,
            name: Arc::clone(&name),
            suspender: suspender.clone(),
        };
        let host: Arc<dyn RunHost> = Arc::new(ProcessHost { kernel, pid, name });
        Box::pin(run_loop(host, Box::new(BoundBody { body, ctx }), suspender))
    })
}

// ── ProcessContext ─────────────────────────────────────────────────

/// A running process's handle on the kernel.
///
/// Cloneable and `Send`; every clone refers to the same process. It also
/// stands for the process as a queueable entity, so it can be placed in
/// a [`QueueList`](clockwork_queue::QueueList) directly.
#[derive(Clone)]
pub struct ProcessContext {
    kernel: Arc<Kernel>,
    pid: ProcessId,
    name: Arc<str>,
    suspender: Suspender,
}

// Compile-time assertion: contexts move into strands and across awaits.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ProcessContext>();
};

impl ProcessContext {
    fn actor(&self) -> Actor {
        Actor::Process(self.pid)
    }

    fn after(&self, span: TimeSpan) -> Result<TimeInstant, KernelError> {
        Ok(self.kernel.now().checked_add(span)?)
    }

    /// This process's id.
    pub fn id(&self) -> ProcessId {
        self.pid
    }

    /// Current simulated time.
    pub fn now(&self) -> TimeInstant {
        self.kernel.now()
    }

    // ── Suspension points ──────────────────────────────────────────

    /// Park until resumed, then deliver a pending interrupt.
    async fn suspend(&self) -> Result<(), BodyError> {
        if self.suspender.park().await == Wakeup::Teardown {
            return Err(BodyError::Teardown);
        }
        let mut st = self.kernel.lock();
        let rec = st.record_mut(self.pid)?;
        if rec.interrupt_pending {
            rec.interrupt_pending = false;
            if let Some(code) = rec.interrupt_code.clone() {
                return Err(BodyError::Interrupted(code));
            }
        }
        Ok(())
    }

    /// Suspend for `span`.
    pub async fn hold(&self, span: TimeSpan) -> Result<(), BodyError> {
        let until = self.after(span)?;
        self.hold_until(until).await
    }

    /// Suspend until `until`.
    ///
    /// Fails with [`KernelError::SchedulingOrder`] if `until` lies in the
    /// past, and with [`KernelError::AlreadyScheduled`] if this process
    /// already has a pending wakeup.
    pub async fn hold_until(&self, until: TimeInstant) -> Result<(), BodyError> {
        {
            let mut st = self.kernel.lock();
            let now = st.now();
            if until.is_before(now) {
                return Err(KernelError::SchedulingOrder {
                    requested: until,
                    now,
                }
                .into());
            }
            st.ensure_unscheduled(self.pid)?;
            st.trace(self.actor(), || format!("holds until {until}"));
            st.schedule_process_at(self.kernel.counters(), self.pid, until)?;
        }
        self.suspend().await
    }

    /// Suspend until another party activates this process.
    pub async fn passivate(&self) -> Result<(), BodyError> {
        self.kernel
            .lock()
            .trace(self.actor(), || "passivates".to_string());
        self.suspend().await
    }

    /// Suspend until `condition` holds.
    ///
    /// The condition is checked now and again after every dispatched
    /// note; a condition that already holds returns at once.
    pub async fn wait_until<C>(&self, condition: C) -> Result<(), BodyError>
    where
        C: Condition<TimeInstant> + Send + Sync + 'static,
    {
        self.wait_on(Arc::new(condition), None).await.map(|_| ())
    }

    /// Suspend until `condition` holds or `timeout` elapses, whichever
    /// comes first. Returns whether the condition was satisfied; the
    /// losing wakeup is cancelled.
    pub async fn wait_until_or_timeout<C>(
        &self,
        condition: C,
        timeout: TimeSpan,
    ) -> Result<bool, BodyError>
    where
        C: Condition<TimeInstant> + Send + Sync + 'static,
    {
        let deadline = self.after(timeout)?;
        self.wait_on(Arc::new(condition), Some(deadline)).await
    }

    async fn wait_on(
        &self,
        condition: WaitCondition,
        deadline: Option<TimeInstant>,
    ) -> Result<bool, BodyError> {
        loop {
            let now = self.now();
            if condition.check(&now) {
                return Ok(true);
            }
            if deadline.is_some_and(|d| !now.is_before(d)) {
                return Ok(false);
            }
            {
                let mut st = self.kernel.lock();
                st.ensure_unscheduled(self.pid)?;
                st.record_mut(self.pid)?.wait_satisfied = false;
                st.waiters.push(Waiter {
                    process: self.pid,
                    condition: Arc::clone(&condition),
                });
                match deadline {
                    Some(d) => {
                        st.schedule_process_at(self.kernel.counters(), self.pid, d)?;
                        st.trace(self.actor(), || format!("waits for a condition until {d}"));
                    }
                    None => st.trace(self.actor(), || "waits for a condition".to_string()),
                }
            }
            let resumed = self.suspend().await;
            let satisfied = {
                let mut st = self.kernel.lock();
                st.waiters.retain(|w| w.process != self.pid);
                if deadline.is_some() {
                    st.unschedule(self.pid);
                }
                st.record_mut(self.pid)
                    .map(|r| std::mem::take(&mut r.wait_satisfied))
                    .unwrap_or(false)
            };
            resumed?;
            if satisfied {
                return Ok(true);
            }
        }
    }

    // ── Scheduling others ──────────────────────────────────────────

    /// Activate `pid` after `span`.
    pub fn activate(&self, pid: ProcessId, span: TimeSpan) -> Result<(), KernelError> {
        let when = self.after(span)?;
        self.kernel.activate(self.actor(), pid, when)
    }

    /// Activate `pid` at `when`.
    pub fn activate_at(&self, pid: ProcessId, when: TimeInstant) -> Result<(), KernelError> {
        self.kernel.activate(self.actor(), pid, when)
    }

    /// Activate `pid` directly after `anchor`'s pending activation.
    ///
    /// Not supported by the bucketed event list.
    pub fn activate_after(&self, pid: ProcessId, anchor: ProcessId) -> Result<(), KernelError> {
        self.kernel.activate_relative(self.actor(), pid, anchor, true)
    }

    /// Activate `pid` directly before `anchor`'s pending activation.
    ///
    /// Not supported by the bucketed event list.
    pub fn activate_before(&self, pid: ProcessId, anchor: ProcessId) -> Result<(), KernelError> {
        self.kernel.activate_relative(self.actor(), pid, anchor, false)
    }

    /// Activate `pid` ahead of everything else due now.
    pub fn activate_first(&self, pid: ProcessId) -> Result<(), KernelError> {
        self.kernel.activate_first(self.actor(), pid)
    }

    /// Move `pid`'s pending activation to `span` from now.
    pub fn reactivate(&self, pid: ProcessId, span: TimeSpan) -> Result<(), KernelError> {
        let when = self.after(span)?;
        self.kernel.reactivate(self.actor(), pid, when)
    }

    /// Remove `pid`'s pending activation.
    pub fn cancel(&self, pid: ProcessId) -> Result<(), KernelError> {
        self.kernel.cancel(self.actor(), pid)
    }

    /// Interrupt `pid` with `code`; it runs next, and its current
    /// suspension point returns the interrupt.
    pub fn interrupt(&self, pid: ProcessId, code: InterruptCode) -> Result<(), KernelError> {
        self.kernel.interrupt(self.actor(), pid, code)
    }

    /// Arm an interrupt of `pid` that fires after `span`.
    ///
    /// Returns the code the interrupt will carry, or `None` with a
    /// warning if `pid` already has one armed. An armed interrupt stays
    /// armed until it fires or is cancelled with
    /// [`cancel_interrupt_delayed`](Self::cancel_interrupt_delayed).
    pub fn interrupt_delayed(
        &self,
        pid: ProcessId,
        span: TimeSpan,
    ) -> Result<Option<InterruptCode>, KernelError> {
        let when = self.after(span)?;
        self.kernel.interrupt_delayed(self.actor(), pid, when)
    }

    /// Arm an interrupt of `pid` that fires at `when`.
    pub fn interrupt_delayed_at(
        &self,
        pid: ProcessId,
        when: TimeInstant,
    ) -> Result<Option<InterruptCode>, KernelError> {
        self.kernel.interrupt_delayed(self.actor(), pid, when)
    }

    /// Disarm `pid`'s delayed interrupt. `false`, with a warning, if none
    /// was armed.
    pub fn cancel_interrupt_delayed(&self, pid: ProcessId) -> Result<bool, KernelError> {
        self.kernel.cancel_interrupt_delayed(self.actor(), pid)
    }

    /// Whether `pid` has a delayed interrupt armed.
    pub fn is_delayed_interrupt_scheduled(&self, pid: ProcessId) -> Result<bool, KernelError> {
        self.kernel.has_delayed_interrupt(pid)
    }

    /// Schedule event routine `event` after `span`, with up to three
    /// associated entities.
    pub fn schedule_event(
        &self,
        event: EventId,
        entities: &[EntityId],
        span: TimeSpan,
    ) -> Result<NoteId, KernelError> {
        let when = self.after(span)?;
        self.kernel.schedule_event(self.actor(), event, entities, when)
    }

    /// Remove any pending note. `false` if it was not scheduled.
    pub fn cancel_note(&self, note: NoteId) -> bool {
        self.kernel.cancel_note(note)
    }

    /// Register a new, unstarted process.
    pub fn spawn<B: ProcessBody>(&self, name: &str, body: B) -> ProcessId {
        self.kernel.spawn(name, Box::new(body))
    }

    /// Register an event routine.
    pub fn register_event<R: EventRoutine + 'static>(&self, name: &str, routine: R) -> EventId {
        self.kernel.register_event(name, Box::new(routine))
    }

    /// A fresh interrupt code with a run-unique serial.
    pub fn new_interrupt_code(&self, name: &str) -> InterruptCode {
        self.kernel.new_interrupt_code(name)
    }

    // ── Queries and flags ──────────────────────────────────────────

    /// Whether `pid` has a pending activation.
    pub fn is_scheduled(&self, pid: ProcessId) -> Result<bool, KernelError> {
        self.kernel.is_scheduled(pid)
    }

    /// Pending notes referencing `entity`.
    pub fn pending_notes(&self, entity: EntityId) -> Vec<NoteId> {
        self.kernel.pending_notes(entity)
    }

    /// The code of the last interrupt received, until cleared.
    pub fn interrupt_code(&self) -> Option<InterruptCode> {
        self.kernel
            .with_record(self.pid, |r| r.interrupt_code.clone())
            .ok()
            .flatten()
    }

    /// Whether an interrupt code is set.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt_code().is_some()
    }

    /// Forget the last interrupt, so the process can be interrupted again.
    pub fn clear_interrupt_code(&self) {
        let _ = self.kernel.with_record(self.pid, |r| {
            r.interrupt_code = None;
            r.interrupt_pending = false;
        });
    }

    /// Whether the life cycle runs again after it returns.
    pub fn set_repeating(&self, repeating: bool) {
        let _ = self.kernel.with_record(self.pid, |r| r.repeating = repeating);
    }

    /// Scheduling priority of future activations. Higher runs first
    /// among notes due at the same time.
    pub fn set_priority(&self, priority: i32) {
        let _ = self.kernel.with_record(self.pid, |r| r.priority = priority);
    }

    /// Switch trace notes for this process on or off.
    pub fn set_trace(&self, trace: bool) {
        let _ = self.kernel.with_record(self.pid, |r| r.trace = trace);
    }

    /// The run's queue directory.
    pub fn directory(&self) -> Arc<QueueDirectory> {
        Arc::clone(self.kernel.directory())
    }

    /// The run's id counters.
    pub fn counters(&self) -> Arc<RunCounters> {
        Arc::clone(self.kernel.counters())
    }
}

impl Named for ProcessContext {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Identified for ProcessContext {
    fn entity_id(&self) -> EntityId {
        self.pid.entity()
    }
}

impl Prioritized for ProcessContext {
    fn priority(&self) -> i32 {
        self.kernel.with_record(self.pid, |r| r.priority).unwrap_or(0)
    }
}

impl Traced for ProcessContext {
    fn trace_enabled(&self) -> bool {
        self.kernel.with_record(self.pid, |r| r.trace).unwrap_or(false)
    }
}

impl Owned for ProcessContext {
    fn owner(&self) -> &str {
        self.kernel.name()
    }
}

impl fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessContext")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .finish()
    }
}
