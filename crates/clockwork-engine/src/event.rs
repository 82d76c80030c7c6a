//! Instantaneous event routines.
//!
//! An event routine runs to completion inside a single dispatch and
//! never suspends. It sees the non-suspending part of the process API
//! through an [`EventContext`].

use std::fmt;
use std::sync::Arc;

use clockwork_core::{
    BodyError, EntityId, EventId, InterruptCode, KernelError, NoteId, ProcessId, RunCounters,
    TimeInstant, TimeSpan,
};
use clockwork_queue::QueueDirectory;

use crate::kernel::{Actor, Kernel};
use crate::process::ProcessBody;

/// Behaviour of an event.
///
/// Implemented for every `FnMut(&mut EventContext) -> Result<(), BodyError>`.
pub trait EventRoutine: Send {
    /// Handle one occurrence of the event.
    fn run(&mut self, ctx: &mut EventContext) -> Result<(), BodyError>;
}

impl<F> EventRoutine for F
where
    F: FnMut(&mut EventContext) -> Result<(), BodyError> + Send,
{
    fn run(&mut self, ctx: &mut EventContext) -> Result<(), BodyError> {
        self(ctx)
    }
}

/// The kernel as seen from a running event routine.
pub struct EventContext {
    kernel: Arc<Kernel>,
    event: EventId,
    name: String,
    note: NoteId,
    entities: Vec<EntityId>,
}

impl EventContext {
    pub(crate) fn new(
        kernel: Arc<Kernel>,
        event: EventId,
        name: String,
        note: NoteId,
        entities: Vec<EntityId>,
    ) -> Self {
        Self {
            kernel,
            event,
            name,
            note,
            entities,
        }
    }

    fn actor(&self) -> Actor {
        Actor::Event(self.event)
    }

    fn after(&self, span: TimeSpan) -> Result<TimeInstant, KernelError> {
        Ok(self.kernel.now().checked_add(span)?)
    }

    /// The routine's id.
    pub fn event(&self) -> EventId {
        self.event
    }

    /// The routine's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The note being dispatched.
    pub fn note(&self) -> NoteId {
        self.note
    }

    /// Entities the note was scheduled with, in order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Current simulated time.
    pub fn now(&self) -> TimeInstant {
        self.kernel.now()
    }

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
    pub fn activate_after(&self, pid: ProcessId, anchor: ProcessId) -> Result<(), KernelError> {
        self.kernel.activate_relative(self.actor(), pid, anchor, true)
    }

    /// Activate `pid` directly before `anchor`'s pending activation.
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

    /// Interrupt `pid` with `code`.
    pub fn interrupt(&self, pid: ProcessId, code: InterruptCode) -> Result<(), KernelError> {
        self.kernel.interrupt(self.actor(), pid, code)
    }

    /// Arm an interrupt of `pid` that fires after `span`.
    pub fn interrupt_delayed(
        &self,
        pid: ProcessId,
        span: TimeSpan,
    ) -> Result<Option<InterruptCode>, KernelError> {
        let when = self.after(span)?;
        self.kernel.interrupt_delayed(self.actor(), pid, when)
    }

    /// Schedule event routine `event` after `span`.
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

    /// A fresh interrupt code with a run-unique serial.
    pub fn new_interrupt_code(&self, name: &str) -> InterruptCode {
        self.kernel.new_interrupt_code(name)
    }

    /// Whether `pid` has a pending activation.
    pub fn is_scheduled(&self, pid: ProcessId) -> Result<bool, KernelError> {
        self.kernel.is_scheduled(pid)
    }

    /// Pending notes referencing `entity`.
    pub fn pending_notes(&self, entity: EntityId) -> Vec<NoteId> {
        self.kernel.pending_notes(entity)
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

impl fmt::Debug for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("event", &self.event)
            .field("name", &self.name)
            .field("note", &self.note)
            .field("entities", &self.entities)
            .finish()
    }
}
