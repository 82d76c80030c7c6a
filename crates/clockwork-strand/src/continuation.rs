//! Continuation-backed strands.
//!
//! No thread per strand: every strand's program is a future polled on
//! the caller's (the scheduler's) thread with a no-op waker. Parking is
//! a single cooperative `Poll::Pending` from [`Suspender::park`]; a
//! `Pending` from anywhere else can never be resumed and is reported as
//! [`KernelError::InvalidSuspension`].

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use clockwork_core::{KernelError, ProcessId};

use crate::factory::{
    BodyBuilder, BodyFuture, CleanupReport, Strand, StrandBackend, StrandEvent, StrandFactory,
};
use crate::park::{ContinuationSlot, Suspender, Wakeup};
use crate::run_loop::panic_message;

struct CellState {
    builder: Option<BodyBuilder>,
    program: Option<BodyFuture>,
    started: bool,
    terminated: bool,
}

/// One continuation strand, shared by its handle and the factory.
struct Cell {
    name: String,
    process: Option<ProcessId>,
    slot: Arc<ContinuationSlot>,
    state: Mutex<CellState>,
}

impl Cell {
    fn lock(&self) -> MutexGuard<'_, CellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_started(&self) -> bool {
        self.lock().started
    }

    fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    /// Deliver `wakeup` and poll the program until it parks or ends.
    fn drive(&self, wakeup: Wakeup) -> Result<StrandEvent, KernelError> {
        let mut st = self.lock();
        if st.terminated {
            return Ok(StrandEvent::Terminated);
        }
        if !st.started {
            if wakeup == Wakeup::Teardown {
                st.builder = None;
                st.terminated = true;
                return Ok(StrandEvent::Terminated);
            }
            st.started = true;
            let builder = st.builder.take().ok_or_else(|| KernelError::StrandFailed {
                strand: self.name.clone(),
                reason: "program already consumed".into(),
            })?;
            st.program = Some(builder(Suspender::for_continuation(Arc::clone(&self.slot))));
        } else {
            self.slot.deliver(wakeup);
        }

        let Some(program) = st.program.as_mut() else {
            st.terminated = true;
            return Ok(StrandEvent::Terminated);
        };
        let mut cx = Context::from_waker(Waker::noop());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| program.as_mut().poll(&mut cx)));

        match outcome {
            Ok(Poll::Pending) if self.slot.is_parked() => Ok(StrandEvent::Parked),
            Ok(Poll::Ready(())) => {
                st.program = None;
                st.terminated = true;
                if !self.slot.is_released() {
                    tracing::trace!(strand = %self.name, "program ended without releasing");
                }
                Ok(StrandEvent::Terminated)
            }
            Ok(Poll::Pending) => {
                st.program = None;
                st.terminated = true;
                Err(KernelError::InvalidSuspension {
                    strand: self.name.clone(),
                })
            }
            Err(payload) => {
                st.program = None;
                st.terminated = true;
                Err(KernelError::StrandFailed {
                    strand: self.name.clone(),
                    reason: panic_message(payload.as_ref()),
                })
            }
        }
    }
}

/// Creates strands that share the scheduler's thread.
#[derive(Default)]
pub struct ContinuationStrandFactory {
    cells: Mutex<Vec<Arc<Cell>>>,
}

// Compile-time assertion: the factory is shared with the kernel.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ContinuationStrandFactory>();
};

impl ContinuationStrandFactory {
    /// A factory with no strands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Strands created and not yet terminated.
    pub fn live_strands(&self) -> usize {
        self.cells
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| !c.is_terminated())
            .count()
    }

    fn create(
        &self,
        process: Option<ProcessId>,
        name: &str,
        body: BodyBuilder,
    ) -> Box<dyn Strand> {
        let cell = Arc::new(Cell {
            name: name.to_string(),
            process,
            slot: Arc::new(ContinuationSlot::default()),
            state: Mutex::new(CellState {
                builder: Some(body),
                program: None,
                started: false,
                terminated: false,
            }),
        });
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.retain(|c| !c.is_terminated());
        cells.push(Arc::clone(&cell));
        Box::new(ContinuationStrand { cell })
    }
}

impl StrandFactory for ContinuationStrandFactory {
    fn backend(&self) -> StrandBackend {
        StrandBackend::Continuations
    }

    fn create_for_process(
        &self,
        process: ProcessId,
        name: &str,
        body: BodyBuilder,
    ) -> Result<Box<dyn Strand>, KernelError> {
        Ok(self.create(Some(process), name, body))
    }

    fn create_named(&self, name: &str, body: BodyBuilder) -> Result<Box<dyn Strand>, KernelError> {
        Ok(self.create(None, name, body))
    }

    fn clean_up(&self) -> CleanupReport {
        let cells = std::mem::take(&mut *self.cells.lock().unwrap_or_else(PoisonError::into_inner));
        let mut report = CleanupReport::default();
        for cell in cells {
            if cell.is_terminated() {
                continue;
            }
            let started = cell.is_started();
            match cell.drive(Wakeup::Teardown) {
                Ok(StrandEvent::Terminated) if started => report.torn_down += 1,
                Ok(StrandEvent::Terminated) => report.discarded += 1,
                Ok(StrandEvent::Parked) => {
                    report.failed += 1;
                    tracing::warn!(
                        target: "clockwork::warning",
                        strand = %cell.name,
                        "strand parked again during teardown"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(target: "clockwork::warning", strand = %cell.name, "teardown failed: {e}");
                }
            }
        }
        if report != CleanupReport::default() {
            tracing::debug!(?report, "continuation strands cleaned up");
        }
        report
    }
}

impl Drop for ContinuationStrandFactory {
    fn drop(&mut self) {
        self.clean_up();
    }
}

/// Scheduler-side handle of a continuation strand.
struct ContinuationStrand {
    cell: Arc<Cell>,
}

impl Strand for ContinuationStrand {
    fn name(&self) -> &str {
        &self.cell.name
    }

    fn process(&self) -> Option<ProcessId> {
        self.cell.process
    }

    fn resume(&mut self) -> Result<StrandEvent, KernelError> {
        self.cell.drive(Wakeup::Resumed)
    }

    fn is_started(&self) -> bool {
        self.cell.is_started()
    }

    fn is_terminated(&self) -> bool {
        self.cell.is_terminated()
    }
}
