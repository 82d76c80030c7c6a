//! The suspension primitive.
//!
//! [`Suspender::park`] is the only point at which a process body gives
//! up control. What parking means depends on the backend the suspender
//! was issued by:
//!
//! - thread-backed: report [`StrandEvent::Parked`] to the scheduler and
//!   block the worker thread until it sends the next [`Wakeup`];
//! - continuation-backed: arm a shared slot and return `Poll::Pending`
//!   once; the scheduler fills the slot and polls again.
//!
//! Once a strand has received [`Wakeup::Teardown`] every later park
//! resolves to `Teardown` immediately, so a body that keeps suspending
//! while it unwinds cannot hang the clean-up.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use clockwork_core::KernelError;
use crossbeam_channel::{Receiver, Sender};

use crate::factory::StrandEvent;

/// Why a thread strand's program stopped short, read by its handle.
pub(crate) type FailureSlot = Arc<Mutex<Option<KernelError>>>;

/// Why a parked strand continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wakeup {
    /// The scheduler dispatched this strand's process.
    Resumed,
    /// The run is ending; the strand must retire.
    Teardown,
}

// ── Thread baton ────────────────────────────────────────────────────

/// Worker-side ends of a thread strand's channels.
#[derive(Debug)]
pub(crate) struct ThreadBaton {
    resume_rx: Receiver<Wakeup>,
    event_tx: Sender<StrandEvent>,
    torn_down: AtomicBool,
    /// Shared with the factory's thread group.
    finished: Arc<AtomicBool>,
    failure: FailureSlot,
}

impl ThreadBaton {
    pub(crate) fn new(
        resume_rx: Receiver<Wakeup>,
        event_tx: Sender<StrandEvent>,
        finished: Arc<AtomicBool>,
        failure: FailureSlot,
    ) -> Self {
        Self {
            resume_rx,
            event_tx,
            torn_down: AtomicBool::new(false),
            finished,
            failure,
        }
    }

    /// Wait for the first wakeup before the body starts.
    pub(crate) fn await_start(&self) -> Wakeup {
        self.receive()
    }

    /// Hand the baton back to the scheduler and block until resumed.
    fn block(&self) -> Wakeup {
        if self.torn_down.load(Ordering::Acquire) {
            return Wakeup::Teardown;
        }
        if self.event_tx.send(StrandEvent::Parked).is_err() {
            self.torn_down.store(true, Ordering::Release);
            return Wakeup::Teardown;
        }
        self.receive()
    }

    fn receive(&self) -> Wakeup {
        match self.resume_rx.recv() {
            Ok(Wakeup::Resumed) => Wakeup::Resumed,
            Ok(Wakeup::Teardown) | Err(_) => {
                self.torn_down.store(true, Ordering::Release);
                Wakeup::Teardown
            }
        }
    }

    /// Record why the program stopped; the first failure wins.
    pub(crate) fn fail(&self, error: KernelError) {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(error);
    }

    pub(crate) fn release(&self) {
        self.finished.store(true, Ordering::Release);
        // The scheduler may already be gone during clean-up.
        let _ = self.event_tx.try_send(StrandEvent::Terminated);
    }
}

// ── Continuation slot ───────────────────────────────────────────────

#[derive(Debug, Default)]
struct SlotState {
    /// Set by a kernel park, cleared when the scheduler resumes.
    parked: bool,
    wakeup: Option<Wakeup>,
    torn_down: bool,
    released: bool,
}

/// Shared between a continuation strand's park futures and its driver.
#[derive(Debug, Default)]
pub(crate) struct ContinuationSlot {
    state: Mutex<SlotState>,
}

impl ContinuationSlot {
    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the last `Pending` came from a kernel park.
    pub(crate) fn is_parked(&self) -> bool {
        self.lock().parked
    }

    /// Whether the run-loop has signalled its final termination.
    pub(crate) fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Deliver `wakeup` to the pending park, if any.
    pub(crate) fn deliver(&self, wakeup: Wakeup) {
        let mut s = self.lock();
        s.parked = false;
        if wakeup == Wakeup::Teardown {
            s.torn_down = true;
        }
        s.wakeup = Some(wakeup);
    }

    fn poll_park(&self, armed: &mut bool) -> Poll<Wakeup> {
        let mut s = self.lock();
        if s.torn_down && !*armed {
            return Poll::Ready(Wakeup::Teardown);
        }
        if *armed {
            if let Some(w) = s.wakeup.take() {
                return Poll::Ready(w);
            }
        }
        *armed = true;
        s.parked = true;
        Poll::Pending
    }

    fn release(&self) {
        self.lock().released = true;
    }
}

// ── Suspender ───────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum Backing {
    Thread(Arc<ThreadBaton>),
    Continuation(Arc<ContinuationSlot>),
}

/// Handle through which a strand's body suspends and retires.
///
/// Cloneable; every clone is bound to the same strand.
#[derive(Clone, Debug)]
pub struct Suspender {
    backing: Backing,
}

impl Suspender {
    pub(crate) fn for_thread(baton: Arc<ThreadBaton>) -> Self {
        Self {
            backing: Backing::Thread(baton),
        }
    }

    pub(crate) fn for_continuation(slot: Arc<ContinuationSlot>) -> Self {
        Self {
            backing: Backing::Continuation(slot),
        }
    }

    /// Give control back to the scheduler until this strand is resumed.
    pub fn park(&self) -> ParkFuture {
        let kind = match &self.backing {
            Backing::Thread(b) => ParkKind::Thread(Arc::clone(b)),
            Backing::Continuation(s) => ParkKind::Continuation {
                slot: Arc::clone(s),
                armed: false,
            },
        };
        ParkFuture { kind }
    }

    /// Signal the controller that this strand has finished for good.
    ///
    /// The run-loop's very last act.
    pub fn release(&self) {
        match &self.backing {
            Backing::Thread(b) => b.release(),
            Backing::Continuation(s) => s.release(),
        }
    }
}

/// Future returned by [`Suspender::park`].
#[derive(Debug)]
#[must_use = "parking does nothing unless awaited"]
pub struct ParkFuture {
    kind: ParkKind,
}

#[derive(Debug)]
enum ParkKind {
    Thread(Arc<ThreadBaton>),
    Continuation {
        slot: Arc<ContinuationSlot>,
        armed: bool,
    },
}

impl Future for ParkFuture {
    type Output = Wakeup;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Wakeup> {
        match &mut self.get_mut().kind {
            // Blocking is the point: the worker thread owns nothing else.
            ParkKind::Thread(baton) => Poll::Ready(baton.block()),
            ParkKind::Continuation { slot, armed } => slot.poll_park(armed),
        }
    }
}
