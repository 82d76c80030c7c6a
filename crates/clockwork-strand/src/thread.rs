//! Thread-backed strands.
//!
//! Each strand is a dedicated, named OS thread registered in the
//! factory's run-scoped thread group. The scheduler and the worker pass
//! a baton over two bounded channels: a [`Wakeup`] goes in, a
//! [`StrandEvent`] comes back. Whoever does not hold the baton is
//! blocked on a receive, so only one side ever runs.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};
use std::thread::{self, JoinHandle};

use clockwork_core::{KernelError, ProcessId};
use crossbeam_channel::{Receiver, Sender};

use crate::factory::{
    BodyBuilder, CleanupReport, Strand, StrandBackend, StrandEvent, StrandFactory,
};
use crate::park::{FailureSlot, Suspender, ThreadBaton, Wakeup};
use crate::run_loop::panic_message;

/// Configuration for thread-backed strands.
#[derive(Clone, Debug)]
pub struct ThreadConfig {
    /// Stack size for worker threads. `None` uses the platform default.
    pub stack_size: Option<usize>,
    /// Prefix prepended to each strand's name to form the thread name.
    pub name_prefix: String,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            stack_size: None,
            name_prefix: "clockwork-".into(),
        }
    }
}

/// Factory-side record of one worker thread.
struct Worker {
    name: String,
    resume_tx: Sender<Wakeup>,
    started: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Creates one OS thread per strand.
pub struct ThreadStrandFactory {
    config: ThreadConfig,
    group: Mutex<Vec<Worker>>,
}

// Compile-time assertion: the factory is shared with the kernel.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ThreadStrandFactory>();
};

impl ThreadStrandFactory {
    /// A factory with an empty thread group.
    pub fn new(config: ThreadConfig) -> Self {
        Self {
            config,
            group: Mutex::new(Vec::new()),
        }
    }

    /// Worker threads spawned and not yet joined.
    pub fn live_workers(&self) -> usize {
        self.group
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn spawn(
        &self,
        process: Option<ProcessId>,
        name: &str,
        body: BodyBuilder,
    ) -> Result<Box<dyn Strand>, KernelError> {
        let (resume_tx, resume_rx) = crossbeam_channel::bounded(1);
        let (event_tx, event_rx) = crossbeam_channel::bounded(1);
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let failure = FailureSlot::default();
        let baton = Arc::new(ThreadBaton::new(
            resume_rx,
            event_tx,
            Arc::clone(&finished),
            Arc::clone(&failure),
        ));
        let strand = name.to_string();

        let mut builder =
            thread::Builder::new().name(format!("{}{}", self.config.name_prefix, name));
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }
        let handle = builder
            .spawn(move || worker_main(&strand, baton, body))
            .map_err(|e| KernelError::StrandFailed {
                strand: name.to_string(),
                reason: format!("failed to spawn worker thread: {e}"),
            })?;
        tracing::trace!(strand = name, "spawned worker thread");

        self.group
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Worker {
                name: name.to_string(),
                resume_tx: resume_tx.clone(),
                started: Arc::clone(&started),
                finished,
                handle: Some(handle),
            });

        Ok(Box::new(ThreadStrand {
            name: name.to_string(),
            process,
            resume_tx,
            event_rx,
            started,
            failure,
            terminated: false,
        }))
    }
}

/// Body of every worker thread.
fn worker_main(strand: &str, baton: Arc<ThreadBaton>, body: BodyBuilder) {
    if baton.await_start() == Wakeup::Teardown {
        baton.release();
        return;
    }
    let mut program = body(Suspender::for_thread(Arc::clone(&baton)));
    let mut cx = Context::from_waker(Waker::noop());
    // Kernel parks block inside `poll`, so a Pending here came from a
    // foreign future that nothing will ever wake.
    match panic::catch_unwind(AssertUnwindSafe(|| program.as_mut().poll(&mut cx))) {
        Ok(Poll::Ready(())) => {}
        Ok(Poll::Pending) => baton.fail(KernelError::InvalidSuspension {
            strand: strand.to_string(),
        }),
        Err(payload) => baton.fail(KernelError::StrandFailed {
            strand: strand.to_string(),
            reason: panic_message(payload.as_ref()),
        }),
    }
    drop(program);
    // Programs that forget to release still count as finished.
    baton.release();
}

impl StrandFactory for ThreadStrandFactory {
    fn backend(&self) -> StrandBackend {
        StrandBackend::Threads
    }

    fn create_for_process(
        &self,
        process: ProcessId,
        name: &str,
        body: BodyBuilder,
    ) -> Result<Box<dyn Strand>, KernelError> {
        self.spawn(Some(process), name, body)
    }

    fn create_named(&self, name: &str, body: BodyBuilder) -> Result<Box<dyn Strand>, KernelError> {
        self.spawn(None, name, body)
    }

    fn clean_up(&self) -> CleanupReport {
        let workers = std::mem::take(&mut *self.group.lock().unwrap_or_else(PoisonError::into_inner));
        let mut report = CleanupReport::default();

        for w in &workers {
            if w.finished.load(Ordering::Acquire) {
                continue;
            }
            if w.started.load(Ordering::Acquire) {
                report.torn_down += 1;
            } else {
                report.discarded += 1;
            }
            // Fails only if the worker already exited.
            let _ = w.resume_tx.try_send(Wakeup::Teardown);
        }

        for mut w in workers {
            if let Some(handle) = w.handle.take() {
                if handle.join().is_err() {
                    report.failed += 1;
                    tracing::error!(strand = %w.name, "worker thread panicked");
                }
            }
        }
        if report != CleanupReport::default() {
            tracing::debug!(?report, "thread group cleaned up");
        }
        report
    }
}

impl Drop for ThreadStrandFactory {
    fn drop(&mut self) {
        self.clean_up();
    }
}

/// Scheduler-side handle of a thread-backed strand.
struct ThreadStrand {
    name: String,
    process: Option<ProcessId>,
    resume_tx: Sender<Wakeup>,
    event_rx: Receiver<StrandEvent>,
    started: Arc<AtomicBool>,
    failure: FailureSlot,
    terminated: bool,
}

impl ThreadStrand {
    fn failure(&self, reason: &str) -> KernelError {
        KernelError::StrandFailed {
            strand: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Strand for ThreadStrand {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self) -> Option<ProcessId> {
        self.process
    }

    fn resume(&mut self) -> Result<StrandEvent, KernelError> {
        if self.terminated {
            return Ok(StrandEvent::Terminated);
        }
        self.started.store(true, Ordering::Release);
        if self.resume_tx.send(Wakeup::Resumed).is_err() {
            self.terminated = true;
            return Err(self.failure("worker thread is gone"));
        }
        match self.event_rx.recv() {
            Ok(StrandEvent::Parked) => Ok(StrandEvent::Parked),
            Ok(StrandEvent::Terminated) => {
                self.terminated = true;
                let failure = self
                    .failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                match failure {
                    Some(e) => Err(e),
                    None => Ok(StrandEvent::Terminated),
                }
            }
            Err(_) => {
                self.terminated = true;
                Err(self.failure("worker thread exited without releasing the strand"))
            }
        }
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn is_terminated(&self) -> bool {
        self.terminated
    }
}
