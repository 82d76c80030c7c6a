//! The process run-loop: the program every process strand executes.
//!
//! Runs the process's life cycle once, or again and again while the
//! process is repeating, then funnels any failure to the run controller
//! and retires the strand. The last three acts are always, in order:
//! mark not running, mark terminated, release the strand.
//!
//! A panic inside the life cycle is caught here, on either backend, and
//! reported as [`KernelError::ProcessFailed`].

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use clockwork_core::{BodyError, KernelError, TimeInstant};

use crate::park::Suspender;

/// Future returned by one pass of a [`LifeCycle`].
pub type LifeCycleFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BodyError>> + Send + 'a>>;

/// The process a run-loop serves, as seen from the strand.
pub trait RunHost: Send + Sync {
    /// Name of the process, for trace notes and error reports.
    fn process_name(&self) -> String;

    /// Whether the life cycle should run again after it returns.
    fn is_repeating(&self) -> bool;

    /// Whether trace notes are emitted for this process.
    fn trace_enabled(&self) -> bool;

    /// Current simulated time.
    fn now(&self) -> TimeInstant;

    /// Update the running flag.
    fn set_running(&self, running: bool);

    /// Mark the process terminated for good.
    fn set_terminated(&self);

    /// Hand a fatal error to the run controller.
    fn abort(&self, error: KernelError);
}

/// One pass of a process's behaviour.
pub trait LifeCycle: Send {
    /// Short description used when the body fails, e.g. `"Clerk::life_cycle"`.
    fn describe(&self) -> String;

    /// Run the life cycle once.
    fn run(&mut self) -> LifeCycleFuture<'_>;
}

fn trace_note(host: &dyn RunHost, note: &str) {
    tracing::debug!(
        target: "clockwork::trace",
        process = %host.process_name(),
        time = %host.now(),
        "{note}"
    );
}

/// Describe a panic payload as a failure reason.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// One life-cycle pass with panics turned into a failure reason.
struct CatchPanic<'a> {
    pass: LifeCycleFuture<'a>,
}

impl Future for CatchPanic<'_> {
    type Output = Result<Result<(), BodyError>, String>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let pass = &mut self.get_mut().pass;
        match panic::catch_unwind(AssertUnwindSafe(|| pass.as_mut().poll(cx))) {
            Ok(Poll::Ready(result)) => Poll::Ready(Ok(result)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(panic_message(payload.as_ref()))),
        }
    }
}

/// Execute `body` under `host` until it stops repeating or fails.
pub async fn run_loop(host: Arc<dyn RunHost>, mut body: Box<dyn LifeCycle>, suspender: Suspender) {
    let mut run: u64 = 0;
    let outcome = loop {
        run += 1;
        if host.trace_enabled() {
            if host.is_repeating() {
                trace_note(&*host, &format!("starts (run #{run})"));
            } else {
                trace_note(&*host, "starts");
            }
        }
        match (CatchPanic { pass: body.run() }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => break Err(e),
            Err(reason) => break Err(BodyError::failed(reason)),
        }
        if !host.is_repeating() {
            break Ok(());
        }
    };

    match outcome {
        Ok(()) => {
            if host.trace_enabled() {
                trace_note(&*host, "terminates");
            }
        }
        Err(BodyError::Teardown) => {}
        Err(BodyError::Interrupted(code)) => host.abort(KernelError::UnhandledInterrupt {
            process: host.process_name(),
            code,
            at: host.now(),
        }),
        Err(BodyError::Kernel(e)) => host.abort(e),
        Err(BodyError::Failed(e)) => host.abort(KernelError::ProcessFailed {
            process: host.process_name(),
            body: body.describe(),
            at: host.now(),
            reason: e.to_string(),
        }),
    }

    host.set_running(false);
    host.set_terminated();
    suspender.release();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::ContinuationStrandFactory;
    use crate::factory::{BodyBuilder, BodyFuture, StrandEvent, StrandFactory};
    use crate::park::Wakeup;
    use clockwork_core::{InterruptCode, NoteId, RunCounters};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tracing_test::traced_test;

    struct TestHost {
        runs_left: AtomicUsize,
        trace: bool,
        running: AtomicBool,
        acts: Mutex<Vec<&'static str>>,
        aborts: Mutex<Vec<KernelError>>,
    }

    impl TestHost {
        fn new(runs: usize, trace: bool) -> Arc<Self> {
            Arc::new(Self {
                runs_left: AtomicUsize::new(runs),
                trace,
                running: AtomicBool::new(true),
                acts: Mutex::new(Vec::new()),
                aborts: Mutex::new(Vec::new()),
            })
        }
    }

    impl RunHost for TestHost {
        fn process_name(&self) -> String {
            "Clerk#1".into()
        }

        fn is_repeating(&self) -> bool {
            self.runs_left.load(Ordering::SeqCst) > 0
        }

        fn trace_enabled(&self) -> bool {
            self.trace
        }

        fn now(&self) -> TimeInstant {
            TimeInstant::from_epsilons(7)
        }

        fn set_running(&self, running: bool) {
            self.running.store(running, Ordering::SeqCst);
            self.acts.lock().unwrap().push("not running");
        }

        fn set_terminated(&self) {
            self.acts.lock().unwrap().push("terminated");
        }

        fn abort(&self, error: KernelError) {
            self.aborts.lock().unwrap().push(error);
        }
    }

    /// Plays back one scripted outcome per pass.
    struct Scripted {
        host: Arc<TestHost>,
        outcomes: Vec<Result<(), BodyError>>,
        passes: Arc<AtomicUsize>,
    }

    impl LifeCycle for Scripted {
        fn describe(&self) -> String {
            "Clerk::life_cycle".into()
        }

        fn run(&mut self) -> LifeCycleFuture<'_> {
            Box::pin(async move {
                self.passes.fetch_add(1, Ordering::SeqCst);
                let left = self.host.runs_left.load(Ordering::SeqCst);
                self.host.runs_left.store(left.saturating_sub(1), Ordering::SeqCst);
                if self.outcomes.is_empty() {
                    Ok(())
                } else {
                    self.outcomes.remove(0)
                }
            })
        }
    }

    fn drive(host: &Arc<TestHost>, outcomes: Vec<Result<(), BodyError>>) -> usize {
        let passes = Arc::new(AtomicUsize::new(0));
        let body = Box::new(Scripted {
            host: Arc::clone(host),
            outcomes,
            passes: Arc::clone(&passes),
        });
        let host_dyn: Arc<dyn RunHost> = Arc::clone(host) as Arc<dyn RunHost>;
        let builder: BodyBuilder =
            Box::new(move |s: Suspender| -> BodyFuture { Box::pin(run_loop(host_dyn, body, s)) });
        let factory = ContinuationStrandFactory::new();
        let mut strand = factory.create_named("Clerk#1", builder).unwrap();
        assert_eq!(strand.resume().unwrap(), StrandEvent::Terminated);
        passes.load(Ordering::SeqCst)
    }

    #[test]
    #[traced_test]
    fn single_run_traces_start_and_termination() {
        let host = TestHost::new(0, true);
        assert_eq!(drive(&host, vec![]), 1);
        assert!(logs_contain("starts"));
        assert!(logs_contain("terminates"));
        assert!(!logs_contain("run #"));
        assert!(host.aborts.lock().unwrap().is_empty());
        assert_eq!(*host.acts.lock().unwrap(), vec!["not running", "terminated"]);
        assert!(!host.running.load(Ordering::SeqCst));
    }

    #[test]
    #[traced_test]
    fn repeating_body_numbers_its_runs() {
        let host = TestHost::new(3, true);
        assert_eq!(drive(&host, vec![]), 3);
        assert!(logs_contain("starts (run #1)"));
        assert!(logs_contain("starts (run #3)"));
        assert!(!logs_contain("starts (run #4)"));
        assert!(logs_contain("terminates"));
    }

    #[test]
    #[traced_test]
    fn untraced_process_is_silent() {
        let host = TestHost::new(0, false);
        drive(&host, vec![]);
        assert!(!logs_contain("starts"));
        assert!(!logs_contain("terminates"));
    }

    #[test]
    #[traced_test]
    fn teardown_is_swallowed() {
        let host = TestHost::new(5, true);
        assert_eq!(drive(&host, vec![Ok(()), Err(BodyError::Teardown)]), 2);
        assert!(host.aborts.lock().unwrap().is_empty());
        assert!(!logs_contain("terminates"));
        assert_eq!(*host.acts.lock().unwrap(), vec!["not running", "terminated"]);
    }

    #[test]
    fn escaped_interrupt_aborts_the_run() {
        let counters = RunCounters::new();
        let code = InterruptCode::new(&counters, "breakdown");
        let host = TestHost::new(0, false);
        drive(&host, vec![Err(BodyError::Interrupted(code.clone()))]);
        let aborts = host.aborts.lock().unwrap();
        assert_eq!(
            *aborts,
            vec![KernelError::UnhandledInterrupt {
                process: "Clerk#1".into(),
                code,
                at: TimeInstant::from_epsilons(7),
            }]
        );
        assert_eq!(*host.acts.lock().unwrap(), vec!["not running", "terminated"]);
    }

    #[test]
    fn kernel_errors_are_forwarded_unchanged() {
        let host = TestHost::new(0, false);
        let err = KernelError::NoteNotFound { note: NoteId(9) };
        drive(&host, vec![Err(BodyError::Kernel(err.clone()))]);
        assert_eq!(*host.aborts.lock().unwrap(), vec![err]);
    }

    #[test]
    fn other_failures_are_wrapped_with_context() {
        let host = TestHost::new(0, false);
        drive(&host, vec![Err(BodyError::failed("out of paper"))]);
        let aborts = host.aborts.lock().unwrap();
        match aborts.as_slice() {
            [KernelError::ProcessFailed {
                process,
                body,
                at,
                reason,
            }] => {
                assert_eq!(process, "Clerk#1");
                assert_eq!(body, "Clerk::life_cycle");
                assert_eq!(*at, TimeInstant::from_epsilons(7));
                assert_eq!(reason, "out of paper");
            }
            other => panic!("unexpected aborts {other:?}"),
        }
    }

    /// Panics on its first pass.
    struct Panicking;

    impl LifeCycle for Panicking {
        fn describe(&self) -> String {
            "Clerk::life_cycle".into()
        }

        fn run(&mut self) -> LifeCycleFuture<'_> {
            Box::pin(async { panic!("out of paper") })
        }
    }

    #[test]
    fn panicking_body_becomes_process_failure() {
        let host = TestHost::new(3, false);
        let host_dyn: Arc<dyn RunHost> = Arc::clone(&host) as Arc<dyn RunHost>;
        let builder: BodyBuilder = Box::new(move |s: Suspender| -> BodyFuture {
            Box::pin(run_loop(host_dyn, Box::new(Panicking), s))
        });
        let factory = ContinuationStrandFactory::new();
        let mut strand = factory.create_named("Clerk#1", builder).unwrap();
        assert_eq!(strand.resume().unwrap(), StrandEvent::Terminated);
        assert_eq!(
            *host.aborts.lock().unwrap(),
            vec![KernelError::ProcessFailed {
                process: "Clerk#1".into(),
                body: "Clerk::life_cycle".into(),
                at: TimeInstant::from_epsilons(7),
                reason: "panicked: out of paper".into(),
            }]
        );
        assert_eq!(*host.acts.lock().unwrap(), vec!["not running", "terminated"]);
    }

    #[test]
    fn panic_messages_name_the_payload() {
        assert_eq!(panic_message(&"jam"), "panicked: jam");
        assert_eq!(panic_message(&String::from("jam")), "panicked: jam");
        assert_eq!(panic_message(&42_u8), "panicked");
    }

    /// Parks once per pass; a teardown ends the loop quietly.
    struct Parking {
        suspender: Suspender,
    }

    impl LifeCycle for Parking {
        fn describe(&self) -> String {
            "Parking::life_cycle".into()
        }

        fn run(&mut self) -> LifeCycleFuture<'_> {
            Box::pin(async move {
                match self.suspender.park().await {
                    Wakeup::Resumed => Ok(()),
                    Wakeup::Teardown => Err(BodyError::Teardown),
                }
            })
        }
    }

    #[test]
    fn parked_loop_retires_on_clean_up() {
        let host = TestHost::new(usize::MAX, false);
        let host_dyn: Arc<dyn RunHost> = Arc::clone(&host) as Arc<dyn RunHost>;
        let builder: BodyBuilder = Box::new(move |s: Suspender| -> BodyFuture {
            let body = Box::new(Parking {
                suspender: s.clone(),
            });
            Box::pin(run_loop(host_dyn, body, s))
        });
        let factory = ContinuationStrandFactory::new();
        let mut strand = factory.create_named("parker", builder).unwrap();
        assert_eq!(strand.resume().unwrap(), StrandEvent::Parked);
        assert_eq!(strand.resume().unwrap(), StrandEvent::Parked);
        assert_eq!(factory.clean_up().torn_down, 1);
        assert!(strand.is_terminated());
        assert!(host.aborts.lock().unwrap().is_empty());
        assert_eq!(*host.acts.lock().unwrap(), vec!["not running", "terminated"]);
    }
}
