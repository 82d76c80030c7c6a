//! Both strand backends honour the same contract.

use std::sync::{Arc, Mutex};

use clockwork_strand::{
    BodyBuilder, BodyFuture, ContinuationStrandFactory, Strand, StrandBackend, StrandEvent,
    StrandFactory, Suspender, ThreadConfig, ThreadStrandFactory, Wakeup,
};

type Journal = Arc<Mutex<Vec<String>>>;

fn factories() -> Vec<Box<dyn StrandFactory>> {
    vec![
        Box::new(ThreadStrandFactory::new(ThreadConfig::default())),
        Box::new(ContinuationStrandFactory::new()),
    ]
}

/// Records `name:step` before each park, `name:done` at the end, and
/// `name:teardown` if woken for teardown.
fn journaling(name: &'static str, steps: usize, journal: Journal) -> BodyBuilder {
    Box::new(move |s: Suspender| -> BodyFuture {
        Box::pin(async move {
            for step in 0..steps {
                journal.lock().unwrap().push(format!("{name}:{step}"));
                if s.park().await == Wakeup::Teardown {
                    journal.lock().unwrap().push(format!("{name}:teardown"));
                    s.release();
                    return;
                }
            }
            journal.lock().unwrap().push(format!("{name}:done"));
            s.release();
        })
    })
}

/// Round-robin resume until every strand terminates.
fn round_robin(strands: &mut [Box<dyn Strand>]) {
    loop {
        let mut live = false;
        for strand in strands.iter_mut() {
            if strand.is_terminated() {
                continue;
            }
            live = true;
            strand.resume().unwrap();
        }
        if !live {
            break;
        }
    }
}

#[test]
fn interleaving_is_identical_across_backends() {
    let mut journals = Vec::new();
    for factory in factories() {
        let journal: Journal = Arc::default();
        let mut strands = vec![
            factory
                .create_named("a", journaling("a", 3, Arc::clone(&journal)))
                .unwrap(),
            factory
                .create_named("b", journaling("b", 1, Arc::clone(&journal)))
                .unwrap(),
            factory
                .create_named("c", journaling("c", 2, Arc::clone(&journal)))
                .unwrap(),
        ];
        round_robin(&mut strands);
        assert_eq!(factory.clean_up().torn_down, 0);
        let entries = journal.lock().unwrap().clone();
        journals.push((factory.backend(), entries));
    }
    let (_, threads) = &journals[0];
    let (_, continuations) = &journals[1];
    assert_eq!(threads, continuations);
    assert_eq!(
        threads,
        &[
            "a:0", "b:0", "c:0", "a:1", "b:done", "c:1", "a:2", "c:done", "a:done"
        ]
    );
}

#[test]
fn clean_up_retires_survivors_on_both_backends() {
    for factory in factories() {
        let journal: Journal = Arc::default();
        let mut parked = factory
            .create_named("p", journaling("p", 5, Arc::clone(&journal)))
            .unwrap();
        let _never = factory
            .create_named("n", journaling("n", 5, Arc::clone(&journal)))
            .unwrap();
        assert_eq!(parked.resume().unwrap(), StrandEvent::Parked);

        let report = factory.clean_up();
        assert_eq!(report.torn_down, 1, "{}", factory.backend());
        assert_eq!(report.discarded, 1, "{}", factory.backend());
        assert_eq!(*journal.lock().unwrap(), vec!["p:0", "p:teardown"]);
    }
}

#[test]
fn at_most_one_strand_runs_at_a_time() {
    let factory = ThreadStrandFactory::new(ThreadConfig::default());
    let active = Arc::new(Mutex::new(0usize));
    let peak = Arc::new(Mutex::new(0usize));
    let mut strands: Vec<Box<dyn Strand>> = (0..8)
        .map(|i| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let body: BodyBuilder = Box::new(move |s: Suspender| -> BodyFuture {
                Box::pin(async move {
                    for _ in 0..4 {
                        {
                            let mut a = active.lock().unwrap();
                            *a += 1;
                            let mut p = peak.lock().unwrap();
                            *p = (*p).max(*a);
                        }
                        std::thread::yield_now();
                        *active.lock().unwrap() -= 1;
                        if s.park().await == Wakeup::Teardown {
                            break;
                        }
                    }
                    s.release();
                })
            });
            factory.create_named(&format!("w{i}"), body).unwrap()
        })
        .collect();
    round_robin(&mut strands);
    assert_eq!(*peak.lock().unwrap(), 1);
    assert_eq!(factory.backend(), StrandBackend::Threads);
}
