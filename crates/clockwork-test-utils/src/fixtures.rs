//! Reusable process body fixtures.
//!
//! - [`Holder`]: holds for a fixed list of spans, stamping the journal.
//! - [`Sleeper`]: passivates once and reports how it was woken.
//! - [`Failing`]: fails deterministically after N holds.
//! - [`Repeater`]: a repeating body that stops itself after N runs.
//! - [`CountedArrivals`]: a successor factory that runs dry after N.

use clockwork_core::{BodyError, TimeSpan};
use clockwork_engine::{LifeCycleFuture, ProcessBody, ProcessContext, Successor, SuccessorFactory};

use crate::{span, Journal};

/// Stamps `"label:start@t"`, then `"label@t"` after every hold.
pub struct Holder {
    pub label: String,
    pub holds: Vec<i64>,
    pub journal: Journal,
}

impl Holder {
    pub fn new(label: impl Into<String>, holds: &[i64], journal: &Journal) -> Self {
        Self {
            label: label.into(),
            holds: holds.to_vec(),
            journal: journal.clone(),
        }
    }
}

impl ProcessBody for Holder {
    fn life_cycle(&mut self, ctx: ProcessContext) -> LifeCycleFuture<'_> {
        Box::pin(async move {
            self.journal
                .stamp(&format!("{}:start", self.label), ctx.now());
            for &n in &self.holds {
                ctx.hold(span(n)).await?;
                self.journal.stamp(&self.label, ctx.now());
            }
            Ok(())
        })
    }

    fn describe(&self) -> String {
        format!("Holder({})::life_cycle", self.label)
    }
}

/// Passivates once. Records `"label woke@t"` when activated, or
/// `"label interrupted:<code name>@t"` when interrupted, in which case it
/// clears the code and returns normally.
pub struct Sleeper {
    pub label: String,
    pub journal: Journal,
}

impl Sleeper {
    pub fn new(label: impl Into<String>, journal: &Journal) -> Self {
        Self {
            label: label.into(),
            journal: journal.clone(),
        }
    }
}

impl ProcessBody for Sleeper {
    fn life_cycle(&mut self, ctx: ProcessContext) -> LifeCycleFuture<'_> {
        Box::pin(async move {
            match ctx.passivate().await {
                Ok(()) => self
                    .journal
                    .stamp(&format!("{} woke", self.label), ctx.now()),
                Err(BodyError::Interrupted(code)) => {
                    self.journal.stamp(
                        &format!("{} interrupted:{}", self.label, code.name()),
                        ctx.now(),
                    );
                    ctx.clear_interrupt_code();
                }
                Err(e) => return Err(e),
            }
            Ok(())
        })
    }
}

/// Holds one epsilon `after` times, then fails with `message`.
pub struct Failing {
    pub after: usize,
    pub message: &'static str,
}

impl ProcessBody for Failing {
    fn life_cycle(&mut self, ctx: ProcessContext) -> LifeCycleFuture<'_> {
        Box::pin(async move {
            for _ in 0..self.after {
                ctx.hold(span(1)).await?;
            }
            Err(BodyError::failed(self.message))
        })
    }

    fn describe(&self) -> String {
        "Failing::life_cycle".to_string()
    }
}

/// Repeats, holding `interval` per run and stamping `"label#run@t"`,
/// until `runs` runs have completed.
pub struct Repeater {
    pub label: String,
    pub runs: usize,
    pub interval: TimeSpan,
    pub journal: Journal,
    done: usize,
}

impl Repeater {
    pub fn new(label: impl Into<String>, runs: usize, interval: i64, journal: &Journal) -> Self {
        Self {
            label: label.into(),
            runs,
            interval: span(interval),
            journal: journal.clone(),
            done: 0,
        }
    }
}

impl ProcessBody for Repeater {
    fn life_cycle(&mut self, ctx: ProcessContext) -> LifeCycleFuture<'_> {
        Box::pin(async move {
            self.done += 1;
            self.journal
                .stamp(&format!("{}#{}", self.label, self.done), ctx.now());
            if self.done >= self.runs {
                ctx.set_repeating(false);
                return Ok(());
            }
            ctx.hold(self.interval).await
        })
    }

    fn repeating(&self) -> bool {
        true
    }
}

/// Produces `remaining` [`Holder`] successors named `base`, each holding
/// for `holds` and labelled `base1`, `base2`, ...
pub struct CountedArrivals {
    pub base: String,
    pub remaining: usize,
    pub holds: Vec<i64>,
    pub journal: Journal,
    issued: usize,
}

impl CountedArrivals {
    pub fn new(base: impl Into<String>, count: usize, holds: &[i64], journal: &Journal) -> Self {
        Self {
            base: base.into(),
            remaining: count,
            holds: holds.to_vec(),
            journal: journal.clone(),
            issued: 0,
        }
    }
}

impl SuccessorFactory for CountedArrivals {
    fn next_instance(&mut self) -> Option<Successor> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.issued += 1;
        let label = format!("{}{}", self.base, self.issued);
        Some(Successor::new(
            self.base.clone(),
            Holder::new(label, &self.holds, &self.journal),
        ))
    }
}
