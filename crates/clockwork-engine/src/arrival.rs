//! Arrival sources: repeating processes that feed new processes into a
//! model at sampled intervals.

use clockwork_core::{BodyError, TimeSpan};
use clockwork_strand::LifeCycleFuture;

use crate::process::{ProcessBody, ProcessContext};

/// A new process produced by a [`SuccessorFactory`].
pub struct Successor {
    /// Base name of the new process.
    pub name: String,
    /// Its body.
    pub body: Box<dyn ProcessBody>,
}

impl Successor {
    /// A successor named `name` running `body`.
    pub fn new<B: ProcessBody>(name: impl Into<String>, body: B) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

/// Produces the processes an [`ArrivalSource`] lets arrive.
pub trait SuccessorFactory: Send + 'static {
    /// The next arrival, or `None` when no more will arrive.
    fn next_instance(&mut self) -> Option<Successor>;
}

impl<F> SuccessorFactory for F
where
    F: FnMut() -> Option<Successor> + Send + 'static,
{
    fn next_instance(&mut self) -> Option<Successor> {
        self()
    }
}

/// Samples inter-arrival times.
pub trait IntervalSource: Send + 'static {
    /// The span until the next arrival.
    fn next_interval(&mut self) -> TimeSpan;
}

impl<F> IntervalSource for F
where
    F: FnMut() -> TimeSpan + Send + 'static,
{
    fn next_interval(&mut self) -> TimeSpan {
        self()
    }
}

/// A constant inter-arrival time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedInterval(pub TimeSpan);

impl IntervalSource for FixedInterval {
    fn next_interval(&mut self) -> TimeSpan {
        self.0
    }
}

/// A repeating process body that lets one successor arrive per run.
///
/// Each run asks the factory for the next instance. `None` ends the
/// source; otherwise the successor is spawned, activated right away
/// (after this source) and the source holds for the next interval. The
/// first arrival happens when the source itself is first activated.
pub struct ArrivalSource<F, I> {
    factory: F,
    intervals: I,
    arrivals: u64,
}

impl<F: SuccessorFactory, I: IntervalSource> ArrivalSource<F, I> {
    /// A source drawing successors from `factory`, spaced by `intervals`.
    pub fn new(factory: F, intervals: I) -> Self {
        Self {
            factory,
            intervals,
            arrivals: 0,
        }
    }

    /// Number of successors let in so far.
    pub fn arrivals(&self) -> u64 {
        self.arrivals
    }
}

impl<F: SuccessorFactory, I: IntervalSource> ProcessBody for ArrivalSource<F, I> {
    fn life_cycle(&mut self, ctx: ProcessContext) -> LifeCycleFuture<'_> {
        Box::pin(async move {
            let Some(successor) = self.factory.next_instance() else {
                ctx.set_repeating(false);
                return Ok::<(), BodyError>(());
            };
            let pid = ctx.spawn(&successor.name, successor.body);
            ctx.activate(pid, TimeSpan::ZERO)?;
            self.arrivals += 1;
            tracing::trace!(arrivals = self.arrivals, "successor arrived");
            ctx.hold(self.intervals.next_interval()).await
        })
    }

    fn describe(&self) -> String {
        "ArrivalSource::life_cycle".to_string()
    }

    fn repeating(&self) -> bool {
        true
    }
}
