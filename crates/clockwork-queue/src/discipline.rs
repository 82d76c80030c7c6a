//! Tie-break policies for wait lists.

use clockwork_core::SeededRng;

/// How a wait list orders entities within one priority level.
#[derive(Clone, Debug)]
pub enum Discipline {
    /// Later arrivals queue behind earlier ones of the same priority.
    Fifo,
    /// Later arrivals queue ahead of earlier ones of the same priority.
    Lifo,
    /// Uniformly random slot; priority is ignored.
    Random(SeededRng),
}

impl Discipline {
    /// A random discipline seeded with `seed`.
    pub fn random(seed: u64) -> Self {
        Self::Random(SeededRng::new(seed))
    }

    /// Short name used in reports.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Self::Fifo => "FIFO",
            Self::Lifo => "LIFO",
            Self::Random(_) => "Random",
        }
    }

    /// Restart the random stream. No effect on FIFO and LIFO.
    pub fn set_seed(&mut self, seed: u64) {
        if let Self::Random(rng) = self {
            rng.reseed(seed);
        }
    }

    /// Index at which an entity of `priority` is inserted into a list
    /// whose current priorities, front to back, are `priorities`.
    ///
    /// FIFO and LIFO assume `priorities` is non-increasing.
    pub fn insertion_index(&mut self, priorities: &[i32], priority: i32) -> usize {
        match self {
            // After the last entity whose priority is not lower.
            Self::Fifo => {
                let mut idx = priorities.len();
                while idx > 0 && priorities[idx - 1] < priority {
                    idx -= 1;
                }
                idx
            }
            // Before the first entity whose priority is not higher.
            Self::Lifo => priorities
                .iter()
                .position(|&p| p <= priority)
                .unwrap_or(priorities.len()),
            Self::Random(rng) => rng.index_inclusive(priorities.len()),
        }
    }
}
