//! Scheduling transforms applied to a list of items before it is enqueued
//!
//! A [`Scheduler`] turns an ordered list into another ordered list: a
//! permutation ([`BalanceObjects`], [`Shuffle`]) or a sub-list
//! ([`Subsample`], [`RandomDecimate`]). Dependency-aware schedulers take
//! their descriptors as anything implementing [`Dependent`], and compare
//! items by [`Identifiable::id`].
//!
//! Toyota Way Principles:
//! - Heijunka: [`BalanceObjects`] spreads items sharing a dependency so a
//!   multi-worker pool does not serialize on them
//! - Muda: [`Subsample`] keeps only enough items to partially cover every
//!   dependency group

mod balance;
mod subsample;

pub use balance::BalanceObjects;
pub use subsample::Subsample;

use crate::ids::{Dependent, Identifiable};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;

/// Reorders or subsets a list of items.
pub trait Scheduler<T> {
    /// Produce the scheduled list from `items`.
    fn schedule(&mut self, items: &[T]) -> Vec<T>;

    /// Return to the initial state (e.g. re-seed a random source).
    fn restart(&mut self) {}
}

/// Dependency IDs of each descriptor, in the descriptor's order.
pub(crate) fn dependency_lists<'a, D, T>(
    descriptors: impl IntoIterator<Item = &'a D>,
) -> Vec<Vec<u64>>
where
    D: Dependent<T> + 'a + ?Sized,
    T: Identifiable,
{
    descriptors
        .into_iter()
        .map(|d| {
            let mut seen = FxHashSet::default();
            d.depends_on()
                .iter()
                .map(Identifiable::id)
                .filter(|id| seen.insert(*id))
                .collect()
        })
        .collect()
}

/// Random source that can be replayed from its seed.
#[derive(Debug, Clone)]
pub(crate) struct Randomness {
    seed: Option<u64>,
    rng: StdRng,
}

impl Randomness {
    pub(crate) fn new(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self { seed, rng }
    }

    pub(crate) fn restart(&mut self) {
        if let Some(seed) = self.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// Random permutation of the items.
#[derive(Debug, Clone)]
pub struct Shuffle {
    random: Randomness,
}

impl Shuffle {
    /// Shuffle with an entropy-seeded source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            random: Randomness::new(None),
        }
    }

    /// Shuffle with a fixed seed; [`Scheduler::restart`] replays it.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            random: Randomness::new(Some(seed)),
        }
    }
}

impl Default for Shuffle {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Scheduler<T> for Shuffle {
    fn schedule(&mut self, items: &[T]) -> Vec<T> {
        let mut out = items.to_vec();
        out.shuffle(self.random.rng());
        out
    }

    fn restart(&mut self) {
        self.random.restart();
    }
}

/// Keeps each item independently with probability 1/2, in order.
#[derive(Debug, Clone)]
pub struct RandomDecimate {
    random: Randomness,
}

impl RandomDecimate {
    /// Decimate with an entropy-seeded source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            random: Randomness::new(None),
        }
    }

    /// Decimate with a fixed seed; [`Scheduler::restart`] replays it.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            random: Randomness::new(Some(seed)),
        }
    }
}

impl Default for RandomDecimate {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Scheduler<T> for RandomDecimate {
    fn schedule(&mut self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .filter(|_| self.random.rng().gen_bool(0.5))
            .cloned()
            .collect()
    }

    fn restart(&mut self) {
        self.random.restart();
    }
}
