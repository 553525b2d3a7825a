//! Partial coverage of dependency groups
//!
//! [`Subsample`] keeps a subset of the items such that every dependency
//! group is covered at least up to a fraction `f`, but no group is covered
//! entirely. Selection is greedy: the least covered group gives up its next
//! item until it reaches `f`, then the next least covered group, and so on.
//! The selection is refined over a few iterations, each starting from the
//! previous selection.

use crate::error::{Error, Result};
use crate::ids::{Dependent, Identifiable};
use crate::schedule::{dependency_lists, Randomness, Scheduler};
use rand::seq::SliceRandom;
use rustc_hash::FxHashSet;
use tracing::debug;

/// Default number of refinement iterations
pub const DEFAULT_ITERATIONS: usize = 3;

/// Coverage of one dependency group during an iteration.
struct Coverage {
    remaining: Vec<u64>,
    total: usize,
    picked: usize,
}

impl Coverage {
    #[allow(clippy::cast_precision_loss)]
    fn fraction(&self) -> f32 {
        self.picked as f32 / self.total as f32
    }

    /// Coverage the group would reach if all its remaining items were kept.
    #[allow(clippy::cast_precision_loss)]
    fn max_fraction(&self) -> f32 {
        (self.picked + self.remaining.len()) as f32 / self.total as f32
    }

    fn pick(&mut self, id: u64) {
        if let Some(pos) = self.remaining.iter().position(|&r| r == id) {
            self.remaining.remove(pos);
            self.picked += 1;
        }
    }
}

/// Sub-list covering each dependency group to at least a fraction.
///
/// Items that belong to no dependency group are dropped. The output keeps
/// the input order.
#[derive(Debug, Clone)]
pub struct Subsample {
    fraction: f32,
    groups: Vec<Vec<u64>>,
    shuffle_first: bool,
    iterations: usize,
    random: Randomness,
}

impl Subsample {
    /// Subsample covering the dependencies of `descriptors` up to `fraction`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if `fraction` is not strictly between 0 and 1.
    pub fn new<'a, D, T>(
        fraction: f32,
        descriptors: impl IntoIterator<Item = &'a D>,
    ) -> Result<Self>
    where
        D: Dependent<T> + 'a + ?Sized,
        T: Identifiable,
    {
        Self::from_id_lists(fraction, dependency_lists(descriptors))
    }

    /// Subsample over explicit lists of item IDs.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if `fraction` is not strictly between 0 and 1.
    pub fn from_id_lists<I, J>(fraction: f32, lists: I) -> Result<Self>
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = u64>,
    {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(Error::InvalidInput(format!(
                "subsample fraction must be in (0, 1), got {fraction}"
            )));
        }
        Ok(Self {
            fraction,
            groups: lists
                .into_iter()
                .map(|list| {
                    let mut seen = FxHashSet::default();
                    list.into_iter().filter(|id| seen.insert(*id)).collect()
                })
                .collect(),
            shuffle_first: true,
            iterations: DEFAULT_ITERATIONS,
            random: Randomness::new(None),
        })
    }

    /// Whether each group's items are shuffled before picking (default
    /// `true`). Without shuffling the selection is deterministic.
    #[must_use]
    pub const fn shuffle_first(mut self, shuffle: bool) -> Self {
        self.shuffle_first = shuffle;
        self
    }

    /// Seed the shuffling; [`Scheduler::restart`] replays it.
    #[must_use]
    pub fn seeded(mut self, seed: u64) -> Self {
        self.random = Randomness::new(Some(seed));
        self
    }

    /// Maximum number of refinement iterations (at least 1).
    #[must_use]
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    /// Target coverage fraction
    #[must_use]
    pub const fn fraction(&self) -> f32 {
        self.fraction
    }

    /// Select the items to keep, in input order.
    pub fn select<T: Identifiable + Clone>(&mut self, items: &[T]) -> Vec<T> {
        let mut kept: FxHashSet<u64> = items.iter().map(Identifiable::id).collect();

        for iteration in 0..self.iterations {
            let selected = self.refine(&kept, iteration == 0);
            let stable = selected.len() == kept.len();
            kept = selected;
            if stable {
                break;
            }
        }

        debug!(input = items.len(), kept = kept.len(), fraction = self.fraction, "subsampled");
        items
            .iter()
            .filter(|item| kept.contains(&item.id()))
            .cloned()
            .collect()
    }

    fn refine(&mut self, kept: &FxHashSet<u64>, first: bool) -> FxHashSet<u64> {
        let fraction = self.fraction;
        let mut coverage = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let mut remaining = group.clone();
            if self.shuffle_first {
                remaining.shuffle(self.random.rng());
            }
            let total = remaining.len();
            remaining.retain(|id| kept.contains(id));
            if remaining.is_empty() {
                continue;
            }
            let cov = Coverage {
                remaining,
                total,
                picked: 0,
            };
            // A group that cannot reach the target from the input is left out
            if !first || cov.max_fraction() >= fraction {
                coverage.push(cov);
            }
        }

        let mut selected = FxHashSet::default();
        coverage.sort_by(|a, b| a.fraction().total_cmp(&b.fraction()));
        while let Some(head) = coverage.first() {
            let Some(&pick) = head.remaining.first() else {
                coverage.remove(0);
                continue;
            };
            selected.insert(pick);
            for cov in &mut coverage {
                cov.pick(pick);
            }
            coverage.retain(|c| c.fraction() < fraction);
            coverage.sort_by(|a, b| a.fraction().total_cmp(&b.fraction()));
        }
        selected
    }
}

impl<T: Identifiable + Clone> Scheduler<T> for Subsample {
    fn schedule(&mut self, items: &[T]) -> Vec<T> {
        self.select(items)
    }

    fn restart(&mut self) {
        self.random.restart();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn coverage(group: &[u64], out: &[u64]) -> f32 {
        let kept = group.iter().filter(|id| out.contains(id)).count();
        kept as f32 / group.len() as f32
    }

    #[test]
    fn test_two_groups_half_covered() {
        let groups = [vec![1, 3, 5], vec![2, 4, 6]];
        let mut sub = Subsample::from_id_lists(0.5, groups.clone())
            .unwrap()
            .shuffle_first(false);
        let out = sub.select(&[1_u64, 2, 3, 4, 5, 6]);

        assert!(out.len() < 6);
        for group in &groups {
            let c = coverage(group, &out);
            assert!(c >= 0.5, "coverage {c} of {group:?}");
            assert!(c < 1.0);
        }
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_pair_keeps_one() {
        let mut sub = Subsample::from_id_lists(0.5, [vec![7, 8]])
            .unwrap()
            .shuffle_first(false);
        assert_eq!(sub.select(&[8_u64, 7]), vec![7]);
    }

    #[test]
    fn test_ungrouped_items_are_dropped() {
        let mut sub = Subsample::from_id_lists(0.3, [vec![1, 2, 3, 4]])
            .unwrap()
            .shuffle_first(false);
        let out = sub.select(&[10_u64, 1, 11, 2, 3, 4]);
        assert!(!out.contains(&10) && !out.contains(&11));
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn test_group_outside_input_is_left_out() {
        // Only one of the four members is offered: 25% < 50%
        let mut sub = Subsample::from_id_lists(0.5, [vec![1, 2, 3, 4], vec![5, 6]])
            .unwrap()
            .shuffle_first(false);
        assert_eq!(sub.select(&[1_u64, 5, 6]), vec![5]);
    }

    #[test]
    fn test_seeded_selection_replays() {
        let groups: Vec<Vec<u64>> = (0..4).map(|g| (g * 10..g * 10 + 10).collect()).collect();
        let items: Vec<u64> = (0..40).collect();
        let mut sub = Subsample::from_id_lists(0.4, groups).unwrap().seeded(9);
        let first = sub.select(&items);
        Scheduler::<u64>::restart(&mut sub);
        assert_eq!(sub.select(&items), first);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_fraction_out_of_range() {
        for fraction in [0.0, 1.0, -0.5, 1.5, f32::NAN] {
            let err = Subsample::from_id_lists(fraction, [vec![1_u64]]).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)));
        }
    }

    #[test]
    fn test_empty_input() {
        let mut sub = Subsample::from_id_lists(0.5, [vec![1, 2]]).unwrap();
        assert!(sub.select::<u64>(&[]).is_empty());
        assert!((sub.fraction() - 0.5).abs() < f32::EPSILON);
    }
}
