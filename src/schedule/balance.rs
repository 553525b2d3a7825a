//! Interleaving of items that share dependencies
//!
//! Items are bucketed by *signature*: the set of descriptors whose
//! dependencies contain the item. Two buckets conflict when their signatures
//! share a descriptor, and every bucket conflicts with itself. The order of
//! the grouped items is a walk over the buckets in which no two consecutive
//! steps conflict, found by a depth-first search that always tries the
//! largest bucket first (then the most constrained one). When no such walk
//! exists, or the search runs out of steps, the buckets are drained greedily
//! instead and some same-set neighbours remain. Items in no dependency set
//! come last, in their original order.

use crate::ids::{Dependent, Identifiable};
use crate::schedule::{dependency_lists, Scheduler};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::VecDeque;

/// Steps the conflict-free search may spend beyond a straight pass
const SEARCH_BUDGET: usize = 4096;

struct Bucket<T> {
    signature: Vec<usize>,
    items: VecDeque<T>,
}

impl<T> Bucket<T> {
    fn shares_with(&self, other: &Self) -> bool {
        self.signature.iter().any(|g| other.signature.contains(g))
    }
}

/// Permutation that keeps items of the same dependency set apart.
#[derive(Debug, Clone, Default)]
pub struct BalanceObjects {
    groups: Vec<FxHashSet<u64>>,
}

impl BalanceObjects {
    /// Balance according to the dependencies of `descriptors`.
    pub fn new<'a, D, T>(descriptors: impl IntoIterator<Item = &'a D>) -> Self
    where
        D: Dependent<T> + 'a + ?Sized,
        T: Identifiable,
    {
        Self::from_id_sets(dependency_lists(descriptors))
    }

    /// Balance according to explicit sets of item IDs.
    pub fn from_id_sets<I, J>(sets: I) -> Self
    where
        I: IntoIterator<Item = J>,
        J: IntoIterator<Item = u64>,
    {
        Self {
            groups: sets
                .into_iter()
                .map(|set| set.into_iter().collect())
                .collect(),
        }
    }

    /// Number of dependency sets
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn signature(&self, id: u64) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, group)| group.contains(&id))
            .map(|(index, _)| index)
            .collect()
    }

    /// Reorder `items`; the output is a permutation of the input.
    #[must_use]
    pub fn arrange<T: Identifiable + Clone>(&self, items: &[T]) -> Vec<T> {
        let mut buckets: Vec<Bucket<T>> = Vec::new();
        let mut by_signature: FxHashMap<Vec<usize>, usize> = FxHashMap::default();
        let mut ungrouped = Vec::new();

        for item in items {
            let signature = self.signature(item.id());
            if signature.is_empty() {
                ungrouped.push(item.clone());
                continue;
            }
            let index = *by_signature.entry(signature.clone()).or_insert_with(|| {
                buckets.push(Bucket {
                    signature,
                    items: VecDeque::new(),
                });
                buckets.len() - 1
            });
            buckets[index].items.push_back(item.clone());
        }

        let order = Walk::new(&buckets)
            .search()
            .unwrap_or_else(|| greedy_walk(&buckets));
        let mut out = Vec::with_capacity(items.len());
        for index in order {
            if let Some(item) = buckets[index].items.pop_front() {
                out.push(item);
            }
        }
        out.extend(ungrouped);
        out
    }
}

/// Bucket sequence draining the largest bucket compatible with the previous
/// step, or the largest bucket at all when none is compatible.
fn greedy_walk<T>(buckets: &[Bucket<T>]) -> Vec<usize> {
    let mut counts: Vec<usize> = buckets.iter().map(|b| b.items.len()).collect();
    let mut order = Vec::with_capacity(counts.iter().sum());
    let mut previous: Option<usize> = None;
    loop {
        let largest = |compatible_only: bool| {
            counts
                .iter()
                .enumerate()
                .filter(|(_, &count)| count > 0)
                .filter(|(index, _)| {
                    !compatible_only
                        || previous.map_or(true, |p| !buckets[p].shares_with(&buckets[*index]))
                })
                .min_by_key(|(index, &count)| (Reverse(count), *index))
                .map(|(index, _)| index)
        };
        let Some(next) = largest(true).or_else(|| largest(false)) else {
            break;
        };
        counts[next] -= 1;
        order.push(next);
        previous = Some(next);
    }
    order
}

/// Depth-first search for a bucket sequence without conflicting neighbours.
struct Walk {
    /// Other buckets sharing a descriptor, per bucket
    conflicts: Vec<Vec<usize>>,
    counts: Vec<usize>,
    /// States `(counts, last bucket)` known to have no completion
    dead: FxHashSet<(Vec<usize>, usize)>,
    budget: usize,
}

impl Walk {
    fn new<T>(buckets: &[Bucket<T>]) -> Self {
        let conflicts = (0..buckets.len())
            .map(|i| {
                (0..buckets.len())
                    .filter(|&j| j != i && buckets[i].shares_with(&buckets[j]))
                    .collect()
            })
            .collect();
        let counts: Vec<usize> = buckets.iter().map(|b| b.items.len()).collect();
        Self {
            conflicts,
            budget: counts.iter().sum::<usize>() + SEARCH_BUDGET,
            counts,
            dead: FxHashSet::default(),
        }
    }

    /// Non-empty buckets that may follow `previous`, best last.
    fn candidates(&self, previous: Option<usize>) -> Vec<usize> {
        let mut candidates: Vec<usize> = (0..self.counts.len())
            .filter(|&b| self.counts[b] > 0)
            .filter(|&b| previous.map_or(true, |p| p != b && !self.conflicts[p].contains(&b)))
            .collect();
        candidates.sort_by_cached_key(|&b| {
            let degree = self.conflicts[b]
                .iter()
                .filter(|&&c| self.counts[c] > 0)
                .count();
            (Reverse(self.counts[b]), Reverse(degree), b)
        });
        candidates.reverse();
        candidates
    }

    fn search(mut self) -> Option<Vec<usize>> {
        let total: usize = self.counts.iter().sum();
        let mut path = Vec::with_capacity(total);
        if total == 0 {
            return Some(path);
        }

        let mut frames = vec![self.candidates(None)];
        while let Some(options) = frames.last_mut() {
            let Some(bucket) = options.pop() else {
                frames.pop();
                if let Some(last) = path.pop() {
                    self.dead.insert((self.counts.clone(), last));
                    self.counts[last] += 1;
                }
                continue;
            };

            if self.budget == 0 {
                return None;
            }
            self.budget -= 1;
            self.counts[bucket] -= 1;
            path.push(bucket);
            if path.len() == total {
                return Some(path);
            }
            if !self.dead.is_empty() && self.dead.contains(&(self.counts.clone(), bucket)) {
                path.pop();
                self.counts[bucket] += 1;
                continue;
            }
            frames.push(self.candidates(Some(bucket)));
        }
        None
    }
}

impl<T: Identifiable + Clone> Scheduler<T> for BalanceObjects {
    fn schedule(&mut self, items: &[T]) -> Vec<T> {
        self.arrange(items)
    }
}
