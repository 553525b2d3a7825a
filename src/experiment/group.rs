//! Named collections of experiments

use crate::experiment::instance::ExperimentRef;
use crate::experiment::status::Status;
use crate::ids::{Dependent, IdGenerator, Identifiable};
use std::sync::Arc;

/// An identifiable, ordered set of experiments.
///
/// Groups are the usual dependency descriptors handed to the scheduling
/// algorithms: a group "depends on" its members.
#[derive(Debug, Clone)]
pub struct ExperimentGroup {
    id: u64,
    name: String,
    description: String,
    experiments: Vec<ExperimentRef>,
}

impl ExperimentGroup {
    /// Empty group with an ID from the process-wide group generator.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_ids(name, IdGenerator::groups())
    }

    /// Empty group with an ID drawn from `ids`.
    #[must_use]
    pub fn with_ids(name: impl Into<String>, ids: &IdGenerator) -> Self {
        Self::with_id(name, ids.next_id())
    }

    /// Empty group with a fixed ID, for groups that stand for a well-known
    /// collection rather than a user-defined one.
    #[must_use]
    pub fn with_id(name: impl Into<String>, id: u64) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            experiments: Vec::new(),
        }
    }

    /// Group containing `experiments`, duplicates removed.
    #[must_use]
    pub fn of<'a>(
        name: impl Into<String>,
        experiments: impl IntoIterator<Item = &'a ExperimentRef>,
    ) -> Self {
        let mut group = Self::new(name);
        group.extend(experiments);
        group
    }

    /// Group name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an experiment; returns `false` if it was already a member.
    pub fn add(&mut self, experiment: &ExperimentRef) -> bool {
        if self.contains(experiment) {
            return false;
        }
        self.experiments.push(Arc::clone(experiment));
        true
    }

    /// Add several experiments; returns how many were new.
    pub fn extend<'a>(
        &mut self,
        experiments: impl IntoIterator<Item = &'a ExperimentRef>,
    ) -> usize {
        experiments.into_iter().filter(|e| self.add(e)).count()
    }

    /// Remove an experiment; returns `false` if it was not a member.
    pub fn remove(&mut self, experiment: &ExperimentRef) -> bool {
        let before = self.experiments.len();
        self.experiments.retain(|e| e.id() != experiment.id());
        self.experiments.len() != before
    }

    /// Whether `experiment` is a member.
    #[must_use]
    pub fn contains(&self, experiment: &ExperimentRef) -> bool {
        self.experiments.iter().any(|e| e.id() == experiment.id())
    }

    /// Members in insertion order.
    #[must_use]
    pub fn experiments(&self) -> &[ExperimentRef] {
        &self.experiments
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Whether the group has no members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Lowest status among the members.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::lowest(self.experiments.iter().map(|e| e.status()))
    }

    /// Mean progression of the members; 0 for an empty group.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progression(&self) -> f32 {
        if self.experiments.is_empty() {
            return 0.0;
        }
        let total: f32 = self.experiments.iter().map(|e| e.progression()).sum();
        total / self.experiments.len() as f32
    }
}

impl Identifiable for ExperimentGroup {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Dependent<ExperimentRef> for ExperimentGroup {
    fn depends_on(&self) -> &[ExperimentRef] {
        &self.experiments
    }
}
