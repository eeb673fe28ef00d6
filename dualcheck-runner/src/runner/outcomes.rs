// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ledger::{Outcome, OutcomeKey},
    options::OutcomeRetention,
    reporter::RunStats,
};
use indexmap::IndexMap;

/// Dual-mode outcomes returned by the scheduler.
#[derive(Clone, Debug)]
pub struct OutcomeSet {
    inner: OutcomeSetInner,
}

#[derive(Clone, Debug)]
enum OutcomeSetInner {
    Collapse(IndexMap<OutcomeKey, Outcome>),
    History(Vec<Outcome>),
}

impl OutcomeSet {
    /// Creates an empty set with the given retention.
    pub fn new(retention: OutcomeRetention) -> Self {
        let inner = match retention {
            OutcomeRetention::Collapse => OutcomeSetInner::Collapse(IndexMap::new()),
            OutcomeRetention::History => OutcomeSetInner::History(Vec::new()),
        };
        Self { inner }
    }

    /// Adds an outcome. Under [`OutcomeRetention::Collapse`], an outcome with an equal key
    /// overwrites the earlier one in place.
    pub fn insert(&mut self, outcome: Outcome) {
        match &mut self.inner {
            OutcomeSetInner::Collapse(map) => {
                map.insert(outcome.key(), outcome);
            }
            OutcomeSetInner::History(list) => list.push(outcome),
        }
    }

    /// Iterates over outcomes in insertion order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Outcome> + '_> {
        match &self.inner {
            OutcomeSetInner::Collapse(map) => Box::new(map.values()),
            OutcomeSetInner::History(list) => Box::new(list.iter()),
        }
    }

    /// The number of outcomes.
    pub fn len(&self) -> usize {
        match &self.inner {
            OutcomeSetInner::Collapse(map) => map.len(),
            OutcomeSetInner::History(list) => list.len(),
        }
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the scheduler returns.
#[derive(Clone, Debug)]
pub struct RunOutcomes {
    pub(super) singular: Vec<Outcome>,
    pub(super) dual: OutcomeSet,
    pub(super) stats: RunStats,
}

impl RunOutcomes {
    /// Singular-test outcomes, in run order.
    pub fn singular(&self) -> &[Outcome] {
        &self.singular
    }

    /// Dual-mode outcomes.
    pub fn dual(&self) -> &OutcomeSet {
        &self.dual
    }

    /// Every outcome: singular tests first, then dual-mode tests.
    pub fn iter(&self) -> impl Iterator<Item = &Outcome> + '_ {
        self.singular.iter().chain(self.dual.iter())
    }

    /// Run statistics.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Returns true if every outcome passed.
    pub fn is_success(&self) -> bool {
        self.iter().all(|outcome| outcome.result)
    }
}
