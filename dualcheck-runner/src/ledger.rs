// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ordered record of per-attempt outcomes.

use crate::options::Identity;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The result of one attempt of one test under one identity.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Outcome {
    /// Whether the attempt passed.
    pub result: bool,

    /// The name of the test.
    pub test_name: String,

    /// The identity the attempt ran under.
    pub identity: Identity,

    /// Whether the test is a nested scenario.
    pub is_scenario: bool,
}

impl Outcome {
    /// The key outcomes collapse on: result, test name and identity.
    pub fn key(&self) -> OutcomeKey {
        OutcomeKey {
            result: self.result,
            test_name: self.test_name.clone(),
            identity: self.identity,
        }
    }
}

/// Outcomes with equal keys are interchangeable.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct OutcomeKey {
    /// Whether the attempt passed.
    pub result: bool,

    /// The name of the test.
    pub test_name: String,

    /// The identity the attempt ran under.
    pub identity: Identity,
}

/// Every outcome recorded during a run, in order.
#[derive(Clone, Debug, Default)]
pub struct ResultLedger {
    entries: Vec<Outcome>,
}

impl ResultLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an outcome.
    ///
    /// If `replace_failure` is true, the first earlier failure for the same test and identity is
    /// removed first, so a retried test keeps a single entry per identity. This applies whatever
    /// the new result is: a success replaces the failure, and repeated failures collapse into the
    /// latest one.
    pub fn record(&mut self, outcome: Outcome, replace_failure: bool) {
        if replace_failure {
            let earlier_failure = self.entries.iter().position(|entry| {
                !entry.result
                    && entry.identity == outcome.identity
                    && entry.test_name == outcome.test_name
            });
            if let Some(index) = earlier_failure {
                self.entries.remove(index);
            }
        }
        self.entries.push(outcome);
    }

    /// The outcomes, in order.
    pub fn entries(&self) -> &[Outcome] {
        &self.entries
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A [`ResultLedger`] shared between the scheduler and the interrupt handler.
#[derive(Clone, Debug, Default)]
pub struct SharedLedger {
    inner: Arc<Mutex<ResultLedger>>,
}

impl SharedLedger {
    /// Creates an empty shared ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an outcome. See [`ResultLedger::record`].
    pub fn record(&self, outcome: Outcome, replace_failure: bool) {
        self.lock().record(outcome, replace_failure);
    }

    /// Returns a copy of the ledger as it stands.
    pub fn snapshot(&self) -> ResultLedger {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, ResultLedger> {
        // A partially updated Vec is still a valid ledger.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
