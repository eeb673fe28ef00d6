// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events emitted by the scheduler.
//!
//! These are consumed by the [`DisplayReporter`](super::DisplayReporter), and by anything else a
//! caller passes as the scheduler callback.

use crate::{
    catalog::SelectedTest,
    compare::ComparisonReport,
    ledger::Outcome,
    options::Identity,
    runner::{AttemptStatus, AttemptStatuses},
};
use chrono::{DateTime, Local};
use std::time::Duration;

/// Whether a test runs once per identity or once overall.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptMode {
    /// One attempt per identity.
    Dual,

    /// One attempt under the global identity, after all dual-mode tests.
    Singular,
}

/// A scheduler event.
#[derive(Clone, Debug)]
pub enum RunEvent<'a> {
    /// The run started.
    RunStarted {
        /// The number of distinct dual-mode tests.
        dual_count: usize,

        /// The number of distinct singular tests.
        singular_count: usize,

        /// Whether each dual-mode test runs under both identities.
        run_dual: bool,

        /// The global identity.
        identity: Identity,
    },

    /// A test started running under an identity.
    TestStarted {
        /// The test.
        test: SelectedTest<'a>,

        /// The identity.
        identity: Identity,

        /// Dual or singular.
        mode: AttemptMode,
    },

    /// A test attempt was skipped because its identity wasn't requested.
    TestSkipped {
        /// The test.
        test: SelectedTest<'a>,

        /// The identity that wasn't requested.
        identity: Identity,
    },

    /// An attempt failed and will be retried.
    TestAttemptFailedWillRetry {
        /// The test.
        test: SelectedTest<'a>,

        /// The identity.
        identity: Identity,

        /// The failed attempt.
        status: &'a AttemptStatus,
    },

    /// A test finished running under an identity, after any retries.
    TestFinished {
        /// The test.
        test: SelectedTest<'a>,

        /// The identity.
        identity: Identity,

        /// Every attempt.
        statuses: &'a AttemptStatuses,

        /// The outcome recorded for the final attempt.
        outcome: &'a Outcome,
    },

    /// A recorded step was compared across identities.
    ComparisonFinished {
        /// The comparison.
        report: &'a ComparisonReport,
    },

    /// The run finished.
    RunFinished {
        /// When the run started.
        start_time: DateTime<Local>,

        /// How long the run took.
        elapsed: Duration,

        /// Statistics.
        stats: RunStats,
    },
}

/// Statistics for a run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// Test-identity pairs that were run, counting singular tests once.
    pub finished_count: usize,

    /// Pairs whose first attempt passed.
    pub passed: usize,

    /// Pairs that passed after at least one failed attempt.
    pub flaky: usize,

    /// Pairs whose every attempt failed.
    pub failed: usize,

    /// Pairs that weren't run because this was a dry run.
    pub dry_run: usize,

    /// Pairs skipped because their identity wasn't requested.
    pub skipped: usize,

    /// Tests dropped because an equal test was already scheduled.
    pub duplicates: usize,

    /// Comparisons performed.
    pub comparisons: usize,

    /// Comparisons that found differences.
    pub comparisons_with_differences: usize,
}

impl RunStats {
    /// Returns true if nothing failed and nothing was skipped by a dry run.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.dry_run == 0
    }
}
