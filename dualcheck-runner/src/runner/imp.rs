// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    AttemptDescription, AttemptResult, AttemptStatuses, OutcomeSet, RetryPolicy, RunOutcomes,
};
use crate::{
    catalog::SelectedTest,
    compare::{Comparator, DiffConfig},
    identity::{IdentityGuard, IdentitySwitcher, IdentityUsers},
    ledger::{Outcome, SharedLedger},
    options::{Identity, RunOptions},
    recorder::{EvidenceStore, TestContext},
    reporter::{AttemptMode, RunEvent, RunStats},
    runner::panic_message,
    time::stopwatch,
};
use std::{
    convert::Infallible,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use tracing::{debug, error};

/// Test runner options.
#[derive(Clone, Debug, Default)]
pub struct DualModeSchedulerBuilder {
    comparator: Comparator,
    ledger: SharedLedger,
    default_diff: DiffConfig,
    users: IdentityUsers,
}

impl DualModeSchedulerBuilder {
    /// Creates a builder with no diff export, a fresh ledger and the default identity users.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the comparator run after each dual-mode attempt.
    pub fn set_comparator(&mut self, comparator: Comparator) -> &mut Self {
        self.comparator = comparator;
        self
    }

    /// Sets the ledger outcomes are appended to.
    pub fn set_ledger(&mut self, ledger: SharedLedger) -> &mut Self {
        self.ledger = ledger;
        self
    }

    /// Sets the diff configuration used for responses retained by default.
    pub fn set_default_diff(&mut self, config: DiffConfig) -> &mut Self {
        self.default_diff = config;
        self
    }

    /// Sets the users impersonated for each identity.
    pub fn set_identity_users(&mut self, users: IdentityUsers) -> &mut Self {
        self.users = users;
        self
    }

    /// Creates a new scheduler.
    ///
    /// If `switcher` is given, every attempt runs with the identity's user impersonated.
    pub fn build<'a>(
        &self,
        options: RunOptions,
        switcher: Option<&'a mut dyn IdentitySwitcher>,
    ) -> DualModeScheduler<'a> {
        DualModeScheduler {
            options,
            comparator: self.comparator.clone(),
            ledger: self.ledger.clone(),
            default_diff: Arc::new(self.default_diff.clone()),
            users: self.users.clone(),
            switcher,
            evidence: EvidenceStore::new(),
        }
    }
}

/// Runs each selected test once per identity, then singular tests once.
#[derive(Debug)]
pub struct DualModeScheduler<'a> {
    options: RunOptions,
    comparator: Comparator,
    ledger: SharedLedger,
    default_diff: Arc<DiffConfig>,
    users: IdentityUsers,
    switcher: Option<&'a mut dyn IdentitySwitcher>,
    evidence: EvidenceStore,
}

impl DualModeScheduler<'_> {
    /// The run-level options.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Responses retained so far.
    pub fn evidence(&self) -> &EvidenceStore {
        &self.evidence
    }

    /// The ledger outcomes are appended to.
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Executes the tests, calling `callback` for each event.
    pub fn execute<F>(&mut self, tests: &[SelectedTest<'_>], mut callback: F) -> RunOutcomes
    where
        F: FnMut(RunEvent<'_>),
    {
        let res: Result<_, Infallible> = self.try_execute(tests, |event| {
            callback(event);
            Ok(())
        });
        match res {
            Ok(outcomes) => outcomes,
        }
    }

    /// Executes the tests, calling `callback` for each event.
    ///
    /// The first error returned by `callback` stops the run: no further tests are started and the
    /// error is returned.
    pub fn try_execute<E, F>(
        &mut self,
        tests: &[SelectedTest<'_>],
        mut callback: F,
    ) -> Result<RunOutcomes, E>
    where
        F: FnMut(RunEvent<'_>) -> Result<(), E>,
    {
        let run_stopwatch = stopwatch();
        let mut stats = RunStats::default();
        let (dual, singular) = partition_unique(tests, &mut stats);

        callback(RunEvent::RunStarted {
            dual_count: dual.len(),
            singular_count: singular.len(),
            run_dual: self.options.run_dual,
            identity: self.options.identity,
        })?;

        let mut dual_outcomes = OutcomeSet::new(self.options.outcome_retention);
        let schedule = dual.iter().flat_map(|test| [*test, *test]).enumerate();
        for (index, test) in schedule {
            let identity = Identity::for_position(index);
            if !self.options.run_dual && identity != self.options.identity {
                stats.skipped += 1;
                callback(RunEvent::TestSkipped { test, identity })?;
                continue;
            }

            let options = self.options.with_identity(identity);
            let outcome =
                self.run_test(test, options, AttemptMode::Dual, &mut stats, &mut callback)?;
            dual_outcomes.insert(outcome);

            if self.options.comparison_enabled() {
                for report in self.comparator.compare_pending(&mut self.evidence) {
                    stats.comparisons += 1;
                    if report.has_differences() {
                        stats.comparisons_with_differences += 1;
                    }
                    callback(RunEvent::ComparisonFinished { report: &report })?;
                }
            }
        }

        let mut singular_outcomes = Vec::with_capacity(singular.len());
        for test in singular {
            let options = self.options.clone();
            let outcome = self.run_test(
                test,
                options,
                AttemptMode::Singular,
                &mut stats,
                &mut callback,
            )?;
            singular_outcomes.push(outcome);
        }

        let snapshot = run_stopwatch.snapshot();
        callback(RunEvent::RunFinished {
            start_time: snapshot.start_time,
            elapsed: snapshot.duration,
            stats,
        })?;

        Ok(RunOutcomes {
            singular: singular_outcomes,
            dual: dual_outcomes,
            stats,
        })
    }

    fn run_test<E, F>(
        &mut self,
        test: SelectedTest<'_>,
        options: RunOptions,
        mode: AttemptMode,
        stats: &mut RunStats,
        callback: &mut F,
    ) -> Result<Outcome, E>
    where
        F: FnMut(RunEvent<'_>) -> Result<(), E>,
    {
        let identity = options.identity;
        callback(RunEvent::TestStarted {
            test,
            identity,
            mode,
        })?;

        let policy = RetryPolicy::new(options.retries).with_dry_run(options.dry_run);
        let replace_failure = options.retries > 0;
        let user = self
            .users
            .user_for(identity, options.run_as_override())
            .to_owned();
        let outcome_for = |result: bool| Outcome {
            result,
            test_name: test.name().to_owned(),
            identity,
            is_scenario: test.is_scenario,
        };

        let mut callback_error = None;
        let evidence = &mut self.evidence;
        let default_diff = &self.default_diff;
        let ledger = &self.ledger;
        let switcher = &mut self.switcher;

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = switcher
                .as_deref_mut()
                .map(|switcher| IdentityGuard::switch(switcher, &user));
            policy.run(
                |_| {
                    let mut cx = TestContext::new(test.name(), &options, evidence, default_diff);
                    test.case.invoke(&mut cx)
                },
                |status| {
                    ledger.record(outcome_for(status.result.is_success()), replace_failure);
                    let will_retry =
                        !status.result.is_success() && status.attempt < status.total_attempts;
                    if will_retry && callback_error.is_none() {
                        if let Err(err) = callback(RunEvent::TestAttemptFailedWillRetry {
                            test,
                            identity,
                            status,
                        }) {
                            callback_error = Some(err);
                        }
                    }
                },
            )
        }));

        let statuses = match caught {
            Ok(statuses) => statuses,
            Err(payload) => {
                let message = format!(
                    "internal error while running '{}' as {identity}: {}",
                    test.name(),
                    panic_message(&*payload),
                );
                error!("{message}");
                ledger.record(outcome_for(false), replace_failure);
                AttemptStatuses::internal_error(message, policy.total_attempts())
            }
        };
        if let Some(err) = callback_error {
            return Err(err);
        }

        match statuses.describe() {
            AttemptDescription::Success { .. } => stats.passed += 1,
            AttemptDescription::Flaky { .. } => stats.flaky += 1,
            AttemptDescription::Failure { last_status, .. } => {
                if last_status.result == AttemptResult::DryRun {
                    stats.dry_run += 1;
                } else {
                    stats.failed += 1;
                }
            }
        }
        stats.finished_count += 1;

        let outcome = outcome_for(statuses.is_success());
        callback(RunEvent::TestFinished {
            test,
            identity,
            statuses: &statuses,
            outcome: &outcome,
        })?;
        Ok(outcome)
    }
}

/// Splits tests into dual-mode and singular lists, dropping any test equal to one already seen.
fn partition_unique<'cat>(
    tests: &[SelectedTest<'cat>],
    stats: &mut RunStats,
) -> (Vec<SelectedTest<'cat>>, Vec<SelectedTest<'cat>>) {
    let mut dual: Vec<SelectedTest<'cat>> = Vec::new();
    let mut singular: Vec<SelectedTest<'cat>> = Vec::new();
    for test in tests {
        let list = if test.case.is_singular() {
            &mut singular
        } else {
            &mut dual
        };
        if let Some(existing) = list.iter().find(|seen| seen.case == test.case) {
            debug!(
                test = test.name(),
                same_as = existing.name(),
                "skipping test equal to one already scheduled",
            );
            stats.duplicates += 1;
            continue;
        }
        list.push(*test);
    }
    (dual, singular)
}
