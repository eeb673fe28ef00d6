// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selecting tests based on user-specified parameters.
//!
//! The main structure in this module is [`TestSelector`], which is created by a
//! [`TestSelectorBuilder`].

use crate::catalog::{SelectedTest, TestCatalog};
use std::{collections::BTreeSet, fmt};
use tracing::debug;

/// A list of names, matched case-insensitively.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NameList {
    names: Vec<String>,
}

impl NameList {
    /// Creates a new list.
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true if `name` is in the list, ignoring ASCII case.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// Iterates over the names as given.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }
}

/// The reason a catalog test was left out of the run list.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MismatchReason {
    /// The suite wasn't in the suite include list.
    SuiteNotIncluded,

    /// The suite was in the suite exclude list.
    SuiteExcluded,

    /// The test was in the test exclude list.
    TestExcluded,

    /// A test include list was given, and this test wasn't in it.
    TestNotIncluded,

    /// The test's disable switch was turned on.
    Disabled,

    /// Only the last test was requested.
    NotLast,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchReason::SuiteNotIncluded => write!(f, "suite not in include list"),
            MismatchReason::SuiteExcluded => write!(f, "suite excluded"),
            MismatchReason::TestExcluded => write!(f, "test excluded"),
            MismatchReason::TestNotIncluded => write!(f, "test not in include list"),
            MismatchReason::Disabled => write!(f, "disabled by switch"),
            MismatchReason::NotLast => write!(f, "not the last test"),
        }
    }
}

/// Builds a [`TestSelector`].
#[derive(Clone, Debug, Default)]
pub struct TestSelectorBuilder {
    include_suites: NameList,
    exclude_suites: NameList,
    include_tests: NameList,
    exclude_tests: NameList,
    disabled_switches: BTreeSet<String>,
    last_only: bool,
    reverse: bool,
}

impl TestSelectorBuilder {
    /// Creates a builder that selects every test in catalog order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only run tests from these suites. Takes precedence over [`Self::exclude_suites`].
    pub fn include_suites(&mut self, suites: NameList) -> &mut Self {
        self.include_suites = suites;
        self
    }

    /// Skip tests from these suites.
    pub fn exclude_suites(&mut self, suites: NameList) -> &mut Self {
        self.exclude_suites = suites;
        self
    }

    /// Only run these tests, wherever they live in the catalog.
    ///
    /// A non-empty list overrides every suite and test exclusion.
    pub fn include_tests(&mut self, tests: NameList) -> &mut Self {
        self.include_tests = tests;
        self
    }

    /// Skip these tests.
    pub fn exclude_tests(&mut self, tests: NameList) -> &mut Self {
        self.exclude_tests = tests;
        self
    }

    /// Skip tests guarded by any of these switches.
    pub fn disabled_switches(&mut self, switches: BTreeSet<String>) -> &mut Self {
        self.disabled_switches = switches;
        self
    }

    /// Only run the last test of the run list.
    pub fn last_only(&mut self, last_only: bool) -> &mut Self {
        self.last_only = last_only;
        self
    }

    /// Reverse the run list.
    pub fn reverse(&mut self, reverse: bool) -> &mut Self {
        self.reverse = reverse;
        self
    }

    /// Builds the selector.
    pub fn build(&self) -> TestSelector<'_> {
        TestSelector { builder: self }
    }
}

/// Turns a [`TestCatalog`] into an ordered run list.
#[derive(Clone, Copy, Debug)]
pub struct TestSelector<'builder> {
    builder: &'builder TestSelectorBuilder,
}

impl TestSelector<'_> {
    /// Returns the tests to run, in order.
    ///
    /// Duplicates are kept here; the scheduler skips any test equal to one it already scheduled.
    pub fn select<'cat>(&self, catalog: &'cat TestCatalog) -> Vec<SelectedTest<'cat>> {
        let builder = self.builder;
        let all_tests = catalog.all_tests();

        let mut selected: Vec<_> = if builder.include_tests.is_empty() {
            all_tests
                .into_iter()
                .filter(|test| self.log_match(test, self.pool_match(test)))
                .collect()
        } else {
            all_tests
                .into_iter()
                .filter(|test| {
                    let reason = (!builder.include_tests.contains(test.name()))
                        .then_some(MismatchReason::TestNotIncluded);
                    self.log_match(test, reason)
                })
                .collect()
        };

        selected.retain(|test| {
            let reason = test
                .case
                .disable_switch()
                .filter(|switch| self.is_disabled(switch))
                .map(|_| MismatchReason::Disabled);
            self.log_match(test, reason)
        });

        if builder.last_only {
            if let Some(last_name) = selected.last().map(|test| test.name().to_owned()) {
                selected.retain(|test| {
                    let reason = (test.name() != last_name).then_some(MismatchReason::NotLast);
                    self.log_match(test, reason)
                });
            }
        }

        if builder.reverse {
            selected.reverse();
        }

        selected
    }

    fn pool_match(&self, test: &SelectedTest<'_>) -> Option<MismatchReason> {
        let builder = self.builder;
        if !builder.include_suites.is_empty() {
            if !builder.include_suites.contains(test.suite) {
                return Some(MismatchReason::SuiteNotIncluded);
            }
        } else if builder.exclude_suites.contains(test.suite) {
            return Some(MismatchReason::SuiteExcluded);
        }

        if builder.exclude_tests.contains(test.name()) {
            return Some(MismatchReason::TestExcluded);
        }
        None
    }

    fn is_disabled(&self, switch: &str) -> bool {
        self.builder
            .disabled_switches
            .iter()
            .any(|disabled| disabled.eq_ignore_ascii_case(switch))
    }

    fn log_match(&self, test: &SelectedTest<'_>, reason: Option<MismatchReason>) -> bool {
        match reason {
            Some(reason) => {
                debug!(suite = test.suite, test = test.name(), %reason, "skipping test");
                false
            }
            None => true,
        }
    }
}
