// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The catalog of known tests, grouped by suite.

use crate::recorder::TestContext;
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use owo_colors::{OwoColorize, Style};
use std::{io, sync::Arc};

/// An error returned from a test body.
pub type TestBodyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The result of a single invocation of a test body: `Ok(true)` is a pass.
pub type TestFnResult = Result<bool, TestBodyError>;

/// A test body.
pub type TestFn = Arc<dyn Fn(&mut TestContext<'_>) -> TestFnResult + Send + Sync + 'static>;

/// A single API test.
///
/// Two test cases are equal if they share the same test body *and* the same singular flag. The
/// name is not part of equality: the scheduler uses this to skip a body that was already
/// scheduled under another name.
#[derive(Clone, Debug)]
pub struct TestCase {
    name: String,
    disable_switch: Option<String>,
    test_fn: DebugIgnore<TestFn>,
    scenarios: Vec<TestCase>,
    singular: bool,
}

impl TestCase {
    /// Creates a new test case with the given name and body.
    pub fn new(
        name: impl Into<String>,
        test_fn: impl Fn(&mut TestContext<'_>) -> TestFnResult + Send + Sync + 'static,
    ) -> Self {
        Self::from_fn(name, Arc::new(test_fn))
    }

    /// Creates a new test case from an already shared body.
    ///
    /// Cases created from clones of the same `Arc` compare equal.
    pub fn from_fn(name: impl Into<String>, test_fn: TestFn) -> Self {
        Self {
            name: name.into(),
            disable_switch: None,
            test_fn: DebugIgnore(test_fn),
            scenarios: Vec::new(),
            singular: false,
        }
    }

    /// Marks this test as singular: it runs once, under the global identity, after all dual-mode
    /// tests.
    pub fn singular(mut self) -> Self {
        self.singular = true;
        self
    }

    /// Guards this test with a disable switch.
    pub fn with_disable_switch(mut self, switch: impl Into<String>) -> Self {
        self.disable_switch = Some(switch.into());
        self
    }

    /// Adds a nested scenario. Scenarios are selected and run as independent tests.
    pub fn with_scenario(mut self, scenario: TestCase) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// The name of the test.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The disable switch guarding this test, if any.
    pub fn disable_switch(&self) -> Option<&str> {
        self.disable_switch.as_deref()
    }

    /// Nested scenarios.
    pub fn scenarios(&self) -> &[TestCase] {
        &self.scenarios
    }

    /// Whether this test is excluded from identity duplication.
    pub fn is_singular(&self) -> bool {
        self.singular
    }

    pub(crate) fn invoke(&self, cx: &mut TestContext<'_>) -> TestFnResult {
        (self.test_fn.0)(cx)
    }

    fn push_flattened_scenarios<'cat>(
        &'cat self,
        suite: &'cat str,
        out: &mut Vec<SelectedTest<'cat>>,
    ) {
        for scenario in &self.scenarios {
            out.push(SelectedTest {
                suite,
                case: scenario,
                is_scenario: true,
            });
            scenario.push_flattened_scenarios(suite, out);
        }
    }
}

impl PartialEq for TestCase {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.test_fn.0, &other.test_fn.0) && self.singular == other.singular
    }
}

impl Eq for TestCase {}

/// A test as it appears in a run list: the case plus the suite it was selected from.
#[derive(Clone, Copy, Debug)]
pub struct SelectedTest<'cat> {
    /// The suite the test belongs to.
    pub suite: &'cat str,

    /// The test case.
    pub case: &'cat TestCase,

    /// Whether the test is a nested scenario of another test.
    pub is_scenario: bool,
}

impl SelectedTest<'_> {
    /// The name of the test.
    pub fn name(&self) -> &str {
        self.case.name()
    }
}

/// Suites of tests, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct TestCatalog {
    suites: IndexMap<String, Vec<TestCase>>,
}

impl TestCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds tests to a suite, creating it if necessary.
    pub fn add_suite(
        &mut self,
        suite: impl Into<String>,
        tests: impl IntoIterator<Item = TestCase>,
    ) -> &mut Self {
        self.suites.entry(suite.into()).or_default().extend(tests);
        self
    }

    /// Iterates over suites and their top-level tests.
    pub fn suites(&self) -> impl Iterator<Item = (&str, &[TestCase])> + '_ {
        self.suites
            .iter()
            .map(|(suite, tests)| (suite.as_str(), tests.as_slice()))
    }

    /// The number of top-level tests across all suites.
    pub fn test_count(&self) -> usize {
        self.suites.values().map(Vec::len).sum()
    }

    /// Every test in the catalog: all suites' top-level tests first, then every suite's nested
    /// scenarios.
    pub fn all_tests(&self) -> Vec<SelectedTest<'_>> {
        let mut out = Vec::new();
        for (suite, tests) in &self.suites {
            out.extend(tests.iter().map(|case| SelectedTest {
                suite,
                case,
                is_scenario: false,
            }));
        }
        for (suite, tests) in &self.suites {
            for case in tests {
                case.push_flattened_scenarios(suite, &mut out);
            }
        }
        out
    }

    /// Writes the suite-to-test listing printed by `--list`.
    pub fn write_list(
        &self,
        styles: &CatalogStyles,
        writer: &mut dyn io::Write,
    ) -> io::Result<()> {
        for (suite, tests) in &self.suites {
            writeln!(writer, "Suite: {} :", suite.style(styles.suite))?;
            for case in tests {
                write!(writer, "\t{}", case.name().style(styles.test_name))?;
                if case.is_singular() {
                    write!(writer, " {}", "(singular)".style(styles.annotation))?;
                }
                writeln!(writer)?;
                for scenario in &case.scenarios {
                    writeln!(
                        writer,
                        "\t\t{} {}",
                        scenario.name().style(styles.test_name),
                        "(scenario)".style(styles.annotation),
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Styles used when listing the catalog.
#[derive(Clone, Debug, Default)]
pub struct CatalogStyles {
    suite: Style,
    test_name: Style,
    annotation: Style,
}

impl CatalogStyles {
    /// Enables colors.
    pub fn colorize(&mut self) {
        self.suite = Style::new().magenta().bold();
        self.test_name = Style::new().blue().bold();
        self.annotation = Style::new().dimmed();
    }
}
