// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run options handed to every test body.

use itertools::Itertools;
use serde::Serialize;
use std::{collections::BTreeSet, fmt};

/// One of the two caller identities a dual-mode test runs under.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub enum Identity {
    /// The first identity. Even positions in a dual-mode schedule run under it.
    First,

    /// The second identity. Odd positions in a dual-mode schedule run under it.
    Second,
}

impl Identity {
    /// Both identities, in scheduling order.
    pub const ALL: [Identity; 2] = [Identity::First, Identity::Second];

    /// Returns the identity for a position in the duplicated dual-mode schedule.
    pub fn for_position(index: usize) -> Self {
        if index % 2 == 0 {
            Identity::First
        } else {
            Identity::Second
        }
    }

    /// Returns the other identity.
    pub fn other(self) -> Self {
        match self {
            Identity::First => Identity::Second,
            Identity::Second => Identity::First,
        }
    }

    /// A short label used in logs, file names and summaries.
    pub fn label(self) -> &'static str {
        match self {
            Identity::First => "First",
            Identity::Second => "Second",
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the scheduler keeps per-attempt outcomes in its returned set.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OutcomeRetention {
    /// Outcomes with the same result, test name and identity collapse into one entry.
    #[default]
    Collapse,

    /// Every attempt outcome is kept, in order.
    History,
}

/// Options for a single run, and for each attempt within it.
///
/// The scheduler clones these per attempt and sets [`identity`](Self::identity), so test bodies
/// can read them freely without affecting other attempts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOptions {
    /// The identity the current attempt runs under. At the run level, the global identity.
    pub identity: Identity,

    /// Run every non-singular test once per identity.
    pub run_dual: bool,

    /// Compare retained responses after each dual-mode attempt.
    pub compare_retained: bool,

    /// Retain every recorded response for comparison, unless a call site opts out.
    pub always_retain_responses: bool,

    /// Write compared payloads to disk.
    pub write_diffs_to_files: bool,

    /// Skip invoking test bodies; every attempt is reported as not run.
    pub dry_run: bool,

    /// Extra attempts allowed after a failure.
    pub retries: u32,

    /// Print extra detail, including these options at startup.
    pub verbose: bool,

    /// Suppress progress output.
    pub quiet: bool,

    /// Print each recorded call's return value.
    pub print_return_values: bool,

    /// Ask test bodies to verify that created entities are deleted.
    pub validate_deletes: bool,

    /// An explicit user to run as, overriding the per-identity mapping.
    pub run_as: Option<String>,

    /// Names of the tests the run was narrowed to, if any.
    pub specific_tests: Vec<String>,

    /// Switches that disable the tests guarded by them.
    pub disabled_switches: BTreeSet<String>,

    /// How per-attempt outcomes are kept.
    pub outcome_retention: OutcomeRetention,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            identity: Identity::Second,
            run_dual: false,
            compare_retained: false,
            always_retain_responses: false,
            write_diffs_to_files: false,
            dry_run: false,
            retries: 0,
            verbose: false,
            quiet: false,
            print_return_values: false,
            validate_deletes: false,
            run_as: None,
            specific_tests: Vec::new(),
            disabled_switches: BTreeSet::new(),
            outcome_retention: OutcomeRetention::default(),
        }
    }
}

impl RunOptions {
    /// Returns a copy of these options for an attempt under `identity`.
    pub fn with_identity(&self, identity: Identity) -> Self {
        Self {
            identity,
            ..self.clone()
        }
    }

    /// Whether retained responses are compared after each attempt.
    ///
    /// Comparison needs both identities to have run, so it only applies in dual mode.
    pub fn comparison_enabled(&self) -> bool {
        self.run_dual && (self.compare_retained || self.always_retain_responses)
    }

    /// Whether the test guarded by `switch` is disabled.
    pub fn is_disabled(&self, switch: &str) -> bool {
        self.disabled_switches
            .iter()
            .any(|disabled| disabled.eq_ignore_ascii_case(switch))
    }

    /// The explicit run-as user, if one other than the `default` placeholder was given.
    pub fn run_as_override(&self) -> Option<&str> {
        self.run_as
            .as_deref()
            .filter(|user| !user.is_empty() && !user.eq_ignore_ascii_case("default"))
    }
}

impl fmt::Display for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "identity: {}", self.identity)?;
        writeln!(f, "run dual: {}", self.run_dual)?;
        writeln!(f, "compare retained responses: {}", self.compare_retained)?;
        writeln!(f, "always retain responses: {}", self.always_retain_responses)?;
        writeln!(f, "write diffs to files: {}", self.write_diffs_to_files)?;
        writeln!(f, "dry run: {}", self.dry_run)?;
        writeln!(f, "retries: {}", self.retries)?;
        writeln!(f, "print return values: {}", self.print_return_values)?;
        writeln!(f, "validate deletes: {}", self.validate_deletes)?;
        writeln!(
            f,
            "run as: {}",
            self.run_as.as_deref().unwrap_or("(per identity)")
        )?;
        if !self.specific_tests.is_empty() {
            writeln!(f, "specific tests: {}", self.specific_tests.join(", "))?;
        }
        if !self.disabled_switches.is_empty() {
            writeln!(
                f,
                "disabled switches: {}",
                self.disabled_switches.iter().join(", ")
            )?;
        }
        write!(f, "outcome retention: {:?}", self.outcome_retention)
    }
}
