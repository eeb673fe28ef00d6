// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verification helpers for test bodies.
//!
//! A failed check is an ordinary `false`, not an error: test bodies combine checks and return the
//! result from [`TestFn`](crate::catalog::TestFn).

use crate::{
    catalog::TestFnResult,
    errors::DisplayErrorChain,
    options::{Identity, RunOptions},
    runner::panic_message,
};
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, warn};

/// What a check verifies. Some kinds of failure are expected and don't fail the test.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum CheckKind {
    /// No particular kind.
    #[default]
    Unspecified,

    /// A name field.
    Name,

    /// A code field.
    Code,

    /// An id field.
    Id,

    /// A free-text description. The API under test rewrites these, so mismatches are reported
    /// and ignored.
    Description,

    /// A monetary amount.
    Amount,

    /// The basic fields of the subject under test.
    BasicSubject,
}

impl CheckKind {
    /// Returns true if a failed check of this kind doesn't fail the test.
    pub fn ignores_failure(self) -> bool {
        matches!(self, CheckKind::Description)
    }
}

/// Evaluates `failure` and logs the verdict. Returns true only if the check failed and `kind`
/// doesn't ignore failures.
pub fn failed_if(failure: impl FnOnce() -> bool, reason: &str, kind: CheckKind) -> bool {
    let failed = failure();
    let verdict = if failed { "[Failed]" } else { "[Passed]" };
    info!(target: "dualcheck::verify", "[Verify] '{reason}' {verdict}");

    if !failed {
        return false;
    }
    if kind.ignores_failure() {
        info!(
            target: "dualcheck::verify",
            "(IGNORED intentionally) {kind:?} check failed: {reason}",
        );
        false
    } else {
        warn!(target: "dualcheck::verify", "check failed: {reason}");
        true
    }
}

/// Runs the general assumptions, then the assumptions for the attempt's identity.
///
/// Returns true only if both hold. A check that returns an error or panics counts as not holding.
pub fn validate_assumptions<G, F, S>(
    options: &RunOptions,
    general: G,
    if_first: F,
    if_second: S,
) -> bool
where
    G: FnOnce() -> TestFnResult,
    F: FnOnce() -> TestFnResult,
    S: FnOnce() -> TestFnResult,
{
    if !run_check("general", general) {
        warn!(target: "dualcheck::verify", "general assumptions failed");
        return false;
    }

    let identity = options.identity;
    let met = match identity {
        Identity::First => run_check(identity.label(), if_first),
        Identity::Second => run_check(identity.label(), if_second),
    };
    if !met {
        warn!(target: "dualcheck::verify", "{identity}-specific assumptions failed");
    }
    met
}

fn run_check(label: &str, check: impl FnOnce() -> TestFnResult) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(check)) {
        Ok(Ok(met)) => met,
        Ok(Err(err)) => {
            error!(
                "{label} assumption check returned an error: {}",
                DisplayErrorChain::new(&*err),
            );
            false
        }
        Err(payload) => {
            error!(
                "{label} assumption check panicked: {}",
                panic_message(&*payload),
            );
            false
        }
    }
}
