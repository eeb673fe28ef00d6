// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [dualcheck](https://crates.io/crates/dualcheck), a harness that runs
//! API integration tests under two caller identities and compares the responses.
//!
//! The pieces fit together roughly in this order:
//!
//! 1. A [`TestCatalog`](catalog::TestCatalog) lists suites of [`TestCase`](catalog::TestCase)s.
//! 2. A [`TestSelector`](test_filter::TestSelector) turns the catalog into an ordered run list.
//! 3. The [`DualModeScheduler`](runner::DualModeScheduler) runs each test once per identity,
//!    retrying failures according to the [`RetryPolicy`](runner::RetryPolicy).
//! 4. Test bodies capture responses through [`TestContext::record`](recorder::TestContext::record);
//!    the [`Comparator`](compare::Comparator) diffs the captured pairs.
//! 5. Outcomes land in the [`ResultLedger`](ledger::ResultLedger), which the
//!    [`SummaryReporter`](reporter::SummaryReporter) renders as a matrix, CSV and rerun hints.

pub mod catalog;
pub mod checks;
pub mod compare;
pub mod config;
pub mod errors;
mod helpers;
pub mod identity;
pub mod ledger;
pub mod options;
pub mod recorder;
pub mod reporter;
pub mod runner;
pub mod signal;
pub mod test_filter;
mod time;
