// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out run events and the end-of-run summary.
//!
//! [`DisplayReporter`] writes per-test and per-comparison lines as the scheduler emits
//! [`RunEvent`]s. Once the run is done, [`SummaryReporter`] renders the
//! [`ResultLedger`](crate::ledger::ResultLedger) as a [`SummaryMatrix`].

mod displayer;
mod events;
mod summary;

pub use displayer::*;
pub use events::*;
pub use summary::*;
