// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs API integration tests under two caller identities and compares the responses.
//!
//! The `dualcheck` binary runs a built-in [demo catalog](demo). To run your own tests, build a
//! [`TestCatalog`](dualcheck_runner::catalog::TestCatalog), then hand it to
//! [`DualcheckApp::exec`] through a [`Harness`] from your own `main`.

#![warn(missing_docs)]

pub mod demo;
mod dispatch;
mod errors;
mod output;
mod probe;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter, StderrStyles};
