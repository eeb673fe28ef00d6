// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable metadata for [dualcheck](https://crates.io/crates/dualcheck).
//!
//! Currently this is the set of documented process exit codes.

mod exit_codes;

pub use exit_codes::*;
