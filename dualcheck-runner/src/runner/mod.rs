// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`DualModeScheduler`], built by a
//! [`DualModeSchedulerBuilder`].

mod imp;
mod outcomes;
mod retry;

pub use imp::*;
pub use outcomes::*;
pub use retry::*;
