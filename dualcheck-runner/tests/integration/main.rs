// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests driving the selector, scheduler and reporters against an in-memory API.

mod fixtures;
mod pipeline;
