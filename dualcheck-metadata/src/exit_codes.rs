// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `dualcheck` runs.
///
/// The harness this tool replaces reported every failure as `-1`, and scripts in the wild
/// check for exactly that value. All failure codes are therefore `-1` (255 on Unix); the
/// separate constants exist so that call sites say *why* they are failing.
///
/// Unknown/unexpected failures (for example a panic outside of a test body) result in exit code 1.
pub enum DualcheckExitCode {}

impl DualcheckExitCode {
    /// All selected tests passed, or a list-only invocation completed.
    pub const OK: i32 = 0;

    /// One or more tests failed under at least one identity.
    pub const TEST_RUN_FAILED: i32 = -1;

    /// A mandatory command-line argument was missing.
    pub const MISSING_ARGUMENT: i32 = -1;

    /// A user issue happened while setting up a run (bad config, unknown profile, unreachable
    /// endpoint).
    pub const SETUP_ERROR: i32 = -1;

    /// The run was interrupted; the partial summary was flushed before exiting.
    pub const INTERRUPTED: i32 = -1;

    /// Writing data to stdout, stderr or a summary file produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = -1;
}

/// Returns true if `code` denotes a successful `dualcheck` invocation.
pub fn is_success_code(code: i32) -> bool {
    code == DualcheckExitCode::OK
}
