// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Utilities for pluralizing various words based on count or plurality.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "attempt" if `count` is 1, otherwise "attempts".
    pub(crate) fn attempts_str(count: usize) -> &'static str {
        if count == 1 { "attempt" } else { "attempts" }
    }

    /// Returns "difference" if `count` is 1, otherwise "differences".
    pub(crate) fn differences_str(count: usize) -> &'static str {
        if count == 1 {
            "difference"
        } else {
            "differences"
        }
    }

    /// Returns "step" if `count` is 1, otherwise "steps".
    pub(crate) fn steps_str(count: usize) -> &'static str {
        if count == 1 { "step" } else { "steps" }
    }
}
