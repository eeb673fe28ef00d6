// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for timing test attempts and recorded calls.
//!
//! Attempts report a wall-clock start time, so the stopwatch pairs a `DateTime<Local>` (realtime
//! clock) with an `Instant` (monotonic clock). Elapsed time always comes from the monotonic clock.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<Local>,
    pub(crate) duration: Duration,
}

/// Signed difference `second - first` in whole milliseconds.
pub(crate) fn signed_millis_delta(first: Duration, second: Duration) -> i128 {
    second.as_millis() as i128 - first.as_millis() as i128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_monotonic() {
        let start = stopwatch();
        let first = start.snapshot();
        std::thread::sleep(Duration::from_millis(20));
        let second = start.snapshot();

        assert_eq!(first.start_time, second.start_time);
        assert!(
            second.duration >= first.duration + Duration::from_millis(20),
            "second snapshot ({:?}) includes the sleep after the first ({:?})",
            second.duration,
            first.duration,
        );
    }

    #[test]
    fn millis_delta_is_signed() {
        let fast = Duration::from_millis(120);
        let slow = Duration::from_millis(450);
        assert_eq!(signed_millis_delta(fast, slow), 330);
        assert_eq!(signed_millis_delta(slow, fast), -330);
        assert_eq!(signed_millis_delta(slow, slow), 0);
    }
}
