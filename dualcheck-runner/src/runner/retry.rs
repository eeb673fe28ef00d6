// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repeat-until-success handling for a single test under a single identity.

use crate::{
    catalog::TestFnResult,
    errors::DisplayErrorChain,
    time::{StopwatchSnapshot, stopwatch},
};
use chrono::{DateTime, Local};
use std::{
    any::Any,
    backtrace::Backtrace,
    cell::{Cell, RefCell},
    panic::{self, AssertUnwindSafe},
    sync::Once,
    time::Duration,
};
use tracing::{debug, error, info};

/// Where a retry loop is.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetryState {
    /// No attempt has started.
    Idle,

    /// Attempt `attempt` (1-based) is running.
    Attempting {
        /// The current attempt.
        attempt: u32,
    },

    /// An attempt passed.
    Succeeded {
        /// The number of attempts made.
        attempts: u32,
    },

    /// Every allowed attempt failed.
    ExhaustedRetries {
        /// The number of attempts made.
        attempts: u32,
    },
}

impl RetryState {
    /// Returns true if no further attempts will be made.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. } | RetryState::ExhaustedRetries { .. }
        )
    }
}

/// An input to [`RetryPolicy::transition`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetryEvent {
    /// Start the first attempt.
    Start,

    /// The current attempt passed.
    AttemptPassed,

    /// The current attempt failed.
    AttemptFailed,
}

/// How many times a failing test is repeated.
///
/// A budget of `retries` allows `retries + 1` attempts in total.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    retries: u32,
    dry_run: bool,
}

impl RetryPolicy {
    /// Creates a policy allowing `retries` extra attempts.
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            dry_run: false,
        }
    }

    /// In a dry run, the test body is never invoked and a single not-run attempt is reported.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The retry budget.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The maximum number of attempts.
    pub fn total_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Computes the next state. This is a pure function.
    ///
    /// # Panics
    ///
    /// Panics on events that make no sense in `state`, for example a result before any attempt
    /// started, or any event after a terminal state.
    pub fn transition(&self, state: RetryState, event: RetryEvent) -> RetryState {
        match (state, event) {
            (RetryState::Idle, RetryEvent::Start) => RetryState::Attempting { attempt: 1 },
            (RetryState::Attempting { attempt }, RetryEvent::AttemptPassed) => {
                RetryState::Succeeded { attempts: attempt }
            }
            (RetryState::Attempting { attempt }, RetryEvent::AttemptFailed) => {
                if attempt < self.total_attempts() {
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                } else {
                    RetryState::ExhaustedRetries { attempts: attempt }
                }
            }
            (state, event) => {
                panic!("illegal state transition: {event:?} while in {state:?}")
            }
        }
    }

    /// Runs `attempt_fn` until it passes or the budget runs out.
    ///
    /// Panics and errors from `attempt_fn` are caught here, logged, and count as failed attempts.
    /// `on_attempt` is called after every attempt, including the last.
    pub fn run<F, G>(&self, mut attempt_fn: F, mut on_attempt: G) -> AttemptStatuses
    where
        F: FnMut(u32) -> TestFnResult,
        G: FnMut(&AttemptStatus),
    {
        if self.dry_run {
            let status = AttemptStatus {
                attempt: 1,
                total_attempts: 1,
                result: AttemptResult::DryRun,
                message: None,
                start_time: Local::now(),
                time_taken: Duration::ZERO,
            };
            on_attempt(&status);
            return AttemptStatuses::new(vec![status]);
        }

        install_panic_hook();

        let mut statuses = Vec::new();
        let mut state = self.transition(RetryState::Idle, RetryEvent::Start);
        while let RetryState::Attempting { attempt } = state {
            if attempt > 1 {
                info!(
                    "Repeating failed test attempt {}/{}",
                    attempt - 1,
                    self.retries,
                );
            }

            let start = stopwatch();
            let caught = {
                let _quiet = QuietPanics::enter();
                panic::catch_unwind(AssertUnwindSafe(|| attempt_fn(attempt)))
            };
            let snapshot = start.snapshot();
            let status =
                AttemptStatus::from_caught(attempt, self.total_attempts(), caught, snapshot);
            on_attempt(&status);

            let event = if status.result.is_success() {
                RetryEvent::AttemptPassed
            } else {
                RetryEvent::AttemptFailed
            };
            statuses.push(status);
            state = self.transition(state, event);
        }

        debug!(?state, "retry loop finished");
        AttemptStatuses::new(statuses)
    }
}

/// The result of a single attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptResult {
    /// The test body returned `Ok(true)`.
    Pass,

    /// The test body returned `Ok(false)`.
    Fail,

    /// The test body returned an error.
    Error,

    /// The test body panicked.
    Panic,

    /// The test body wasn't invoked because this is a dry run.
    DryRun,
}

impl AttemptResult {
    /// Returns true if this is a pass.
    pub fn is_success(self) -> bool {
        self == AttemptResult::Pass
    }
}

/// Information about a single attempt.
#[derive(Clone, Debug)]
pub struct AttemptStatus {
    /// The attempt number, starting from 1.
    pub attempt: u32,

    /// The maximum number of attempts allowed.
    pub total_attempts: u32,

    /// The result.
    pub result: AttemptResult,

    /// The error or panic message, for [`AttemptResult::Error`] and [`AttemptResult::Panic`].
    pub message: Option<String>,

    /// When the attempt started.
    pub start_time: DateTime<Local>,

    /// How long the attempt took.
    pub time_taken: Duration,
}

impl AttemptStatus {
    fn from_caught(
        attempt: u32,
        total_attempts: u32,
        caught: std::thread::Result<TestFnResult>,
        snapshot: StopwatchSnapshot,
    ) -> Self {
        let (result, message) = match caught {
            Ok(Ok(true)) => (AttemptResult::Pass, None),
            Ok(Ok(false)) => (AttemptResult::Fail, None),
            Ok(Err(err)) => {
                let message = DisplayErrorChain::new(&*err).to_string();
                error!("test body returned an error: {message}");
                (AttemptResult::Error, Some(message))
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                let context = take_panic_context();
                match &context {
                    Some(context) => {
                        error!("test body panicked at {}: {message}", context.location);
                        if let Some(backtrace) = &context.backtrace {
                            debug!("panic backtrace:\n{backtrace}");
                        }
                    }
                    None => error!("test body panicked: {message}"),
                }
                (AttemptResult::Panic, Some(message))
            }
        };

        Self {
            attempt,
            total_attempts,
            result,
            message,
            start_time: snapshot.start_time,
            time_taken: snapshot.duration,
        }
    }
}

/// Every attempt of a test under one identity.
#[derive(Clone, Debug)]
pub struct AttemptStatuses {
    /// This is guaranteed to be non-empty.
    statuses: Vec<AttemptStatus>,
}

#[allow(clippy::len_without_is_empty)] // AttemptStatuses is never empty
impl AttemptStatuses {
    fn new(statuses: Vec<AttemptStatus>) -> Self {
        debug_assert!(!statuses.is_empty(), "at least one attempt is always made");
        Self { statuses }
    }

    /// A single failed attempt, for when the harness itself failed around the test body.
    pub(crate) fn internal_error(message: String, total_attempts: u32) -> Self {
        Self::new(vec![AttemptStatus {
            attempt: 1,
            total_attempts,
            result: AttemptResult::Error,
            message: Some(message),
            start_time: Local::now(),
            time_taken: Duration::ZERO,
        }])
    }

    /// Returns the last attempt, which determines the outcome.
    pub fn last_status(&self) -> &AttemptStatus {
        self.statuses
            .last()
            .expect("attempt statuses is non-empty")
    }

    /// Iterates over all attempts.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'_ AttemptStatus> + '_ {
        self.statuses.iter()
    }

    /// The number of attempts made.
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Returns true if the last attempt passed.
    pub fn is_success(&self) -> bool {
        self.last_status().result.is_success()
    }

    /// Total time across all attempts.
    pub fn total_time(&self) -> Duration {
        self.statuses.iter().map(|status| status.time_taken).sum()
    }

    /// Returns a description of the attempts.
    pub fn describe(&self) -> AttemptDescription<'_> {
        let last_status = self.last_status();
        if last_status.result.is_success() {
            if self.statuses.len() > 1 {
                AttemptDescription::Flaky {
                    last_status,
                    prior_statuses: &self.statuses[..self.statuses.len() - 1],
                }
            } else {
                AttemptDescription::Success {
                    single_status: last_status,
                }
            }
        } else {
            AttemptDescription::Failure {
                first_status: &self.statuses[0],
                last_status,
                retries: &self.statuses[1..],
            }
        }
    }
}

/// A description of the attempts of a test, obtained from [`AttemptStatuses`].
#[derive(Copy, Clone, Debug)]
pub enum AttemptDescription<'a> {
    /// The test passed on its first attempt.
    Success {
        /// The only attempt.
        single_status: &'a AttemptStatus,
    },

    /// The test failed at least once, then passed.
    Flaky {
        /// The last, passing attempt.
        last_status: &'a AttemptStatus,

        /// Earlier attempts, all of which failed.
        prior_statuses: &'a [AttemptStatus],
    },

    /// Every attempt failed.
    Failure {
        /// The first attempt.
        first_status: &'a AttemptStatus,

        /// The last attempt. Same as the first if no retries were made.
        last_status: &'a AttemptStatus,

        /// Retries, possibly empty.
        retries: &'a [AttemptStatus],
    },
}

impl<'a> AttemptDescription<'a> {
    /// The last attempt, which decided the outcome.
    pub fn last_status(&self) -> &'a AttemptStatus {
        match self {
            Self::Success {
                single_status: last_status,
            }
            | Self::Flaky { last_status, .. }
            | Self::Failure { last_status, .. } => last_status,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "(non-string panic payload)".to_owned()
    }
}

struct PanicContext {
    location: String,
    backtrace: Option<String>,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicContext>> = const { RefCell::new(None) };
    static IN_ATTEMPT: Cell<bool> = const { Cell::new(false) };
}

/// While alive, panics on this thread are reported through the attempt's status only, not
/// through the previously installed panic hook.
struct QuietPanics {
    previous: bool,
}

impl QuietPanics {
    fn enter() -> Self {
        Self {
            previous: IN_ATTEMPT.with(|cell| cell.replace(true)),
        }
    }
}

impl Drop for QuietPanics {
    fn drop(&mut self) {
        IN_ATTEMPT.with(|cell| cell.set(self.previous));
    }
}

fn in_attempt() -> bool {
    IN_ATTEMPT.with(Cell::get)
}

fn take_panic_context() -> Option<PanicContext> {
    LAST_PANIC.with(|cell| cell.borrow_mut().take())
}

/// Records each panic's location and backtrace for the retry loop. Panics outside an attempt are
/// also passed on to the previous hook.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map_or_else(|| "(unknown location)".to_owned(), |l| l.to_string());
            let backtrace = Backtrace::capture();
            let backtrace = matches!(
                backtrace.status(),
                std::backtrace::BacktraceStatus::Captured
            )
            .then(|| backtrace.to_string());
            LAST_PANIC.with(|cell| {
                *cell.borrow_mut() = Some(PanicContext {
                    location,
                    backtrace,
                })
            });
            if !in_attempt() {
                previous(info);
            }
        }));
    });
}
