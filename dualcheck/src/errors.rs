// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use dualcheck_metadata::DualcheckExitCode;
use dualcheck_runner::errors::*;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that dualcheck reports to the user and turns into an exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("failed to parse arguments")]
    ArgumentParse {
        #[source]
        err: clap::Error,
    },
    #[error("Missing mandatory arguments: {}", missing.join(","))]
    MissingArguments { missing: Vec<String>, usage: String },
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("Cannot connect to API endpoint. Aborting tests")]
    ApiUnreachable {
        #[source]
        err: ProbeError,
    },
    #[error("error writing run output")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("error writing summary")]
    WriteSummaryError {
        #[from]
        err: WriteSummaryError,
    },
    #[error("error writing output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    pub(crate) fn argument_parse(err: clap::Error) -> Self {
        Self::ArgumentParse { err }
    }

    pub(crate) fn missing_arguments(missing: Vec<String>, usage: String) -> Self {
        Self::MissingArguments { missing, usage }
    }

    pub(crate) fn api_unreachable(err: ProbeError) -> Self {
        Self::ApiUnreachable { err }
    }

    pub(crate) fn test_run_failed() -> Self {
        Self::TestRunFailed
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            // --help and --version come through here too.
            Self::ArgumentParse { err } => {
                if err.use_stderr() {
                    DualcheckExitCode::SETUP_ERROR
                } else {
                    DualcheckExitCode::OK
                }
            }
            Self::MissingArguments { .. } => DualcheckExitCode::MISSING_ARGUMENT,
            Self::CurrentDirFailed { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::ApiUnreachable { .. } => DualcheckExitCode::SETUP_ERROR,
            Self::WriteEventError { .. }
            | Self::WriteSummaryError { .. }
            | Self::WriteOutput { .. } => DualcheckExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed => DualcheckExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    ///
    /// Argument errors are printed directly, since they happen before logging is set up.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ArgumentParse { err } => {
                // clap knows whether this is help output (stdout) or an error (stderr).
                let _ = err.print();
                None
            }
            Self::MissingArguments { missing, usage } => {
                eprintln!(
                    "{} Missing mandatory arguments: {}\n\n{usage}",
                    "** Error:".style(styles.error_text),
                    missing.join(","),
                );
                None
            }
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse dualcheck config at `{}`",
                    err.config_file().style(styles.bold),
                );
                err.source()
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                err.source()
            }
            Self::ApiUnreachable { err } => {
                error!("Cannot connect to API endpoint. Aborting tests");
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to write run output");
                Some(err as &dyn Error)
            }
            Self::WriteSummaryError { err } => {
                error!("failed to write summary");
                Some(err as &dyn Error)
            }
            Self::WriteOutput { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: "dualcheck::no_heading", "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
