// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by dualcheck.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error::Error, fmt, io};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse dualcheck config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.err
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building or deserializing the config.
    #[error(transparent)]
    Build(ConfigError),

    /// An ignore-field pattern in a profile was not a valid glob.
    #[error("in profile `{profile}`")]
    IgnoreFields {
        /// The profile the pattern was declared in.
        profile: String,

        /// The underlying glob error.
        #[source]
        err: DiffConfigBuildError,
    },

    /// The connectivity probe address could not be parsed.
    #[error("in profile `{profile}`: connectivity-probe `{address}` is not of the form host:port")]
    InvalidProbeAddress {
        /// The profile the address was declared in.
        profile: String,

        /// The address as written.
        address: String,
    },
}

/// An error which indicates that a profile was requested but not known to dualcheck.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }

    /// Returns the profile that wasn't found.
    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// An error that occurred while compiling the ignore patterns of a
/// [`DiffConfig`](crate::compare::DiffConfig).
#[derive(Clone, Debug, Error)]
#[error("invalid ignore-field pattern `{pattern}`")]
pub struct DiffConfigBuildError {
    pattern: String,
    #[source]
    err: globset::Error,
}

impl DiffConfigBuildError {
    pub(crate) fn new(pattern: impl Into<String>, err: globset::Error) -> Self {
        Self {
            pattern: pattern.into(),
            err,
        }
    }
}

/// An error that occurs while writing run events to the terminal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] io::Error),
}

/// An error that occurs while writing the end-of-run summary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteSummaryError {
    /// An error occurred while writing the summary to the provided output.
    #[error("error writing summary to output")]
    Io(#[source] io::Error),

    /// An error occurred while writing the CSV summary file.
    #[error("error writing summary file `{file}`")]
    Fs {
        /// The file being written.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurs while writing a pair of compared payloads to disk.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiffExportError {
    /// The output directory could not be created.
    #[error("error creating diff output directory `{dir}`")]
    CreateDir {
        /// The directory being created.
        dir: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: io::Error,
    },

    /// A payload could not be serialized.
    #[error("error serializing payload for `{file}`")]
    Serialize {
        /// The file the payload was destined for.
        file: Utf8PathBuf,

        /// The underlying serialization error.
        #[source]
        error: serde_json::Error,
    },

    /// A payload file could not be written.
    #[error("error writing diff file `{file}`")]
    Write {
        /// The file being written.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while setting up the interrupt handler.
#[derive(Debug, Error)]
#[error("error setting up interrupt handler")]
pub struct SignalHandlerSetupError(#[from] ctrlc::Error);

/// An error returned by a [`ConnectivityProbe`](crate::identity::ConnectivityProbe).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProbeError {
    /// The address did not resolve to any socket addresses.
    #[error("address `{address}` did not resolve")]
    Resolve {
        /// The address being probed.
        address: String,

        /// The underlying IO error, if resolution itself failed.
        #[source]
        error: Option<io::Error>,
    },

    /// None of the resolved addresses accepted a connection.
    #[error("could not connect to `{address}`")]
    Connect {
        /// The address being probed.
        address: String,

        /// The last connection error.
        #[source]
        error: io::Error,
    },
}

/// Displays an error along with its chain of sources.
///
/// ```text
/// failed to parse dualcheck config at `.config/dualcheck.toml`
///   caused by:
///   - invalid type: string "three", expected u32
/// ```
#[derive(Clone, Copy, Debug)]
pub struct DisplayErrorChain<E>(E);

impl<E> DisplayErrorChain<E> {
    /// Wraps an error.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        if source.is_some() {
            write!(f, "\n  caused by:")?;
        }
        while let Some(err) = source {
            write!(f, "\n  - {err}")?;
            source = err.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn error_chain_lists_sources() {
        let err = WriteSummaryError::Fs {
            file: "out/summary.csv".into(),
            error: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert_eq!(
            DisplayErrorChain::new(&err).to_string(),
            indoc! {"
                error writing summary file `out/summary.csv`
                  caused by:
                  - permission denied"
            },
        );
    }

    #[test]
    fn error_chain_without_source() {
        let err = ProfileNotFound::new("nightly", ["default", "ci"]);
        assert_eq!(
            DisplayErrorChain::new(&err).to_string(),
            "profile `nightly` not found (known profiles: ci, default)",
        );
    }
}
