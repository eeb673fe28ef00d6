// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for handling interrupts.
//!
//! On Ctrl-C, dualcheck prints the summary of whatever has been recorded so far and exits. Attempts
//! in flight are abandoned and nothing is rolled back.

use crate::{
    errors::{DisplayErrorChain, SignalHandlerSetupError, WriteSummaryError},
    ledger::SharedLedger,
    reporter::{SummaryMatrix, SummaryReporter},
};
use camino::Utf8PathBuf;
use chrono::Local;
use dualcheck_metadata::DualcheckExitCode;
use std::io;
use tracing::{error, info};

/// What gets written when the run is interrupted.
///
/// [`flush`](Self::flush) guarantees, in order: the summary matrix written to the writer, then the
/// CSV summary written atomically if a directory was configured.
#[derive(Clone, Debug)]
pub struct ShutdownHook {
    ledger: SharedLedger,
    summary: SummaryReporter,
    csv_dir: Option<Utf8PathBuf>,
}

impl ShutdownHook {
    /// Creates a hook that summarizes `ledger` with `summary`.
    pub fn new(ledger: SharedLedger, summary: SummaryReporter) -> Self {
        Self {
            ledger,
            summary,
            csv_dir: None,
        }
    }

    /// Also write the CSV summary to `dir` on shutdown.
    pub fn with_csv_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.csv_dir = Some(dir.into());
        self
    }

    /// Writes the summary of everything recorded so far. Returns the path of the CSV file, if one
    /// was written.
    pub fn flush(
        &self,
        writer: &mut dyn io::Write,
    ) -> Result<Option<Utf8PathBuf>, WriteSummaryError> {
        let matrix = SummaryMatrix::from_ledger(&self.ledger.snapshot());
        self.summary.write_summary(&matrix, writer)?;
        match &self.csv_dir {
            Some(dir) => matrix.write_csv(dir, Local::now()).map(Some),
            None => Ok(None),
        }
    }

    /// Installs the hook as the process's interrupt handler. On interrupt, the hook flushes to
    /// stderr and exits with [`DualcheckExitCode::INTERRUPTED`].
    ///
    /// Can be called at most once per process.
    pub fn install(self) -> Result<(), SignalHandlerSetupError> {
        ctrlc::set_handler(move || {
            let mut stderr = io::stderr().lock();
            match self.flush(&mut stderr) {
                Ok(Some(path)) => info!("saved results of interrupted run to {path}"),
                Ok(None) => {}
                Err(err) => error!("{}", DisplayErrorChain::new(&err)),
            }
            std::process::exit(DualcheckExitCode::INTERRUPTED);
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger::Outcome, options::Identity};
    use camino_tempfile::Utf8TempDir;

    fn hook_with_outcomes() -> ShutdownHook {
        let ledger = SharedLedger::new();
        ledger.record(
            Outcome {
                result: true,
                test_name: "CreateAccount".to_owned(),
                identity: Identity::First,
                is_scenario: false,
            },
            false,
        );
        ledger.record(
            Outcome {
                result: false,
                test_name: "CreateAccount".to_owned(),
                identity: Identity::Second,
                is_scenario: false,
            },
            false,
        );
        ShutdownHook::new(ledger, SummaryReporter::new())
    }

    #[test]
    fn flush_writes_summary_only() {
        let mut buf = Vec::new();
        let csv = hook_with_outcomes()
            .flush(&mut buf)
            .expect("flush succeeds");
        assert_eq!(csv, None);
        let out = String::from_utf8(buf).expect("output is UTF-8");
        assert!(out.contains("FirstPassed:True\tSecondPassed:False <---"), "{out}");
    }

    #[test]
    fn flush_writes_csv_when_recording() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let hook = hook_with_outcomes().with_csv_dir(dir.path());
        let mut buf = Vec::new();
        let csv = hook
            .flush(&mut buf)
            .expect("flush succeeds")
            .expect("CSV was written");
        assert_eq!(csv.parent(), Some(dir.path()));
        let contents = std::fs::read_to_string(&csv).expect("read CSV");
        assert_eq!(
            contents,
            "API Name,FirstPassed,SecondPassed\nCreateAccount,True,False\n"
        );
    }

    #[test]
    fn flush_reports_unwritable_csv_dir() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let hook = hook_with_outcomes().with_csv_dir(dir.path().join("does-not-exist"));
        let mut buf = Vec::new();
        let err = hook.flush(&mut buf).expect_err("directory is missing");
        assert!(matches!(err, WriteSummaryError::Fs { .. }), "{err:?}");
        assert!(!buf.is_empty(), "summary is written before the CSV");
    }
}
