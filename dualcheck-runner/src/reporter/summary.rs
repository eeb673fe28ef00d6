// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::displayer::Styles;
use crate::{
    errors::WriteSummaryError,
    helpers::plural,
    ledger::{Outcome, ResultLedger},
    options::Identity,
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use indexmap::IndexMap;
use owo_colors::{OwoColorize, Style};
use std::{
    fmt,
    io::{self, Write},
};
use swrite::{SWrite, swriteln};

/// The CSV header. The column names predate the identity labels and are kept for compatibility
/// with existing spreadsheets.
pub const SUMMARY_CSV_HEADER: &str = "API Name,FirstPassed,SecondPassed";

/// The latest result for one test under each identity. `None` means the test wasn't run under
/// that identity.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SummaryRow {
    /// The result under [`Identity::First`].
    pub first: Option<bool>,

    /// The result under [`Identity::Second`].
    pub second: Option<bool>,
}

impl SummaryRow {
    /// The result under `identity`.
    pub fn get(&self, identity: Identity) -> Option<bool> {
        match identity {
            Identity::First => self.first,
            Identity::Second => self.second,
        }
    }

    fn set(&mut self, identity: Identity, result: bool) {
        match identity {
            Identity::First => self.first = Some(result),
            Identity::Second => self.second = Some(result),
        }
    }

    /// Returns true if either identity failed.
    pub fn has_failure(&self) -> bool {
        self.first == Some(false) || self.second == Some(false)
    }
}

/// Ledger outcomes grouped by test name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SummaryMatrix {
    rows: IndexMap<String, SummaryRow>,
}

impl SummaryMatrix {
    /// Builds the matrix from outcomes in chronological order. For each test and identity, the
    /// last outcome wins.
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a Outcome>) -> Self {
        let mut rows: IndexMap<String, SummaryRow> = IndexMap::new();
        for outcome in outcomes {
            rows.entry(outcome.test_name.clone())
                .or_default()
                .set(outcome.identity, outcome.result);
        }
        Self { rows }
    }

    /// Builds the matrix from a ledger.
    pub fn from_ledger(ledger: &ResultLedger) -> Self {
        Self::from_outcomes(ledger.entries())
    }

    /// Iterates over rows in the order tests were first seen.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &SummaryRow)> + '_ {
        self.rows.iter().map(|(name, row)| (name.as_str(), row))
    }

    /// The row for a test.
    pub fn get(&self, test_name: &str) -> Option<&SummaryRow> {
        self.rows.get(test_name)
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no tests were recorded.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Names of tests that failed under at least one identity.
    pub fn failed_test_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows()
            .filter(|(_, row)| row.has_failure())
            .map(|(name, _)| name)
    }

    /// Returns true if no row has a failure.
    pub fn is_success(&self) -> bool {
        self.failed_test_names().next().is_none()
    }

    /// Arguments that rerun exactly the failed tests, one per distinct test name.
    pub fn rerun_hints(&self) -> Vec<String> {
        self.failed_test_names()
            .map(|name| format!("-o {}", shell_words::quote(name)))
            .collect()
    }

    /// Renders the matrix as CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str(SUMMARY_CSV_HEADER);
        csv.push('\n');
        for (name, row) in self.rows() {
            swriteln!(
                csv,
                "{},{},{}",
                CsvField(name),
                CsvCell(row.first),
                CsvCell(row.second),
            );
        }
        csv
    }

    /// Writes the CSV to `dir`, under a name derived from `now`. Returns the path written.
    pub fn write_csv(
        &self,
        dir: &Utf8Path,
        now: DateTime<Local>,
    ) -> Result<Utf8PathBuf, WriteSummaryError> {
        let path = dir.join(summary_file_name(now));
        let csv = self.to_csv();
        let file = AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite);
        match file.write(|f| f.write_all(csv.as_bytes())) {
            Ok(()) => Ok(path),
            Err(atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error)) => {
                Err(WriteSummaryError::Fs { file: path, error })
            }
        }
    }
}

/// The CSV file name for a run at `now`, e.g. `TestResultSummaryFor2026-19-10--14-05.csv`.
pub fn summary_file_name(now: DateTime<Local>) -> String {
    format!("TestResultSummaryFor{}.csv", now.format("%Y-%d-%-m--%H-%M"))
}

struct CsvCell(Option<bool>);

impl fmt::Display for CsvCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(true) => f.write_str("True"),
            Some(false) => f.write_str("False"),
            None => f.write_str("Unknown/NotRun"),
        }
    }
}

struct CsvField<'a>(&'a str);

impl fmt::Display for CsvField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.contains([',', '"', '\n', '\r']) {
            write!(f, "\"{}\"", self.0.replace('"', "\"\""))
        } else {
            f.write_str(self.0)
        }
    }
}

/// Renders the end-of-run summary.
#[derive(Clone, Debug, Default)]
pub struct SummaryReporter {
    styles: Styles,
    print_failed_only: bool,
    print_rerun_hints: bool,
}

impl SummaryReporter {
    /// Creates a reporter that prints every row and no rerun hints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables colors.
    pub fn colorize(&mut self) -> &mut Self {
        self.styles.colorize();
        self
    }

    /// Only print rows with a failure.
    pub fn set_print_failed_only(&mut self, print_failed_only: bool) -> &mut Self {
        self.print_failed_only = print_failed_only;
        self
    }

    /// Print the arguments that rerun the failed tests.
    pub fn set_print_rerun_hints(&mut self, print_rerun_hints: bool) -> &mut Self {
        self.print_rerun_hints = print_rerun_hints;
        self
    }

    /// Writes the summary for `matrix` to `writer`.
    pub fn write_summary(
        &self,
        matrix: &SummaryMatrix,
        writer: &mut dyn io::Write,
    ) -> Result<(), WriteSummaryError> {
        self.write_summary_impl(matrix, writer).map_err(WriteSummaryError::Io)
    }

    fn write_summary_impl(
        &self,
        matrix: &SummaryMatrix,
        writer: &mut dyn io::Write,
    ) -> io::Result<()> {
        writeln!(writer)?;
        for (name, row) in matrix.rows() {
            let has_failure = row.has_failure();
            if self.print_failed_only && !has_failure {
                continue;
            }
            write!(
                writer,
                "{name:>35}\t\t FirstPassed:{}\tSecondPassed:{}",
                self.styled_cell(row.first),
                self.styled_cell(row.second),
            )?;
            if has_failure {
                write!(writer, " {}", "<---".style(self.styles.fail))?;
            }
            writeln!(writer)?;
        }

        let failed: Vec<_> = matrix.failed_test_names().collect();
        if self.print_rerun_hints && !failed.is_empty() {
            writeln!(writer, "\nTo rerun the failed {}:", plural::tests_str(failed.len()))?;
            writeln!(writer, "  {}", matrix.rerun_hints().join(" "))?;
        }

        if failed.is_empty() {
            writeln!(
                writer,
                "\n{} All tests passed.",
                "Success:".style(self.styles.pass)
            )?;
        } else {
            writeln!(
                writer,
                "\n{} {} {} failed under at least one identity.",
                "Failure:".style(self.styles.fail),
                failed.len().style(self.styles.count),
                plural::tests_str(failed.len()),
            )?;
        }
        Ok(())
    }

    fn styled_cell(&self, result: Option<bool>) -> impl fmt::Display {
        let style = match result {
            Some(true) => self.styles.pass,
            Some(false) => self.styles.fail,
            None => Style::new(),
        };
        let text = match result {
            Some(true) => "True",
            Some(false) => "False",
            None => "Unknown",
        };
        style.style(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use chrono::TimeZone;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn outcome(name: &str, identity: Identity, result: bool) -> Outcome {
        Outcome {
            result,
            test_name: name.to_owned(),
            identity,
            is_scenario: false,
        }
    }

    fn sample_matrix() -> SummaryMatrix {
        let outcomes = [
            outcome("CreateAccount", Identity::First, true),
            outcome("CreateAccount", Identity::Second, false),
            outcome("DeleteAccount", Identity::First, true),
            outcome("Cleanup", Identity::Second, true),
        ];
        SummaryMatrix::from_outcomes(&outcomes)
    }

    #[test]
    fn last_outcome_per_identity_wins() {
        let outcomes = [
            outcome("CreateAccount", Identity::First, false),
            outcome("CreateAccount", Identity::Second, true),
            outcome("CreateAccount", Identity::First, true),
        ];
        let matrix = SummaryMatrix::from_outcomes(&outcomes);
        assert_eq!(
            matrix.get("CreateAccount"),
            Some(&SummaryRow {
                first: Some(true),
                second: Some(true),
            })
        );
        assert!(matrix.is_success());
    }

    #[test]
    fn csv_has_one_row_per_test() {
        assert_eq!(
            sample_matrix().to_csv(),
            indoc! {"
                API Name,FirstPassed,SecondPassed
                CreateAccount,True,False
                DeleteAccount,True,Unknown/NotRun
                Cleanup,Unknown/NotRun,True
            "},
        );
    }

    #[test]
    fn csv_quotes_awkward_names() {
        let outcomes = [outcome("Create \"big\", account", Identity::First, true)];
        let csv = SummaryMatrix::from_outcomes(&outcomes).to_csv();
        assert_eq!(
            csv.lines().nth(1),
            Some(r#""Create ""big"", account",True,Unknown/NotRun"#)
        );
    }

    #[test]
    fn rerun_hints_are_deduplicated_and_quoted() {
        let outcomes = [
            outcome("CreateAccount", Identity::First, false),
            outcome("CreateAccount", Identity::Second, false),
            outcome("Close Account", Identity::First, false),
            outcome("DeleteAccount", Identity::First, true),
        ];
        let matrix = SummaryMatrix::from_outcomes(&outcomes);
        assert_eq!(
            matrix.rerun_hints(),
            vec!["-o CreateAccount", "-o 'Close Account'"]
        );
    }

    #[test]
    fn summary_marks_failures() {
        let mut reporter = SummaryReporter::new();
        reporter.set_print_rerun_hints(true);
        let mut buf = Vec::new();
        reporter
            .write_summary(&sample_matrix(), &mut buf)
            .expect("writing to a Vec succeeds");
        let out = String::from_utf8(buf).expect("output is UTF-8");

        let expected = format!(
            "\n{:>35}\t\t FirstPassed:True\tSecondPassed:False <---\n\
             {:>35}\t\t FirstPassed:True\tSecondPassed:Unknown\n\
             {:>35}\t\t FirstPassed:Unknown\tSecondPassed:True\n\
             \nTo rerun the failed test:\n  -o CreateAccount\n\
             \nFailure: 1 test failed under at least one identity.\n",
            "CreateAccount", "DeleteAccount", "Cleanup",
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn failed_only_hides_passing_rows() {
        let mut reporter = SummaryReporter::new();
        reporter.set_print_failed_only(true);
        let mut buf = Vec::new();
        reporter
            .write_summary(&sample_matrix(), &mut buf)
            .expect("writing to a Vec succeeds");
        let out = String::from_utf8(buf).expect("output is UTF-8");
        assert!(out.contains("CreateAccount"), "{out}");
        assert!(!out.contains("DeleteAccount"), "{out}");
        assert!(!out.contains("-o "), "{out}");
    }

    #[test]
    fn all_passing_prints_success() {
        let outcomes = [outcome("CreateAccount", Identity::First, true)];
        let mut buf = Vec::new();
        SummaryReporter::new()
            .write_summary(&SummaryMatrix::from_outcomes(&outcomes), &mut buf)
            .expect("writing to a Vec succeeds");
        let out = String::from_utf8(buf).expect("output is UTF-8");
        assert!(out.ends_with("\nSuccess: All tests passed.\n"), "{out}");
    }

    #[test]
    fn csv_file_is_named_after_the_run() {
        let now = Local
            .with_ymd_and_hms(2026, 3, 7, 9, 5, 0)
            .single()
            .expect("unambiguous local time");
        assert_eq!(summary_file_name(now), "TestResultSummaryFor2026-07-3--09-05.csv");

        let dir = Utf8TempDir::new().expect("created temp dir");
        let path = sample_matrix()
            .write_csv(dir.path(), now)
            .expect("wrote CSV");
        assert_eq!(path, dir.path().join("TestResultSummaryFor2026-07-3--09-05.csv"));
        let contents = std::fs::read_to_string(&path).expect("read CSV");
        assert_eq!(contents, sample_matrix().to_csv());
    }
}
