// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{AttemptMode, RunEvent, RunStats};
use crate::{
    catalog::SelectedTest,
    compare::ComparisonReport,
    errors::WriteEventError,
    helpers::plural,
    options::Identity,
    runner::{AttemptDescription, AttemptResult, AttemptStatus},
};
use owo_colors::{OwoColorize, Style};
use std::{fmt, io, time::Duration};

/// Builds a [`DisplayReporter`].
#[derive(Clone, Debug, Default)]
pub struct DisplayReporterBuilder {
    should_colorize: bool,
    quiet: bool,
}

impl DisplayReporterBuilder {
    /// Creates a builder with colors off and every test shown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether output is colorized.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// In quiet mode, only failures, comparison differences and the final line are shown.
    pub fn set_quiet(&mut self, quiet: bool) -> &mut Self {
        self.quiet = quiet;
        self
    }

    /// Builds the reporter.
    pub fn build(&self) -> DisplayReporter {
        let mut styles = Styles::default();
        if self.should_colorize {
            styles.colorize();
        }
        DisplayReporter {
            styles,
            quiet: self.quiet,
        }
    }
}

/// Writes scheduler events in human-readable form.
#[derive(Clone, Debug)]
pub struct DisplayReporter {
    styles: Styles,
    quiet: bool,
}

impl DisplayReporter {
    /// Writes an event to `writer`.
    pub fn write_event(
        &mut self,
        event: &RunEvent<'_>,
        writer: &mut dyn io::Write,
    ) -> Result<(), WriteEventError> {
        self.write_event_impl(event, writer).map_err(WriteEventError::Io)
    }

    fn write_event_impl(
        &mut self,
        event: &RunEvent<'_>,
        writer: &mut dyn io::Write,
    ) -> io::Result<()> {
        match event {
            RunEvent::RunStarted {
                dual_count,
                singular_count,
                run_dual,
                identity,
            } => {
                write!(writer, "{:>12} ", "Starting".style(self.styles.pass))?;
                write!(
                    writer,
                    "{} dual-mode {}",
                    dual_count.style(self.styles.count),
                    plural::tests_str(*dual_count),
                )?;
                if *run_dual {
                    write!(
                        writer,
                        " as {} and {}",
                        Identity::First.style(self.styles.count),
                        Identity::Second.style(self.styles.count),
                    )?;
                } else {
                    write!(writer, " as {}", identity.style(self.styles.count))?;
                }
                writeln!(
                    writer,
                    ", {} singular {}",
                    singular_count.style(self.styles.count),
                    plural::tests_str(*singular_count),
                )?;
            }
            RunEvent::TestStarted {
                test,
                identity,
                mode,
            } => {
                if !self.quiet {
                    let mode_str = match mode {
                        AttemptMode::Dual => "",
                        AttemptMode::Singular => " (singular)",
                    };
                    writeln!(
                        writer,
                        "\n======= Running {} [{identity}]{mode_str} =======",
                        test.name().style(self.styles.test_name),
                    )?;
                }
            }
            RunEvent::TestSkipped { .. } => {}
            RunEvent::TestAttemptFailedWillRetry {
                test,
                identity,
                status,
            } => {
                write!(
                    writer,
                    "{:>12} ",
                    format!("TRY {} {}", status.attempt, short_status_str(status.result))
                        .style(self.styles.retry),
                )?;
                self.write_test_instance(*test, *identity, status.time_taken, writer)?;
                self.write_message(status, writer)?;
            }
            RunEvent::TestFinished {
                test,
                identity,
                statuses,
                ..
            } => {
                let describe = statuses.describe();
                if self.quiet && statuses.is_success() {
                    return Ok(());
                }
                self.write_status_line(*test, *identity, describe, writer)?;
                if let AttemptDescription::Failure { last_status, .. } = describe {
                    self.write_message(last_status, writer)?;
                }
            }
            RunEvent::ComparisonFinished { report } => {
                self.write_comparison(report, writer)?;
            }
            RunEvent::RunFinished { elapsed, stats, .. } => {
                self.write_final_stats(*elapsed, stats, writer)?;
            }
        }
        Ok(())
    }

    fn write_status_line(
        &self,
        test: SelectedTest<'_>,
        identity: Identity,
        describe: AttemptDescription<'_>,
        writer: &mut dyn io::Write,
    ) -> io::Result<()> {
        let last_status = describe.last_status();
        match describe {
            AttemptDescription::Success { .. } => {
                write!(writer, "{:>12} ", "PASS".style(self.styles.pass))?;
            }
            AttemptDescription::Flaky { .. } => {
                // The skip color doubles as the flaky color.
                write!(
                    writer,
                    "{:>12} ",
                    format!("TRY {} PASS", last_status.attempt).style(self.styles.skip)
                )?;
            }
            AttemptDescription::Failure { .. } => {
                if last_status.result == AttemptResult::DryRun {
                    write!(writer, "{:>12} ", "DRY-RUN".style(self.styles.skip))?;
                } else if last_status.attempt == 1 {
                    write!(
                        writer,
                        "{:>12} ",
                        status_str(last_status.result).style(self.styles.fail)
                    )?;
                } else {
                    write!(
                        writer,
                        "{:>12} ",
                        format!(
                            "TRY {} {}",
                            last_status.attempt,
                            short_status_str(last_status.result)
                        )
                        .style(self.styles.fail)
                    )?;
                }
            }
        }

        self.write_test_instance(test, identity, last_status.time_taken, writer)
    }

    fn write_test_instance(
        &self,
        test: SelectedTest<'_>,
        identity: Identity,
        time_taken: Duration,
        writer: &mut dyn io::Write,
    ) -> io::Result<()> {
        writeln!(
            writer,
            "{}{} {} [{}]",
            DisplayBracketedDuration(time_taken),
            test.suite.style(self.styles.suite),
            test.name().style(self.styles.test_name),
            identity,
        )
    }

    fn write_message(&self, status: &AttemptStatus, writer: &mut dyn io::Write) -> io::Result<()> {
        if let Some(message) = &status.message {
            for line in message.lines() {
                writeln!(writer, "{:>12}   {line}", "")?;
            }
        }
        Ok(())
    }

    fn write_comparison(
        &self,
        report: &ComparisonReport,
        writer: &mut dyn io::Write,
    ) -> io::Result<()> {
        if !report.has_differences() {
            return Ok(());
        }

        writeln!(
            writer,
            "Response differences from step:'{}' via call to '{}':",
            report.test_name.style(self.styles.test_name),
            report.step_id,
        )?;
        for (index, difference) in report.differences.iter().enumerate() {
            writeln!(
                writer,
                "\t#{index} '{}' First={}, Second={}",
                difference.display_path().style(self.styles.diff_path),
                difference.display_first(),
                difference.display_second(),
            )?;
        }
        if report.truncated {
            writeln!(
                writer,
                "\t(stopped after {} {})",
                report.differences.len().style(self.styles.count),
                plural::differences_str(report.differences.len()),
            )?;
        }
        writeln!(
            writer,
            "Speed diff -> First: {} ms, Second: {} ms == {} ms difference",
            report.first_elapsed.as_millis(),
            report.second_elapsed.as_millis(),
            report.time_delta_ms(),
        )?;
        if let Some((first, second)) = &report.exported {
            writeln!(writer, "Wrote compared payloads to {first} and {second}")?;
        }
        Ok(())
    }

    fn write_final_stats(
        &self,
        elapsed: Duration,
        stats: &RunStats,
        writer: &mut dyn io::Write,
    ) -> io::Result<()> {
        let summary_style = if stats.is_success() {
            self.styles.pass
        } else {
            self.styles.fail
        };
        writeln!(writer, "------------")?;
        write!(
            writer,
            "{:>12} {}",
            "Summary".style(summary_style),
            DisplayBracketedDuration(elapsed),
        )?;
        write!(
            writer,
            "{} {} run: {} passed",
            stats.finished_count.style(self.styles.count),
            plural::tests_str(stats.finished_count),
            stats.passed.style(self.styles.pass),
        )?;
        if stats.flaky > 0 {
            write!(
                writer,
                " ({} {})",
                stats.flaky.style(self.styles.count),
                "flaky".style(self.styles.skip),
            )?;
        }
        write!(writer, ", {} failed", stats.failed.style(self.styles.count))?;
        if stats.dry_run > 0 {
            write!(
                writer,
                ", {} not run (dry run)",
                stats.dry_run.style(self.styles.count)
            )?;
        }
        if stats.skipped > 0 {
            write!(
                writer,
                ", {} skipped",
                stats.skipped.style(self.styles.count)
            )?;
        }
        if stats.comparisons > 0 {
            write!(
                writer,
                ", {} {} compared ({} with differences)",
                stats.comparisons.style(self.styles.count),
                plural::steps_str(stats.comparisons),
                stats.comparisons_with_differences.style(self.styles.count),
            )?;
        }
        writeln!(writer)
    }
}

fn status_str(result: AttemptResult) -> &'static str {
    match result {
        AttemptResult::Pass => "PASS",
        AttemptResult::Fail => "FAIL",
        AttemptResult::Error => "ERROR",
        AttemptResult::Panic => "PANIC",
        AttemptResult::DryRun => "DRY-RUN",
    }
}

fn short_status_str(result: AttemptResult) -> &'static str {
    match result {
        AttemptResult::Pass => "PASS",
        AttemptResult::Fail => "FAIL",
        AttemptResult::Error => "ERR",
        AttemptResult::Panic => "PNC",
        AttemptResult::DryRun => "DRY",
    }
}

struct DisplayBracketedDuration(Duration);

impl fmt::Display for DisplayBracketedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Right-aligned to 8 characters, three digits after the decimal point.
        write!(f, "[{:>8.3?}s] ", self.0.as_secs_f64())
    }
}

#[derive(Clone, Debug, Default)]
pub(super) struct Styles {
    pub(super) count: Style,
    pub(super) pass: Style,
    pub(super) retry: Style,
    pub(super) fail: Style,
    pub(super) skip: Style,
    pub(super) suite: Style,
    pub(super) test_name: Style,
    pub(super) diff_path: Style,
}

impl Styles {
    pub(super) fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.retry = Style::new().magenta().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.suite = Style::new().magenta();
        self.test_name = Style::new().blue().bold();
        self.diff_path = Style::new().cyan();
    }
}
