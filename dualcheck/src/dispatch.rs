// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles},
    probe::TcpProbe,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use clap::{
    Args, CommandFactory, Parser, Subcommand,
    error::{ContextKind, ContextValue, ErrorKind},
};
use dualcheck_metadata::DualcheckExitCode;
use dualcheck_runner::{
    catalog::{CatalogStyles, TestCatalog},
    compare::{Comparator, DiffExporter},
    config::{DualcheckConfig, DualcheckProfile},
    errors::{DisplayErrorChain, WriteEventError, WriteSummaryError},
    identity::{AlwaysReachable, ConnectivityProbe, IdentitySwitcher},
    ledger::SharedLedger,
    options::{Identity, OutcomeRetention, RunOptions},
    reporter::{DisplayReporterBuilder, SummaryMatrix, SummaryReporter},
    runner::DualModeSchedulerBuilder,
    signal::ShutdownHook,
    test_filter::{NameList, TestSelectorBuilder},
};
use std::{ffi::OsString, io::Write};
use supports_color::Stream;
use tracing::{info, warn};

/// Runs API integration tests under two caller identities and compares the responses.
#[derive(Debug, Parser)]
#[command(version, name = "dualcheck", styles = clap_styles::style())]
pub struct DualcheckApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl DualcheckApp {
    /// Parses command-line arguments.
    ///
    /// A missing subcommand or required argument is reported as
    /// [`ExpectedError::MissingArguments`]; every other parse failure, as well as `--help` and
    /// `--version`, as [`ExpectedError::ArgumentParse`].
    pub fn parse_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|err| match err.kind() {
            ErrorKind::MissingRequiredArgument
            | ErrorKind::MissingSubcommand
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                let usage = Self::command().render_usage().to_string();
                ExpectedError::missing_arguments(missing_arguments(&err), usage)
            }
            _ => ExpectedError::argument_parse(err),
        })
    }

    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app against `harness`, returning the process exit code.
    pub fn exec(
        self,
        harness: Harness<'_>,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let Command::RunApiTests(opts) = self.command;
        opts.exec(&self.config_opts, harness, output, output_writer)
    }
}

fn missing_arguments(err: &clap::Error) -> Vec<String> {
    match err.get(ContextKind::InvalidArg) {
        Some(ContextValue::Strings(args)) => args.clone(),
        Some(ContextValue::String(arg)) => vec![arg.clone()],
        _ => vec!["<COMMAND>".to_owned()],
    }
}

/// What a run executes: the compiled-in test catalog and the hooks into the API client.
pub struct Harness<'a> {
    catalog: &'a TestCatalog,
    switcher: Option<&'a mut dyn IdentitySwitcher>,
    root: Option<Utf8PathBuf>,
    install_interrupt_hook: bool,
}

impl<'a> Harness<'a> {
    /// Creates a harness for `catalog`. Config is looked up relative to the current directory.
    pub fn new(catalog: &'a TestCatalog) -> Self {
        Self {
            catalog,
            switcher: None,
            root: None,
            install_interrupt_hook: true,
        }
    }

    /// Impersonates each identity's user through `switcher`.
    pub fn with_switcher(mut self, switcher: &'a mut dyn IdentitySwitcher) -> Self {
        self.switcher = Some(switcher);
        self
    }

    /// Resolves config and relative paths against `root` instead of the current directory.
    pub fn with_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    #[cfg(test)]
    pub(crate) fn without_interrupt_hook(mut self) -> Self {
        self.install_interrupt_hook = false;
        self
    }

    fn root(&self) -> Result<Utf8PathBuf> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        let current_dir =
            std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
        Utf8PathBuf::try_from(current_dir).map_err(|err| ExpectedError::CurrentDirFailed {
            err: err.into_io_error(),
        })
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/dualcheck.toml in the current directory]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, root: &Utf8Path) -> Result<DualcheckConfig> {
        Ok(DualcheckConfig::from_sources(
            root,
            self.config_file.as_deref(),
        )?)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the API integration tests
    ///
    /// Each selected test runs under the second identity, or with --dual under both identities
    /// in turn. Singular tests run once, after all other tests.
    #[command(visible_alias = "RunApiTests")]
    RunApiTests(RunApiTestsOpts),
}

#[derive(Debug, Args)]
struct RunApiTestsOpts {
    /// List suites and their tests without running anything
    #[arg(long, visible_alias = "ll")]
    list: bool,

    #[command(flatten)]
    filter_opts: TestFilterOpts,

    #[command(flatten)]
    runner_opts: TestRunnerOpts,

    #[command(flatten)]
    compare_opts: CompareOpts,

    #[command(flatten)]
    reporter_opts: ReporterOpts,
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "FILTER OPTIONS")]
struct TestFilterOpts {
    /// Run only these tests, regardless of suite filters
    #[arg(short = 'o', long = "only", value_name = "TEST")]
    only_tests: Vec<String>,

    /// Run only tests in these suites
    #[arg(long = "only-suite", value_name = "SUITE")]
    only_suites: Vec<String>,

    /// Exclude these tests
    #[arg(long = "exclude-test", value_name = "TEST")]
    exclude_tests: Vec<String>,

    /// Exclude tests in these suites
    #[arg(long = "exclude-suite", value_name = "SUITE")]
    exclude_suites: Vec<String>,

    /// Drop tests guarded by this switch
    #[arg(long, value_name = "SWITCH")]
    disable: Vec<String>,

    /// Run only the last selected test
    #[arg(short = 'l', long)]
    last: bool,

    /// Run tests in reverse order
    #[arg(short = 'r', long)]
    reverse: bool,
}

impl TestFilterOpts {
    fn to_builder(&self) -> TestSelectorBuilder {
        let mut builder = TestSelectorBuilder::new();
        builder
            .include_tests(NameList::new(&self.only_tests))
            .include_suites(NameList::new(&self.only_suites))
            .exclude_tests(NameList::new(&self.exclude_tests))
            .exclude_suites(NameList::new(&self.exclude_suites))
            .disabled_switches(self.disable.iter().cloned().collect())
            .last_only(self.last)
            .reverse(self.reverse);
        builder
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "RUNNER OPTIONS")]
struct TestRunnerOpts {
    /// Dualcheck profile to use
    #[arg(long, short = 'P', env = "DUALCHECK_PROFILE")]
    profile: Option<String>,

    /// Run each test under both identities, first then second
    #[arg(short = 'd', long)]
    dual: bool,

    /// Don't exercise the second identity: run as the first and skip the connectivity probe
    #[arg(long)]
    no_second_client: bool,

    /// Go through the motions without invoking any test body
    #[arg(long)]
    dry_run: bool,

    /// Retry a failing test up to this many times [default: from profile]
    #[arg(long, visible_alias = "retries", value_name = "COUNT")]
    repeat_until_success_count: Option<u32>,

    /// Impersonate this user for every attempt ("default" uses the per-identity users)
    #[arg(long, visible_alias = "uuid", value_name = "USER")]
    run_as: Option<String>,

    /// Ask tests to verify that deleted subjects are really gone (slower)
    #[arg(long, visible_alias = "verify-deletes")]
    validate_deletes: bool,

    /// Keep every attempt's outcome instead of collapsing repeats
    #[arg(long)]
    keep_outcome_history: bool,
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "COMPARISON OPTIONS")]
struct CompareOpts {
    /// Compare the responses retained under each identity (dual mode only)
    #[arg(short = 'c', long)]
    compare: bool,

    /// Retain every recorded response for comparison
    #[arg(long)]
    always_retain_responses: bool,

    /// Write each compared pair of responses to the diff output directory
    #[arg(long, visible_alias = "diffs-to-files")]
    write_diffs_to_files: bool,

    /// Log the value returned by each recorded call
    #[arg(long)]
    print_return_values: bool,
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "REPORTER OPTIONS")]
struct ReporterOpts {
    /// Save the summary as a CSV file in the profile's summary directory
    #[arg(long, visible_alias = "record")]
    record_results: bool,

    /// Only list failed tests in the summary
    #[arg(long, visible_alias = "print-failed-only")]
    print_only_failed: bool,

    /// Don't print the command line for rerunning failed tests
    #[arg(long, visible_alias = "dont-print-rerun")]
    no_rerun_commands: bool,
}

impl ReporterOpts {
    fn to_summary_reporter(&self, colorize: bool) -> SummaryReporter {
        let mut reporter = SummaryReporter::new();
        reporter
            .set_print_failed_only(self.print_only_failed)
            .set_print_rerun_hints(!self.no_rerun_commands);
        if colorize {
            reporter.colorize();
        }
        reporter
    }
}

impl RunApiTestsOpts {
    fn run_options(&self, profile: &DualcheckProfile<'_>, output: OutputContext) -> RunOptions {
        let runner = &self.runner_opts;
        let compare = &self.compare_opts;
        RunOptions {
            identity: if runner.no_second_client {
                Identity::First
            } else {
                Identity::Second
            },
            run_dual: runner.dual,
            compare_retained: compare.compare || profile.compare(),
            always_retain_responses: compare.always_retain_responses
                || profile.always_retain_responses(),
            write_diffs_to_files: compare.write_diffs_to_files,
            dry_run: runner.dry_run,
            retries: runner
                .repeat_until_success_count
                .unwrap_or_else(|| profile.retries()),
            verbose: output.verbose,
            quiet: output.quiet,
            print_return_values: compare.print_return_values || output.verbose,
            validate_deletes: runner.validate_deletes,
            run_as: runner.run_as.clone(),
            specific_tests: self.filter_opts.only_tests.clone(),
            disabled_switches: self.filter_opts.disable.iter().cloned().collect(),
            outcome_retention: if runner.keep_outcome_history {
                OutcomeRetention::History
            } else {
                OutcomeRetention::Collapse
            },
        }
    }

    fn exec(
        self,
        config_opts: &ConfigOpts,
        harness: Harness<'_>,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        if self.list {
            let mut styles = CatalogStyles::default();
            if output.color.should_colorize(Stream::Stdout) {
                styles.colorize();
            }
            let mut writer = output_writer.stdout_writer();
            harness
                .catalog
                .write_list(&styles, &mut writer)
                .and_then(|()| writer.flush())
                .map_err(|err| ExpectedError::WriteOutput { err })?;
            return Ok(DualcheckExitCode::OK);
        }

        let root = harness.root()?;
        let config = config_opts.make_config(&root)?;
        let profile = config.profile(
            self.runner_opts
                .profile
                .as_deref()
                .unwrap_or(DualcheckConfig::DEFAULT_PROFILE),
        )?;

        let options = self.run_options(&profile, output);
        if output.verbose {
            info!("running with profile `{}`:\n{options}", profile.name());
        }

        if !self.runner_opts.no_second_client {
            check_connectivity(&profile)?;
        }

        let selector = self.filter_opts.to_builder();
        let tests = selector.build().select(harness.catalog);
        if tests.is_empty() {
            warn!("no tests matched the given filters");
        }

        let colorize = output.color.should_colorize(Stream::Stderr);
        let ledger = SharedLedger::new();
        let summary = self.reporter_opts.to_summary_reporter(colorize);
        let summary_dir = profile.summary_dir();
        if harness.install_interrupt_hook {
            let mut hook = ShutdownHook::new(ledger.clone(), summary.clone());
            if self.reporter_opts.record_results {
                hook = hook.with_csv_dir(&summary_dir);
            }
            if let Err(err) = hook.install() {
                warn!(
                    "interrupting the run won't print a summary: {}",
                    DisplayErrorChain::new(&err),
                );
            }
        }

        let mut comparator = Comparator::new();
        if options.write_diffs_to_files {
            comparator = comparator.with_exporter(DiffExporter::new(profile.diff_output_dir()));
        }
        let mut scheduler_builder = DualModeSchedulerBuilder::new();
        scheduler_builder
            .set_comparator(comparator)
            .set_ledger(ledger.clone())
            .set_default_diff(profile.diff_config().clone())
            .set_identity_users(profile.identity_users());
        let mut scheduler = scheduler_builder.build(options, harness.switcher);

        let mut reporter = DisplayReporterBuilder::new()
            .set_colorize(colorize)
            .set_quiet(output.quiet)
            .build();
        let mut writer = output_writer.stderr_writer();
        let outcomes = scheduler.try_execute(&tests, |event| {
            // Write and flush the event.
            reporter.write_event(&event, &mut writer)?;
            writer.flush().map_err(WriteEventError::Io)
        })?;

        let matrix = SummaryMatrix::from_ledger(&ledger.snapshot());
        summary.write_summary(&matrix, &mut writer)?;
        writer.flush().map_err(WriteSummaryError::Io)?;

        if self.reporter_opts.record_results {
            let path = matrix.write_csv(&summary_dir, Local::now())?;
            info!("saved results to {path}");
        }

        if outcomes.is_success() && matrix.is_success() {
            Ok(DualcheckExitCode::OK)
        } else {
            Err(ExpectedError::test_run_failed())
        }
    }
}

fn check_connectivity(profile: &DualcheckProfile<'_>) -> Result<()> {
    let probe: Box<dyn ConnectivityProbe> = match profile.connectivity_probe() {
        Some(address) => Box::new(TcpProbe::new(address, profile.probe_timeout())),
        None => Box::new(AlwaysReachable),
    };
    probe.probe().map_err(ExpectedError::api_unreachable)
}
