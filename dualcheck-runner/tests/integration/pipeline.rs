// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use chrono::{Local, TimeZone};
use color_eyre::eyre::{Result, eyre};
use dualcheck_runner::{
    compare::{Comparator, ComparisonReport, DiffExporter},
    ledger::SharedLedger,
    options::{Identity, RunOptions},
    recorder::ComparisonStatus,
    reporter::{DisplayReporterBuilder, RunEvent, SummaryMatrix, SummaryReporter, SummaryRow},
    runner::{DualModeSchedulerBuilder, RunOutcomes},
    test_filter::{NameList, TestSelectorBuilder},
};
use maplit::btreeset;
use pretty_assertions::assert_eq;
use test_case::test_case;

fn dual_options() -> RunOptions {
    RunOptions {
        run_dual: true,
        compare_retained: true,
        ..Default::default()
    }
}

#[test]
fn dual_compare_scenario() -> Result<()> {
    let (mut user, api) = fake_api();
    let catalog = accounts_catalog(api);
    let mut selector = TestSelectorBuilder::new();
    selector.include_tests(NameList::new(["createaccount"]));
    let tests = selector.build().select(&catalog);
    assert_eq!(tests.len(), 1);

    let ledger = SharedLedger::new();
    let mut builder = DualModeSchedulerBuilder::new();
    builder.set_ledger(ledger.clone());
    let mut scheduler = builder.build(dual_options(), Some(&mut user));

    let mut reports: Vec<ComparisonReport> = Vec::new();
    let mut users_seen = Vec::new();
    let outcomes = scheduler.execute(&tests, |event| match event {
        RunEvent::ComparisonFinished { report } => reports.push(report.clone()),
        RunEvent::TestFinished { identity, .. } => users_seen.push(identity),
        _ => {}
    });

    assert!(outcomes.is_success());
    assert_eq!(users_seen, vec![Identity::First, Identity::Second]);

    let [report] = reports.as_slice() else {
        return Err(eyre!("expected exactly one comparison, got {reports:?}"));
    };
    assert_eq!(report.step_id.as_str(), "CreateAccountCall");
    let paths: Vec<_> = report.differences.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["owner", "createdAt"]);
    assert_eq!(
        report.differences[0].display_first().to_string(),
        "usertype1"
    );

    assert!(
        scheduler
            .evidence()
            .iter()
            .all(|record| record.status() == ComparisonStatus::Finished)
    );

    let matrix = SummaryMatrix::from_ledger(&ledger.snapshot());
    assert_eq!(matrix.len(), 1);
    assert_eq!(
        matrix.get("CreateAccount"),
        Some(&SummaryRow {
            first: Some(true),
            second: Some(true),
        })
    );
    Ok(())
}

#[test]
fn ignored_fields_compare_equal() {
    let (mut user, api) = fake_api();
    let catalog = accounts_catalog(api);
    let mut selector = TestSelectorBuilder::new();
    selector.include_tests(NameList::new(["GetAccount"]));
    let tests = selector.build().select(&catalog);

    let mut scheduler = DualModeSchedulerBuilder::new().build(dual_options(), Some(&mut user));
    let outcomes = scheduler.execute(&tests, |_| {});
    assert!(outcomes.is_success());
    assert_eq!(outcomes.stats().comparisons, 1);
    assert_eq!(outcomes.stats().comparisons_with_differences, 0);
}

#[test]
fn csv_export_scenario() -> Result<()> {
    let (mut user, api) = fake_api();
    let catalog = accounts_catalog(api);
    let mut selector = TestSelectorBuilder::new();
    selector.include_tests(NameList::new(["CreateAccount", "DeleteAccount"]));
    let tests = selector.build().select(&catalog);

    let ledger = SharedLedger::new();
    let mut builder = DualModeSchedulerBuilder::new();
    builder.set_ledger(ledger.clone());
    let mut scheduler = builder.build(dual_options(), Some(&mut user));
    let outcomes = scheduler.execute(&tests, |_| {});
    assert!(!outcomes.is_success(), "DeleteAccount fails for the second identity");

    let dir = Utf8TempDir::new()?;
    let now = Local
        .with_ymd_and_hms(2026, 10, 19, 14, 5, 0)
        .single()
        .ok_or_else(|| eyre!("ambiguous local time"))?;
    let path = SummaryMatrix::from_ledger(&ledger.snapshot()).write_csv(dir.path(), now)?;

    assert_eq!(path.file_name(), Some("TestResultSummaryFor2026-19-10--14-05.csv"));
    assert_eq!(
        std::fs::read_to_string(&path)?,
        "API Name,FirstPassed,SecondPassed\n\
         CreateAccount,True,True\n\
         DeleteAccount,True,False\n"
    );
    Ok(())
}

#[test]
fn single_identity_leaves_other_column_unknown() {
    let (mut user, api) = fake_api();
    let catalog = accounts_catalog(api);
    let tests = catalog.all_tests();

    let ledger = SharedLedger::new();
    let mut builder = DualModeSchedulerBuilder::new();
    builder.set_ledger(ledger.clone());
    let options = RunOptions {
        identity: Identity::First,
        ..Default::default()
    };
    let mut scheduler = builder.build(options, Some(&mut user));
    let outcomes = scheduler.execute(&tests, |_| {});
    assert!(outcomes.is_success());

    let csv = SummaryMatrix::from_ledger(&ledger.snapshot()).to_csv();
    assert_eq!(
        csv,
        "API Name,FirstPassed,SecondPassed\n\
         CreateAccount,True,Unknown/NotRun\n\
         GetAccount,True,Unknown/NotRun\n\
         DeleteAccount,True,Unknown/NotRun\n\
         Cleanup,True,Unknown/NotRun\n"
    );
}

// Failing the first K attempts with a retry budget of N passes after K+1 attempts if K <= N, and
// fails after N+1 attempts otherwise.
#[test_case(0, 0, true, 1; "passes first time")]
#[test_case(2, 2, true, 3; "passes on last retry")]
#[test_case(1, 3, true, 2; "passes early")]
#[test_case(3, 2, false, 3; "exhausts retries")]
fn retry_law(failures: u32, retries: u32, expected_success: bool, expected_attempts: usize) {
    let (mut user, api) = fake_api();
    api.fail_next_gets(failures);
    let catalog = accounts_catalog(api);
    let mut selector = TestSelectorBuilder::new();
    selector.include_tests(NameList::new(["GetAccount"]));
    let tests = selector.build().select(&catalog);

    let ledger = SharedLedger::new();
    let mut builder = DualModeSchedulerBuilder::new();
    builder.set_ledger(ledger.clone());
    let options = RunOptions {
        identity: Identity::First,
        retries,
        ..Default::default()
    };
    let mut scheduler = builder.build(options, Some(&mut user));
    let mut attempts = Vec::new();
    let outcomes = scheduler.execute(&tests, |event| {
        if let RunEvent::TestFinished { statuses, .. } = event {
            attempts.push(statuses.len());
        }
    });

    assert_eq!(outcomes.is_success(), expected_success);
    assert_eq!(attempts, vec![expected_attempts]);

    // Retried failures are replaced in the ledger, so only the final result remains.
    let snapshot = ledger.snapshot();
    let results: Vec<_> = snapshot.entries().iter().map(|o| o.result).collect();
    assert_eq!(results, vec![expected_success]);
}

#[test]
fn include_overrides_excludes_and_disable_switch_drops() {
    let (_, api) = fake_api();
    let catalog = accounts_catalog(api);

    let mut selector = TestSelectorBuilder::new();
    selector
        .include_tests(NameList::new(["GetAccount"]))
        .exclude_tests(NameList::new(["GetAccount"]))
        .exclude_suites(NameList::new(["Accounts"]));
    let names: Vec<_> = selector
        .build()
        .select(&catalog)
        .iter()
        .map(|test| test.name().to_owned())
        .collect();
    assert_eq!(names, vec!["GetAccount"]);

    let mut selector = TestSelectorBuilder::new();
    selector.disabled_switches(btreeset! {"deletes".to_owned()});
    let names: Vec<_> = selector
        .build()
        .select(&catalog)
        .iter()
        .map(|test| test.name().to_owned())
        .collect();
    assert_eq!(names, vec!["CreateAccount", "GetAccount", "Cleanup"]);
}

#[test]
fn exported_payloads_and_display_output() -> Result<()> {
    let (mut user, api) = fake_api();
    let catalog = accounts_catalog(api);
    let mut selector = TestSelectorBuilder::new();
    selector.include_tests(NameList::new(["CreateAccount"]));
    let tests = selector.build().select(&catalog);

    let dir = Utf8TempDir::new()?;
    let diff_dir = dir.path().join("ObjectDiffs");
    let mut builder = DualModeSchedulerBuilder::new();
    builder.set_comparator(Comparator::new().with_exporter(DiffExporter::new(&diff_dir)));
    let options = RunOptions {
        write_diffs_to_files: true,
        ..dual_options()
    };
    let mut scheduler = builder.build(options, Some(&mut user));

    let mut reporter = DisplayReporterBuilder::new().build();
    let mut out = Vec::new();
    let outcomes: RunOutcomes =
        scheduler.try_execute(&tests, |event| reporter.write_event(&event, &mut out))?;
    assert!(outcomes.is_success());

    let out = String::from_utf8(out)?;
    assert!(
        out.contains("Response differences from step:'CreateAccount' via call to 'CreateAccountCall':"),
        "{out}"
    );
    assert!(out.contains("\t#0 'owner' First=usertype1, Second=usertype2"), "{out}");
    assert!(out.contains("Speed diff -> First: "), "{out}");

    let first = diff_dir.join("CreateAccount-CreateAccountCall-First.log");
    let second = diff_dir.join("CreateAccount-CreateAccountCall-Second.log");
    assert!(out.contains(&format!("Wrote compared payloads to {first} and {second}")), "{out}");
    let payload: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&second)?)?;
    assert_eq!(payload["owner"], "usertype2");
    Ok(())
}

#[test]
fn summary_of_mixed_run() {
    let (mut user, api) = fake_api();
    let catalog = accounts_catalog(api);
    let tests = catalog.all_tests();

    let ledger = SharedLedger::new();
    let mut builder = DualModeSchedulerBuilder::new();
    builder.set_ledger(ledger.clone());
    let mut scheduler = builder.build(dual_options(), Some(&mut user));
    scheduler.execute(&tests, |_| {});

    let mut reporter = SummaryReporter::new();
    reporter.set_print_failed_only(true).set_print_rerun_hints(true);
    let mut out = Vec::new();
    reporter
        .write_summary(&SummaryMatrix::from_ledger(&ledger.snapshot()), &mut out)
        .expect("writing to a Vec succeeds");
    let out = String::from_utf8(out).expect("output is UTF-8");

    assert_eq!(out.matches("<---").count(), 1, "{out}");
    assert!(out.contains("DeleteAccount"), "{out}");
    assert!(out.contains("  -o DeleteAccount\n"), "{out}");
    assert!(out.ends_with("Failure: 1 test failed under at least one identity.\n"), "{out}");
}
