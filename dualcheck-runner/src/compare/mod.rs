// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairing and comparing responses recorded under the two identities.
//!
//! After each dual-mode attempt, the [`Comparator`] groups the [`EvidenceStore`] by step id. A
//! group is compared once it holds exactly one not-yet-compared record per identity; both records
//! are then marked finished so they're never compared again.

mod diff;
mod export;

pub use diff::*;
pub use export::*;

use crate::{
    errors::DisplayErrorChain,
    options::Identity,
    recorder::{CallRecord, ComparisonStatus, EvidenceStore, RecordKey, StepId},
    time::signed_millis_delta,
};
use camino::Utf8PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// The result of comparing one pair of records.
#[derive(Clone, Debug)]
pub struct ComparisonReport {
    /// The name of the recorded step.
    pub test_name: String,

    /// The step id both records share.
    pub step_id: StepId,

    /// Differences between the two payloads.
    pub differences: Vec<Difference>,

    /// True if more differences existed than were reported.
    pub truncated: bool,

    /// How long the first identity's call took.
    pub first_elapsed: Duration,

    /// How long the second identity's call took.
    pub second_elapsed: Duration,

    /// Where the payloads were written, if exported.
    pub exported: Option<(Utf8PathBuf, Utf8PathBuf)>,
}

impl ComparisonReport {
    /// Returns true if the payloads differed.
    pub fn has_differences(&self) -> bool {
        !self.differences.is_empty()
    }

    /// `second - first` in milliseconds: positive when the second identity was slower.
    pub fn time_delta_ms(&self) -> i128 {
        signed_millis_delta(self.first_elapsed, self.second_elapsed)
    }
}

/// Compares eligible pairs in an [`EvidenceStore`].
#[derive(Clone, Debug, Default)]
pub struct Comparator {
    exporter: Option<DiffExporter>,
}

impl Comparator {
    /// Creates a comparator that doesn't write payloads to disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write each compared pair to disk.
    pub fn with_exporter(mut self, exporter: DiffExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Compares every eligible pair, in order of each step id's first appearance.
    ///
    /// Ineligible groups (wrong size, both records from one identity, or already compared) are
    /// skipped without error.
    pub fn compare_pending(&self, store: &mut EvidenceStore) -> Vec<ComparisonReport> {
        let eligible: Vec<(RecordKey, RecordKey)> = store
            .keys_by_step()
            .into_iter()
            .filter_map(|(step_id, keys)| eligible_pair(store, step_id, &keys))
            .collect();

        eligible
            .into_iter()
            .filter_map(|(first_key, second_key)| {
                let report = {
                    let first = store.get(&first_key)?;
                    let second = store.get(&second_key)?;
                    self.compare_pair(first, second)
                };
                for key in [&first_key, &second_key] {
                    if let Some(record) = store.get_mut(key) {
                        record.mark_finished();
                    }
                }
                Some(report)
            })
            .collect()
    }

    fn compare_pair(&self, first: &CallRecord, second: &CallRecord) -> ComparisonReport {
        let result = diff_values(first.payload(), second.payload(), first.diff_config());

        let exported = self
            .exporter
            .as_ref()
            .and_then(|exporter| match exporter.export(first, second) {
                Ok(paths) => Some(paths),
                Err(error) => {
                    warn!(
                        "failed to write payloads for step '{}': {}",
                        first.test_name(),
                        DisplayErrorChain::new(&error),
                    );
                    None
                }
            });

        ComparisonReport {
            test_name: first.test_name().to_owned(),
            step_id: first.step_id().clone(),
            differences: result.differences,
            truncated: result.truncated,
            first_elapsed: first.elapsed(),
            second_elapsed: second.elapsed(),
            exported,
        }
    }
}

fn eligible_pair(
    store: &EvidenceStore,
    step_id: &StepId,
    keys: &[&RecordKey],
) -> Option<(RecordKey, RecordKey)> {
    let [a, b] = keys else {
        debug!(%step_id, records = keys.len(), "skipping comparison: need exactly two records");
        return None;
    };

    let (first, second) = match (a.identity, b.identity) {
        (Identity::First, Identity::Second) => (*a, *b),
        (Identity::Second, Identity::First) => (*b, *a),
        _ => {
            debug!(%step_id, "skipping comparison: both records are from one identity");
            return None;
        }
    };

    let finished = [first, second].iter().any(|key| {
        store
            .get(key)
            .is_none_or(|record| record.status() == ComparisonStatus::Finished)
    });
    if finished {
        return None;
    }

    Some((first.clone(), second.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn record(step: &str, identity: Identity, payload: Value, millis: u64) -> CallRecord {
        CallRecord::new(
            "Get Account",
            StepId::new(step),
            identity,
            payload,
            Duration::from_millis(millis),
            Arc::new(DiffConfig::default()),
        )
    }

    #[test]
    fn compares_each_pair_once() {
        let mut store = EvidenceStore::new();
        store.insert(record("get", Identity::First, json!({"name": "alice"}), 120));
        store.insert(record("get", Identity::Second, json!({"name": "bob"}), 450));

        let comparator = Comparator::new();
        let reports = comparator.compare_pending(&mut store);
        assert_eq!(reports.len(), 1);

        let report = &reports[0];
        assert_eq!(report.step_id.as_str(), "get");
        assert_eq!(report.differences.len(), 1);
        assert_eq!(report.differences[0].path, "name");
        assert_eq!(report.time_delta_ms(), 330);
        assert!(report.exported.is_none());
        assert!(
            store
                .iter()
                .all(|record| record.status() == ComparisonStatus::Finished)
        );

        assert!(
            comparator.compare_pending(&mut store).is_empty(),
            "finished records are not compared again"
        );
    }

    #[test]
    fn skips_ineligible_groups() {
        let mut store = EvidenceStore::new();
        // Only one identity so far.
        store.insert(record("create", Identity::First, json!(1), 10));
        // Three records under one step id: same test name twice would collapse, so vary names.
        store.insert(record("list", Identity::First, json!([]), 10));
        store.insert(record("list", Identity::Second, json!([]), 10));
        store.insert(CallRecord::new(
            "List Accounts Again",
            StepId::new("list"),
            Identity::Second,
            json!([1]),
            Duration::from_millis(10),
            Arc::new(DiffConfig::default()),
        ));

        let reports = Comparator::new().compare_pending(&mut store);
        assert!(reports.is_empty(), "{reports:?}");
        assert!(
            store
                .iter()
                .all(|record| record.status() == ComparisonStatus::NotStarted)
        );
    }

    #[test]
    fn records_arriving_after_a_comparison_are_not_paired() {
        let comparator = Comparator::new();

        // A third record under a step id whose pair is already finished.
        let mut store = EvidenceStore::new();
        store.insert(record("get", Identity::First, json!({"name": "alice"}), 10));
        store.insert(record("get", Identity::Second, json!({"name": "bob"}), 10));
        assert_eq!(comparator.compare_pending(&mut store).len(), 1);
        store.insert(CallRecord::new(
            "Get Account Again",
            StepId::new("get"),
            Identity::Second,
            json!({"name": "carol"}),
            Duration::from_millis(10),
            Arc::new(DiffConfig::default()),
        ));
        let reports = comparator.compare_pending(&mut store);
        assert!(reports.is_empty(), "{reports:?}");

        // A record replacing one side of a finished pair under the same key.
        let mut store = EvidenceStore::new();
        store.insert(record("get", Identity::First, json!({"name": "alice"}), 10));
        store.insert(record("get", Identity::Second, json!({"name": "bob"}), 10));
        assert_eq!(comparator.compare_pending(&mut store).len(), 1);
        let replaced = store.insert(record("get", Identity::Second, json!({"name": "dave"}), 10));
        assert_eq!(
            replaced.map(|record| record.status()),
            Some(ComparisonStatus::Finished)
        );
        let reports = comparator.compare_pending(&mut store);
        assert!(reports.is_empty(), "{reports:?}");
        assert_eq!(
            store
                .iter()
                .map(|record| record.status())
                .collect::<Vec<_>>(),
            vec![ComparisonStatus::Finished, ComparisonStatus::NotStarted]
        );
    }

    #[test]
    fn identical_payloads_still_finish() {
        let mut store = EvidenceStore::new();
        store.insert(record("get", Identity::Second, json!({"id": 1}), 30));
        store.insert(record("get", Identity::First, json!({"id": 1}), 10));

        let reports = Comparator::new().compare_pending(&mut store);
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].has_differences());
        assert_eq!(reports[0].time_delta_ms(), 20, "first/second ordered by identity");
    }
}
