// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capturing API responses from test bodies.
//!
//! Test bodies call [`TestContext::record`] around each API call they make. The context times the
//! call and, if the response should be retained, stores a [`CallRecord`] in the
//! [`EvidenceStore`]. The comparator later pairs records that share a step id across the two
//! identities.

use crate::{
    compare::DiffConfig,
    errors::DisplayErrorChain,
    options::{Identity, RunOptions},
    time::stopwatch,
};
use indexmap::IndexMap;
use serde::Serialize;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Identifies a recorded call so that the same call under both identities can be paired.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StepId(String);

impl StepId {
    /// Creates a new step id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for StepId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a record has already taken part in a comparison.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ComparisonStatus {
    /// Not yet compared.
    NotStarted,

    /// Compared; never compared again.
    Finished,
}

/// Whether a recorded call's response is kept for comparison.
#[derive(Clone, Debug, Default)]
pub enum Retention {
    /// Kept only when the run retains every response.
    #[default]
    Default,

    /// Kept, and compared with this configuration.
    Retain(Arc<DiffConfig>),

    /// Never kept, even when the run retains every response.
    Never,
}

impl Retention {
    /// Retain with the given diff configuration.
    pub fn retain(config: DiffConfig) -> Self {
        Retention::Retain(Arc::new(config))
    }
}

/// A retained response from one identity's call.
#[derive(Clone, Debug)]
pub struct CallRecord {
    test_name: String,
    step_id: StepId,
    identity: Identity,
    payload: serde_json::Value,
    elapsed: Duration,
    diff_config: Arc<DiffConfig>,
    status: ComparisonStatus,
}

impl CallRecord {
    /// Creates a new record that hasn't been compared yet.
    pub fn new(
        test_name: impl Into<String>,
        step_id: StepId,
        identity: Identity,
        payload: serde_json::Value,
        elapsed: Duration,
        diff_config: Arc<DiffConfig>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            step_id,
            identity,
            payload,
            elapsed,
            diff_config,
            status: ComparisonStatus::NotStarted,
        }
    }

    /// The name of the recorded step.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// The step id used for pairing.
    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    /// The identity the call was made under.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// The serialized response.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// How long the call took.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The diff configuration requested by the call site.
    pub fn diff_config(&self) -> &DiffConfig {
        &self.diff_config
    }

    /// Whether the record has been compared.
    pub fn status(&self) -> ComparisonStatus {
        self.status
    }

    pub(crate) fn mark_finished(&mut self) {
        self.status = ComparisonStatus::Finished;
    }

    fn key(&self) -> RecordKey {
        RecordKey {
            test_name: self.test_name.clone(),
            step_id: self.step_id.clone(),
            identity: self.identity,
        }
    }
}

/// Uniquely identifies a record in the [`EvidenceStore`].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RecordKey {
    /// The name of the recorded step.
    pub test_name: String,

    /// The step id.
    pub step_id: StepId,

    /// The identity the call was made under.
    pub identity: Identity,
}

/// Retained call records for the whole run, in insertion order.
#[derive(Clone, Debug, Default)]
pub struct EvidenceStore {
    records: IndexMap<RecordKey, CallRecord>,
}

impl EvidenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing any earlier record with the same key.
    ///
    /// The replacement moves to the end, so grouping order reflects the latest call.
    pub fn insert(&mut self, record: CallRecord) -> Option<CallRecord> {
        let key = record.key();
        let previous = self.records.shift_remove(&key);
        self.records.insert(key, record);
        previous
    }

    /// Returns the record for `key`.
    pub fn get(&self, key: &RecordKey) -> Option<&CallRecord> {
        self.records.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &RecordKey) -> Option<&mut CallRecord> {
        self.records.get_mut(key)
    }

    /// Iterates over records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CallRecord> + '_ {
        self.records.values()
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Groups record keys by step id, in order of each step id's first appearance.
    pub fn keys_by_step(&self) -> IndexMap<&StepId, Vec<&RecordKey>> {
        let mut groups: IndexMap<&StepId, Vec<&RecordKey>> = IndexMap::new();
        for key in self.records.keys() {
            groups.entry(&key.step_id).or_default().push(key);
        }
        groups
    }
}

/// Handed to each test body invocation.
pub struct TestContext<'a> {
    test_name: &'a str,
    options: &'a RunOptions,
    evidence: &'a mut EvidenceStore,
    default_diff: &'a Arc<DiffConfig>,
}

impl<'a> TestContext<'a> {
    /// Creates a new context.
    pub fn new(
        test_name: &'a str,
        options: &'a RunOptions,
        evidence: &'a mut EvidenceStore,
        default_diff: &'a Arc<DiffConfig>,
    ) -> Self {
        Self {
            test_name,
            options,
            evidence,
            default_diff,
        }
    }

    /// The name of the running test.
    pub fn test_name(&self) -> &str {
        self.test_name
    }

    /// Options for this attempt.
    pub fn options(&self) -> &RunOptions {
        self.options
    }

    /// The identity this attempt runs under.
    pub fn identity(&self) -> Identity {
        self.options.identity
    }

    /// Times `producer`, and retains its return value for comparison if `retention` asks for it.
    ///
    /// `name` describes the step in logs and diff output. Records made under the two identities
    /// with the same `step_id` are compared with each other.
    pub fn record<T, F>(
        &mut self,
        name: &str,
        step_id: impl Into<StepId>,
        retention: Retention,
        producer: F,
    ) -> T
    where
        T: Serialize,
        F: FnOnce() -> T,
    {
        let step_id = step_id.into();
        info!(target: "dualcheck::step", "[Step] '{name}'...");

        let start = stopwatch();
        let value = producer();
        let elapsed = start.snapshot().duration;

        info!(
            target: "dualcheck::step",
            "[Step] '{name}' done ({} ms)",
            elapsed.as_millis(),
        );

        self.retain(name, step_id, retention, &value, elapsed);
        value
    }

    /// Like [`record`](Self::record), for producers that can fail.
    ///
    /// Only successful values are retained. Errors are returned to the caller untouched.
    pub fn try_record<T, E, F>(
        &mut self,
        name: &str,
        step_id: impl Into<StepId>,
        retention: Retention,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize,
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        let step_id = step_id.into();
        info!(target: "dualcheck::step", "[Step] '{name}'...");

        let start = stopwatch();
        let result = producer();
        let elapsed = start.snapshot().duration;

        match &result {
            Ok(value) => {
                info!(
                    target: "dualcheck::step",
                    "[Step] '{name}' done ({} ms)",
                    elapsed.as_millis(),
                );
                self.retain(name, step_id, retention, value, elapsed);
            }
            Err(error) => {
                warn!(
                    target: "dualcheck::step",
                    "[Step] '{name}' failed after {} ms: {error}",
                    elapsed.as_millis(),
                );
            }
        }
        result
    }

    fn retain<T: Serialize>(
        &mut self,
        name: &str,
        step_id: StepId,
        retention: Retention,
        value: &T,
        elapsed: Duration,
    ) {
        let diff_config = match retention {
            Retention::Never => return,
            Retention::Retain(config) => config,
            Retention::Default if self.options.always_retain_responses => {
                self.default_diff.clone()
            }
            Retention::Default => return,
        };

        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    "not retaining response from step '{name}': {}",
                    DisplayErrorChain::new(&error),
                );
                return;
            }
        };

        if self.options.print_return_values {
            info!(target: "dualcheck::step", "[Step] '{name}' returned: {payload}");
        }

        let record = CallRecord::new(
            name,
            step_id,
            self.options.identity,
            payload,
            elapsed,
            diff_config,
        );
        if let Some(previous) = self.evidence.insert(record) {
            debug!(
                step = %previous.step_id,
                identity = %previous.identity,
                "replaced earlier record for step '{name}'",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn context_parts(always_retain: bool, identity: Identity) -> (RunOptions, Arc<DiffConfig>) {
        let options = RunOptions {
            identity,
            always_retain_responses: always_retain,
            ..Default::default()
        };
        (options, Arc::new(DiffConfig::default()))
    }

    #[test]
    fn default_retention_follows_always_retain() {
        for (always_retain, expected_len) in [(false, 0), (true, 1)] {
            let (options, default_diff) = context_parts(always_retain, Identity::First);
            let mut evidence = EvidenceStore::new();
            let mut cx = TestContext::new("CreateAccount", &options, &mut evidence, &default_diff);
            let value = cx.record("CreateAccount", "create", Retention::Default, || 42);
            assert_eq!(value, 42, "producer's value passes through");
            assert_eq!(evidence.len(), expected_len, "always_retain = {always_retain}");
        }
    }

    #[test]
    fn never_beats_always_retain() {
        let (options, default_diff) = context_parts(true, Identity::First);
        let mut evidence = EvidenceStore::new();
        let mut cx = TestContext::new("CreateAccount", &options, &mut evidence, &default_diff);
        cx.record("Audit", "audit", Retention::Never, || "ignored");
        assert!(evidence.is_empty());
    }

    #[test]
    fn explicit_retention_serializes_payload() {
        let (options, default_diff) = context_parts(false, Identity::Second);
        let mut evidence = EvidenceStore::new();
        let mut cx = TestContext::new("CreateAccount", &options, &mut evidence, &default_diff);
        let account: BTreeMap<_, _> = [("id", "A-1"), ("owner", "alice")].into_iter().collect();
        cx.record(
            "CreateAccount",
            "create",
            Retention::retain(DiffConfig::default()),
            || account.clone(),
        );

        let record = evidence.iter().next().expect("one record");
        assert_eq!(record.payload(), &json!({"id": "A-1", "owner": "alice"}));
        assert_eq!(record.identity(), Identity::Second);
        assert_eq!(record.step_id().as_str(), "create");
        assert_eq!(record.status(), ComparisonStatus::NotStarted);
    }

    #[test]
    fn failed_producers_are_not_retained() {
        let (options, default_diff) = context_parts(true, Identity::First);
        let mut evidence = EvidenceStore::new();
        let mut cx = TestContext::new("CreateAccount", &options, &mut evidence, &default_diff);
        let result: Result<u32, String> =
            cx.try_record("CreateAccount", "create", Retention::Default, || {
                Err("503 Service Unavailable".to_owned())
            });
        assert_eq!(result, Err("503 Service Unavailable".to_owned()));
        assert!(evidence.is_empty());
    }

    #[test]
    fn unserializable_payload_is_skipped() {
        let (options, default_diff) = context_parts(true, Identity::First);
        let mut evidence = EvidenceStore::new();
        let mut cx = TestContext::new("CreateAccount", &options, &mut evidence, &default_diff);
        // JSON object keys must be strings.
        let bad: BTreeMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
        cx.record("CreateAccount", "create", Retention::Default, || bad);
        assert!(evidence.is_empty());
    }

    #[test]
    fn insert_replaces_and_moves_to_end() {
        let config = Arc::new(DiffConfig::default());
        let record = |step: &str, identity, payload| {
            CallRecord::new(
                "CreateAccount",
                StepId::new(step),
                identity,
                payload,
                Duration::from_millis(5),
                config.clone(),
            )
        };

        let mut store = EvidenceStore::new();
        store.insert(record("create", Identity::First, json!(1)));
        store.insert(record("fetch", Identity::First, json!(2)));
        let replaced = store.insert(record("create", Identity::First, json!(3)));

        assert_eq!(replaced.map(|r| r.payload().clone()), Some(json!(1)));
        assert_eq!(store.len(), 2);
        let order: Vec<_> = store.iter().map(|r| r.step_id().as_str()).collect();
        assert_eq!(order, vec!["fetch", "create"]);
    }
}
