// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structural diffing of JSON payloads.

use crate::errors::DiffConfigBuildError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use std::fmt;

/// The default cap on reported differences per comparison.
pub const DEFAULT_MAX_DIFFERENCES: usize = 100;

/// Field patterns ignored by the `ignore-time-fields` preset.
pub const TIME_FIELD_PATTERNS: &[&str] = &[
    "*Date",
    "*DateTime",
    "*Time",
    "*Timestamp",
    "createdAt",
    "updatedAt",
    "modifiedAt",
];

/// How two payloads are compared.
#[derive(Clone, Debug)]
pub struct DiffConfig {
    ignore_patterns: Vec<String>,
    ignore: GlobSet,
    fields: Option<Vec<String>>,
    max_differences: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            ignore: GlobSet::empty(),
            fields: None,
            max_differences: DEFAULT_MAX_DIFFERENCES,
        }
    }
}

impl DiffConfig {
    /// Starts building a config.
    pub fn builder() -> DiffConfigBuilder {
        DiffConfigBuilder::default()
    }

    /// The ignore patterns as written.
    pub fn ignore_patterns(&self) -> &[String] {
        &self.ignore_patterns
    }

    /// The declared top-level fields, if comparison is restricted to them.
    pub fn fields(&self) -> Option<&[String]> {
        self.fields.as_deref()
    }

    /// The cap on reported differences.
    pub fn max_differences(&self) -> usize {
        self.max_differences
    }

    /// Whether a value at `path` whose own key is `leaf` should be skipped.
    fn is_ignored(&self, path: &str, leaf: Option<&str>) -> bool {
        if self.ignore.is_empty() || path.is_empty() {
            return false;
        }
        self.ignore.is_match(path) || leaf.is_some_and(|leaf| self.ignore.is_match(leaf))
    }
}

/// Builds a [`DiffConfig`].
#[derive(Clone, Debug)]
pub struct DiffConfigBuilder {
    ignore_patterns: Vec<String>,
    fields: Option<Vec<String>>,
    max_differences: usize,
}

impl Default for DiffConfigBuilder {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            fields: None,
            max_differences: DEFAULT_MAX_DIFFERENCES,
        }
    }
}

impl DiffConfigBuilder {
    /// Skip fields matching this glob. Patterns match either the full dotted path
    /// (`account.owner.name`) or the field's own key (`name`).
    pub fn ignore(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    /// Skip every field matching any of these globs.
    pub fn ignore_all(
        &mut self,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.ignore_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Skip fields that typically hold timestamps.
    pub fn ignore_time_fields(&mut self) -> &mut Self {
        self.ignore_all(TIME_FIELD_PATTERNS.iter().copied())
    }

    /// Only compare these top-level fields.
    pub fn fields(&mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Stop after this many differences.
    pub fn max_differences(&mut self, max: usize) -> &mut Self {
        self.max_differences = max;
        self
    }

    /// Compiles the ignore patterns.
    pub fn build(&self) -> Result<DiffConfig, DiffConfigBuildError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore_patterns {
            let glob =
                Glob::new(pattern).map_err(|err| DiffConfigBuildError::new(pattern, err))?;
            builder.add(glob);
        }
        let ignore = builder
            .build()
            .map_err(|err| DiffConfigBuildError::new(self.ignore_patterns.join(", "), err))?;

        Ok(DiffConfig {
            ignore_patterns: self.ignore_patterns.clone(),
            ignore,
            fields: self.fields.clone(),
            max_differences: self.max_differences,
        })
    }
}

/// A single difference between two payloads.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Difference {
    /// Dotted path to the differing value, with `[i]` for array elements. Empty for the root.
    pub path: String,

    /// The first identity's value, or `None` if it was missing.
    pub first: Option<Value>,

    /// The second identity's value, or `None` if it was missing.
    pub second: Option<Value>,
}

impl Difference {
    /// The path, or `(root)` for a difference at the top level.
    pub fn display_path(&self) -> &str {
        if self.path.is_empty() {
            "(root)"
        } else {
            &self.path
        }
    }

    /// Displays the first value.
    pub fn display_first(&self) -> DisplayValue<'_> {
        DisplayValue(self.first.as_ref())
    }

    /// Displays the second value.
    pub fn display_second(&self) -> DisplayValue<'_> {
        DisplayValue(self.second.as_ref())
    }
}

/// Displays a value inside a difference line: strings unquoted, everything else as compact JSON.
#[derive(Clone, Copy, Debug)]
pub struct DisplayValue<'a>(Option<&'a Value>);

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("(missing)"),
            Some(Value::String(s)) => f.write_str(s),
            Some(value) => write!(f, "{value}"),
        }
    }
}

/// The output of [`diff_values`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiffResult {
    /// Differences found, in traversal order.
    pub differences: Vec<Difference>,

    /// True if traversal stopped at the configured cap.
    pub truncated: bool,
}

/// Compares two payloads structurally.
///
/// Objects are compared key by key. Arrays are compared without regard to order: equal elements
/// pair off first, and the remaining elements are compared by position among themselves.
pub fn diff_values(first: &Value, second: &Value, config: &DiffConfig) -> DiffResult {
    let mut walker = DiffWalker {
        config,
        result: DiffResult::default(),
    };
    walker.walk_root(first, second);
    walker.result
}

struct DiffWalker<'a> {
    config: &'a DiffConfig,
    result: DiffResult,
}

impl DiffWalker<'_> {
    fn walk_root(&mut self, first: &Value, second: &Value) {
        let config = self.config;
        match (config.fields(), first, second) {
            (Some(fields), Value::Object(a), Value::Object(b)) => {
                for field in fields {
                    self.walk(field, Some(field.as_str()), a.get(field), b.get(field));
                }
            }
            _ => self.walk("", None, Some(first), Some(second)),
        }
    }

    fn walk(
        &mut self,
        path: &str,
        leaf: Option<&str>,
        first: Option<&Value>,
        second: Option<&Value>,
    ) {
        if self.result.truncated || self.config.is_ignored(path, leaf) {
            return;
        }

        match (first, second) {
            (Some(a), Some(b)) if a == b => {}
            (Some(Value::Object(a)), Some(Value::Object(b))) => {
                let keys = a.keys().chain(b.keys().filter(|key| !a.contains_key(*key)));
                for key in keys {
                    let child = join_key(path, key);
                    self.walk(&child, Some(key.as_str()), a.get(key), b.get(key));
                }
            }
            (Some(Value::Array(a)), Some(Value::Array(b))) => self.walk_arrays(path, a, b),
            _ => self.push(path, first, second),
        }
    }

    fn walk_arrays(&mut self, path: &str, a: &[Value], b: &[Value]) {
        let mut unmatched_b: Vec<usize> = (0..b.len()).collect();
        let mut unmatched_a = Vec::new();
        for (i, x) in a.iter().enumerate() {
            match unmatched_b.iter().position(|&j| b[j] == *x) {
                Some(pos) => {
                    unmatched_b.remove(pos);
                }
                None => unmatched_a.push(i),
            }
        }

        let paired = unmatched_a.len().min(unmatched_b.len());
        for (&i, &j) in unmatched_a.iter().zip(&unmatched_b) {
            self.walk(&format!("{path}[{i}]"), None, Some(&a[i]), Some(&b[j]));
        }
        for &i in &unmatched_a[paired..] {
            self.walk(&format!("{path}[{i}]"), None, Some(&a[i]), None);
        }
        for &j in &unmatched_b[paired..] {
            self.walk(&format!("{path}[{j}]"), None, None, Some(&b[j]));
        }
    }

    fn push(&mut self, path: &str, first: Option<&Value>, second: Option<&Value>) {
        if self.result.differences.len() >= self.config.max_differences {
            self.result.truncated = true;
            return;
        }
        self.result.differences.push(Difference {
            path: path.to_owned(),
            first: first.cloned(),
            second: second.cloned(),
        });
    }
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_strategy::proptest;

    fn paths(result: &DiffResult) -> Vec<&str> {
        result
            .differences
            .iter()
            .map(|d| d.display_path())
            .collect()
    }

    #[test]
    fn identical_payloads_have_no_differences() {
        let payload = json!({"id": 7, "tags": ["a", "b"], "owner": {"name": "alice"}});
        let result = diff_values(&payload, &payload, &DiffConfig::default());
        assert_eq!(result, DiffResult::default());
    }

    #[test]
    fn nested_paths() {
        let first = json!({"owner": {"name": "alice", "id": 1}, "limit": 100});
        let second = json!({"owner": {"name": "bob", "id": 1}, "region": "eu"});
        let result = diff_values(&first, &second, &DiffConfig::default());
        assert_eq!(paths(&result), vec!["owner.name", "limit", "region"]);
        assert_eq!(result.differences[1].display_second().to_string(), "(missing)");
        assert_eq!(result.differences[0].display_first().to_string(), "alice");
        assert!(!result.truncated);
    }

    #[test]
    fn arrays_ignore_order() {
        let first = json!({"roles": ["reader", "writer", "admin"]});
        let second = json!({"roles": ["admin", "reader", "writer"]});
        let result = diff_values(&first, &second, &DiffConfig::default());
        assert!(result.differences.is_empty(), "{result:?}");
    }

    #[test]
    fn unmatched_array_elements_pair_by_position() {
        let first = json!([{"id": 1, "v": "x"}, {"id": 2, "v": "y"}, 9]);
        let second = json!([{"id": 2, "v": "y"}, {"id": 1, "v": "z"}]);
        let result = diff_values(&first, &second, &DiffConfig::default());
        assert_eq!(paths(&result), vec!["[0].v", "[2]"]);
        assert_eq!(result.differences[1].second, None);
    }

    #[test]
    fn root_scalar_difference() {
        let result = diff_values(&json!(1), &json!("1"), &DiffConfig::default());
        assert_eq!(paths(&result), vec!["(root)"]);
        assert_eq!(result.differences[0].display_first().to_string(), "1");
    }

    #[test]
    fn ignore_patterns_match_path_or_key() {
        let config = DiffConfig::builder()
            .ignore("*Date")
            .ignore("owner.id")
            .build()
            .expect("valid patterns");
        let first = json!({
            "createdDate": "2024-01-01",
            "owner": {"id": 1, "name": "a", "lastLoginDate": 1},
        });
        let second = json!({
            "createdDate": "2025-01-01",
            "owner": {"id": 2, "name": "b", "lastLoginDate": 2},
        });
        let result = diff_values(&first, &second, &config);
        assert_eq!(paths(&result), vec!["owner.name"]);
    }

    #[test]
    fn time_field_preset() {
        let config = DiffConfig::builder()
            .ignore_time_fields()
            .build()
            .expect("valid patterns");
        let first = json!({"updatedAt": 1, "expiryTime": 2, "name": "x"});
        let second = json!({"updatedAt": 3, "expiryTime": 4, "name": "x"});
        assert!(diff_values(&first, &second, &config).differences.is_empty());
    }

    #[test]
    fn declared_fields_restrict_comparison() {
        let config = DiffConfig::builder()
            .fields(["name", "limit"])
            .build()
            .expect("no patterns to compile");
        let first = json!({"name": "a", "limit": 1, "etag": "x"});
        let second = json!({"name": "b", "etag": "y"});
        let result = diff_values(&first, &second, &config);
        assert_eq!(paths(&result), vec!["name", "limit"]);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = DiffConfig::builder()
            .ignore("owner[")
            .build()
            .expect_err("unclosed character class");
        assert_eq!(err.to_string(), "invalid ignore-field pattern `owner[`");
    }

    #[proptest(cases = 64)]
    fn differences_are_capped(
        #[strategy(0usize..40)] size: usize,
        #[strategy(1usize..10)] max: usize,
    ) {
        let first = Value::Object((0..size).map(|i| (format!("k{i}"), json!(i))).collect());
        let second = Value::Object((0..size).map(|i| (format!("k{i}"), json!(i + 1))).collect());
        let config = DiffConfig::builder()
            .max_differences(max)
            .build()
            .expect("no patterns to compile");
        let result = diff_values(&first, &second, &config);
        assert_eq!(result.differences.len(), size.min(max));
        assert_eq!(result.truncated, size > max);
    }
}
