// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::DiffExportError, options::Identity, recorder::CallRecord};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;

/// The default directory compared payloads are written to.
pub const DEFAULT_DIFF_OUTPUT_DIR: &str = "ObjectDiffs";

/// Writes compared payload pairs to disk, one file per identity.
#[derive(Clone, Debug)]
pub struct DiffExporter {
    dir: Utf8PathBuf,
}

impl DiffExporter {
    /// Creates an exporter writing into `dir`.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The output directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Writes both payloads as pretty-printed JSON and returns the two paths, first identity first.
    pub fn export(
        &self,
        first: &CallRecord,
        second: &CallRecord,
    ) -> Result<(Utf8PathBuf, Utf8PathBuf), DiffExportError> {
        std::fs::create_dir_all(&self.dir).map_err(|error| DiffExportError::CreateDir {
            dir: self.dir.clone(),
            error,
        })?;

        let first_path = self.write_record(first)?;
        let second_path = self.write_record(second)?;
        Ok((first_path, second_path))
    }

    /// The path a record's payload is written to.
    pub fn path_for(&self, record: &CallRecord) -> Utf8PathBuf {
        self.dir.join(file_name(
            record.test_name(),
            record.step_id().as_str(),
            record.identity(),
        ))
    }

    fn write_record(&self, record: &CallRecord) -> Result<Utf8PathBuf, DiffExportError> {
        let path = self.path_for(record);
        let contents = match serde_json::to_vec_pretty(record.payload()) {
            Ok(contents) => contents,
            Err(error) => return Err(DiffExportError::Serialize { file: path, error }),
        };

        let res = AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
            .write(|file| file.write_all(&contents));
        match res {
            Ok(()) => Ok(path),
            Err(atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error)) => {
                Err(DiffExportError::Write { file: path, error })
            }
        }
    }
}

fn file_name(test_name: &str, step_id: &str, identity: Identity) -> String {
    let stem = sanitize_file_name(&format!("{test_name}-{step_id}"));
    format!("{stem}-{}.log", identity.label())
}

/// Removes characters that aren't valid in file names on common platforms.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control())
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compare::DiffConfig, recorder::StepId};
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::{sync::Arc, time::Duration};
    use test_case::test_case;

    #[test_case("CreateAccount", "CreateAccount"; "plain")]
    #[test_case("Get <Account>: \"primary\"", "Get Account primary"; "reserved characters")]
    #[test_case("a/b\\c|d?e*f", "abcdef"; "separators and wildcards")]
    #[test_case("tab\there\u{7}", "tabhere"; "control characters")]
    fn sanitizes(input: &str, expected: &str) {
        assert_eq!(sanitize_file_name(input), expected);
    }

    #[test]
    fn writes_both_payloads() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let out_dir = dir.path().join(DEFAULT_DIFF_OUTPUT_DIR);
        let exporter = DiffExporter::new(out_dir.clone());

        let config = Arc::new(DiffConfig::default());
        let record = |identity, payload| {
            CallRecord::new(
                "Get Account",
                StepId::new("GET /accounts/{id}"),
                identity,
                payload,
                Duration::from_millis(3),
                config.clone(),
            )
        };
        let first = record(Identity::First, json!({"id": 1}));
        let second = record(Identity::Second, json!({"id": 2}));

        let (first_path, second_path) = exporter.export(&first, &second).expect("export succeeds");
        assert_eq!(first_path, out_dir.join("Get Account-GET accounts{id}-First.log"));
        assert_eq!(second_path, out_dir.join("Get Account-GET accounts{id}-Second.log"));

        let contents = std::fs::read_to_string(&second_path).expect("read second payload");
        assert_eq!(contents, "{\n  \"id\": 2\n}");
    }
}
