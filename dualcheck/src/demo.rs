// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A self-contained catalog run by the `dualcheck` binary.
//!
//! The tests drive an in-process subjects API rather than a remote service, so that every feature
//! of the harness can be tried without any setup. Subjects are owned by the user that created them,
//! and only the privileged user sees internal notes, so running in dual mode with `--compare`
//! shows real differences between the two identities.

use chrono::Utc;
use dualcheck_runner::{
    catalog::{TestCase, TestCatalog},
    checks::{CheckKind, failed_if, validate_assumptions},
    compare::DiffConfig,
    identity::IdentitySwitcher,
    recorder::{Retention, TestContext},
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;

/// The user whose API calls the demo API attributes to the caller.
#[derive(Clone, Debug, Default)]
pub struct DemoSession {
    user: Arc<Mutex<String>>,
}

impl DemoSession {
    fn user(&self) -> String {
        self.user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl IdentitySwitcher for DemoSession {
    fn current_user(&self) -> String {
        self.user()
    }

    fn set_user(&mut self, user: &str) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = user.to_owned();
    }
}

/// A subject as returned by the demo API.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    id: u64,
    name: String,
    code: String,
    description: String,
    owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    created_at: String,
}

#[derive(Debug, Error)]
#[error("subject {0} not found")]
struct SubjectNotFound(u64);

/// An in-memory subjects API.
#[derive(Debug)]
pub struct SubjectsApi {
    session: DemoSession,
    privileged_user: String,
    state: Mutex<ApiState>,
}

#[derive(Debug, Default)]
struct ApiState {
    next_id: u64,
    subjects: BTreeMap<u64, Subject>,
}

impl SubjectsApi {
    /// Creates an API that sees callers through `session`. `privileged_user` can read notes.
    pub fn new(session: DemoSession, privileged_user: impl Into<String>) -> Self {
        Self {
            session,
            privileged_user: privileged_user.into(),
            state: Mutex::new(ApiState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create(&self, name: &str, code: &str, description: &str) -> Subject {
        let owner = self.session.user();
        let mut state = self.state();
        state.next_id += 1;
        let subject = Subject {
            id: state.next_id,
            name: name.to_owned(),
            code: code.to_owned(),
            // The API stamps the owner onto descriptions.
            description: format!("{description} ({owner})"),
            notes: Some(format!("created by {owner}")),
            owner,
            created_at: Utc::now().to_rfc3339(),
        };
        state.subjects.insert(subject.id, subject.clone());
        self.redact(subject)
    }

    fn get(&self, id: u64) -> Option<Subject> {
        let caller = self.session.user();
        let subject = self
            .state()
            .subjects
            .get(&id)
            .filter(|subject| subject.owner == caller)
            .cloned()?;
        Some(self.redact(subject))
    }

    fn list(&self) -> Vec<Subject> {
        let caller = self.session.user();
        let subjects: Vec<_> = self
            .state()
            .subjects
            .values()
            .filter(|subject| subject.owner == caller)
            .cloned()
            .collect();
        subjects
            .into_iter()
            .map(|subject| self.redact(subject))
            .collect()
    }

    fn delete(&self, id: u64) -> bool {
        let caller = self.session.user();
        let mut state = self.state();
        match state.subjects.get(&id) {
            Some(subject) if subject.owner == caller => {
                state.subjects.remove(&id);
                true
            }
            _ => false,
        }
    }

    fn redact(&self, mut subject: Subject) -> Subject {
        if self.session.user() != self.privileged_user {
            subject.notes = None;
        }
        subject
    }
}

/// Returns the demo catalog along with the session the binary impersonates users through.
pub fn demo() -> (DemoSession, TestCatalog) {
    let session = DemoSession::default();
    let api = Arc::new(SubjectsApi::new(session.clone(), "usertype1"));
    (session, catalog(api))
}

/// The "Subjects" and "Housekeeping" suites, driven against `api`.
pub fn catalog(api: Arc<SubjectsApi>) -> TestCatalog {
    let create_api = api.clone();
    let create = TestCase::new("CreateSubject", move |cx: &mut TestContext<'_>| {
        let mut diff = DiffConfig::builder();
        diff.ignore("id").ignore_time_fields();
        let retention = Retention::retain(diff.build()?);

        let subject = cx.record("CreateSubject", "POST /subjects", retention, || {
            create_api.create("Widget", "WDG-1", "A test widget")
        });

        // Every check is evaluated so each verdict is logged.
        let failed = failed_if(|| subject.name != "Widget", "name is echoed back", CheckKind::Name)
            | failed_if(|| subject.code != "WDG-1", "code is echoed back", CheckKind::Code)
            | failed_if(
                || subject.description != "A test widget",
                "description is echoed back",
                CheckKind::Description,
            );
        Ok(!failed)
    });

    let get_api = api.clone();
    let missing_api = api.clone();
    let get = TestCase::new("GetSubject", move |cx: &mut TestContext<'_>| {
        let created = get_api.create("Gadget", "GDG-1", "A test gadget");
        let fetched = cx.try_record(
            "GetSubject",
            "GET /subjects/{id}",
            Retention::Default,
            || get_api.get(created.id).ok_or(SubjectNotFound(created.id)),
        )?;

        Ok(validate_assumptions(
            cx.options(),
            || Ok(fetched.id == created.id && fetched.owner == created.owner),
            || Ok(fetched.notes.is_some()),
            || Ok(fetched.notes.is_none()),
        ))
    })
    .with_scenario(TestCase::new(
        "GetMissingSubject",
        move |_: &mut TestContext<'_>| Ok(missing_api.get(u64::MAX).is_none()),
    ));

    let delete_api = api.clone();
    let delete = TestCase::new("DeleteSubject", move |cx: &mut TestContext<'_>| {
        let created = delete_api.create("Gizmo", "GZM-1", "A test gizmo");
        let deleted = cx.record(
            "DeleteSubject",
            "DELETE /subjects/{id}",
            Retention::Never,
            || delete_api.delete(created.id),
        );
        if !deleted {
            return Ok(false);
        }
        if cx.options().validate_deletes {
            let still_there = failed_if(
                || delete_api.get(created.id).is_some(),
                "deleted subject is gone",
                CheckKind::BasicSubject,
            );
            return Ok(!still_there);
        }
        Ok(true)
    })
    .with_disable_switch("deletes");

    let list_api = api;
    let list = TestCase::new("ListSubjects", move |cx: &mut TestContext<'_>| {
        let created = list_api.create("Doohickey", "DHK-1", "A test doohickey");
        let subjects = cx.record("ListSubjects", "GET /subjects", Retention::Default, || {
            list_api.list()
        });
        Ok(subjects.iter().any(|subject| subject.id == created.id))
    })
    .singular();

    let mut catalog = TestCatalog::new();
    catalog.add_suite("Subjects", [create, get, delete]);
    catalog.add_suite("Housekeeping", [list]);
    catalog
}
