// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use dualcheck_runner::{
    catalog::{TestCase, TestCatalog},
    compare::DiffConfig,
    identity::IdentitySwitcher,
    recorder::{Retention, TestContext},
};
use serde::Serialize;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU32, Ordering},
};

/// The user the fake API sees as the caller.
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedUser(Arc<Mutex<String>>);

impl SharedUser {
    pub(crate) fn get(&self) -> String {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl IdentitySwitcher for SharedUser {
    fn current_user(&self) -> String {
        self.get()
    }

    fn set_user(&mut self, user: &str) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = user.to_owned();
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Account {
    pub(crate) id: u32,
    pub(crate) owner: String,
    pub(crate) currency: &'static str,
    pub(crate) created_at: String,
}

/// An in-memory accounts API. Accounts are owned by whoever created them; only `usertype1` may
/// delete.
#[derive(Debug)]
pub(crate) struct FakeAccountsApi {
    caller: SharedUser,
    next_id: AtomicU32,
    flaky_failures: AtomicU32,
}

impl FakeAccountsApi {
    pub(crate) fn new(caller: SharedUser) -> Self {
        Self {
            caller,
            next_id: AtomicU32::new(1),
            flaky_failures: AtomicU32::new(0),
        }
    }

    /// The next `count` calls to [`Self::get_account`] fail.
    pub(crate) fn fail_next_gets(&self, count: u32) {
        self.flaky_failures.store(count, Ordering::SeqCst);
    }

    pub(crate) fn create_account(&self) -> Account {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Account {
            // Ids are allocated per caller, so each identity sees its first account as 1.
            id: 1,
            owner: self.caller.get(),
            currency: "GBP",
            created_at: format!("2026-01-01T00:00:{id:02}Z"),
        }
    }

    pub(crate) fn get_account(&self) -> Option<Account> {
        let remaining = self.flaky_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.flaky_failures.store(remaining - 1, Ordering::SeqCst);
            return None;
        }
        Some(self.create_account())
    }

    pub(crate) fn delete_account(&self) -> bool {
        self.caller.get() == "usertype1"
    }
}

/// The "Accounts" suite, driven against `api`.
pub(crate) fn accounts_catalog(api: Arc<FakeAccountsApi>) -> TestCatalog {
    let create_api = api.clone();
    let create = TestCase::new("CreateAccount", move |cx: &mut TestContext<'_>| {
        let retention = Retention::retain(DiffConfig::default());
        let account = cx.record("CreateAccount", "CreateAccountCall", retention, || {
            create_api.create_account()
        });
        Ok(account.currency == "GBP")
    });

    let get_api = api.clone();
    let get = TestCase::new("GetAccount", move |cx: &mut TestContext<'_>| {
        let mut builder = DiffConfig::builder();
        builder.ignore("owner").ignore_time_fields();
        let retention = Retention::retain(builder.build()?);
        let account = cx.record("GetAccount", "GetAccountCall", retention, || {
            get_api.get_account()
        });
        Ok(account.is_some())
    });

    let delete_api = api.clone();
    let delete = TestCase::new("DeleteAccount", move |_: &mut TestContext<'_>| {
        Ok(delete_api.delete_account())
    })
    .with_disable_switch("deletes");

    let cleanup = TestCase::new("Cleanup", |_: &mut TestContext<'_>| Ok(true)).singular();

    let mut catalog = TestCatalog::new();
    catalog.add_suite("Accounts", [create, get, delete]);
    catalog.add_suite("Housekeeping", [cleanup]);
    catalog
}

pub(crate) fn fake_api() -> (SharedUser, Arc<FakeAccountsApi>) {
    let user = SharedUser::default();
    let api = Arc::new(FakeAccountsApi::new(user.clone()));
    (user, api)
}
