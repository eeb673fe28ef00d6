// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborators that talk to the system under test on the harness's behalf: impersonation and
//! reachability.

use crate::{errors::ProbeError, options::Identity};
use std::fmt;
use tracing::{debug, warn};

/// Switches the user that subsequent API calls are made as.
pub trait IdentitySwitcher: fmt::Debug {
    /// The user currently impersonated.
    fn current_user(&self) -> String;

    /// Impersonate `user` from now on.
    fn set_user(&mut self, user: &str);
}

/// The users impersonated for each identity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentityUsers {
    /// The user for [`Identity::First`].
    pub first: String,

    /// The user for [`Identity::Second`].
    pub second: String,
}

impl Default for IdentityUsers {
    fn default() -> Self {
        Self {
            first: "usertype1".to_owned(),
            second: "usertype2".to_owned(),
        }
    }
}

impl IdentityUsers {
    /// The user to impersonate for an attempt under `identity`, unless `run_as` overrides it.
    pub fn user_for<'a>(&'a self, identity: Identity, run_as: Option<&'a str>) -> &'a str {
        match run_as {
            Some(user) => user,
            None => match identity {
                Identity::First => &self.first,
                Identity::Second => &self.second,
            },
        }
    }
}

/// Impersonates a user for as long as it's alive, then restores the previous user.
#[derive(Debug)]
pub struct IdentityGuard<'a> {
    switcher: &'a mut dyn IdentitySwitcher,
    previous: Option<String>,
}

impl<'a> IdentityGuard<'a> {
    /// Switches to `user`. An empty `user` leaves the current user in place and restores nothing.
    pub fn switch(switcher: &'a mut dyn IdentitySwitcher, user: &str) -> Self {
        if user.is_empty() {
            warn!("no user configured for this identity, keeping `{}`", switcher.current_user());
            return Self {
                switcher,
                previous: None,
            };
        }

        let previous = switcher.current_user();
        debug!(from = %previous, to = %user, "switching identity");
        switcher.set_user(user);
        Self {
            switcher,
            previous: Some(previous),
        }
    }
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            debug!(to = %previous, "restoring identity");
            self.switcher.set_user(&previous);
        }
    }
}

/// Checks whether the API under test is reachable before dual-identity tests are attempted.
pub trait ConnectivityProbe {
    /// Returns `Ok(())` if the endpoint accepted a connection.
    fn probe(&self) -> Result<(), ProbeError>;
}

/// A probe that always succeeds, used when no endpoint is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysReachable;

impl ConnectivityProbe for AlwaysReachable {
    fn probe(&self) -> Result<(), ProbeError> {
        Ok(())
    }
}
