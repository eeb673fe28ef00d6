// Copyright (c) The dualcheck Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repository configuration for dualcheck.
//!
//! Configuration is read from `.config/dualcheck.toml` (or a file passed in explicitly), layered on
//! top of the [default config](DualcheckConfig::DEFAULT_CONFIG). Most settings live in
//! [profiles](DualcheckProfile).

use crate::{
    compare::DiffConfig,
    errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound},
    identity::IdentityUsers,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};

/// Overall configuration for dualcheck.
#[derive(Clone, Debug)]
pub struct DualcheckConfig {
    root: Utf8PathBuf,
    default_profile: DefaultProfileImpl,
    default_diff: DiffConfig,
    other_profiles: HashMap<String, CompiledProfile>,
}

impl DualcheckConfig {
    /// The default location of the config within the root directory.
    pub const CONFIG_PATH: &'static str = ".config/dualcheck.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from `config_file`, or if not specified from `.config/dualcheck.toml` under
    /// `root`. Relative paths in the config are resolved against `root`.
    ///
    /// If no config file is specified and `.config/dualcheck.toml` doesn't exist, the default config
    /// is used.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let deserialized = Self::build_and_deserialize_config(
            Self::make_default_config().add_source(source),
        )
        .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        Self::compile(root, deserialized).map_err(|kind| ConfigParseError::new(&config_file, kind))
    }

    /// Returns the default config, ignoring any config files.
    pub fn default_config(root: impl Into<Utf8PathBuf>) -> Result<Self, ConfigParseError> {
        let deserialized = Self::build_and_deserialize_config(Self::make_default_config())
            .map_err(|kind| ConfigParseError::new("<default config>", kind))?;
        Self::compile(root.into(), deserialized)
            .map_err(|kind| ConfigParseError::new("<default config>", kind))
    }

    /// Returns the profile with the given name, or an error if it isn't known.
    pub fn profile(
        &self,
        name: impl AsRef<str>,
    ) -> Result<DualcheckProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let (custom_profile, diff_config) = match name {
            Self::DEFAULT_PROFILE => (None, &self.default_diff),
            other => {
                let compiled = self
                    .other_profiles
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(name, self.all_profiles()))?;
                (Some(&compiled.custom), &compiled.diff)
            }
        };
        Ok(DualcheckProfile {
            name: name.to_owned(),
            root: &self.root,
            default_profile: &self.default_profile,
            custom_profile,
            diff_config,
        })
    }

    /// Every known profile name, unordered.
    pub fn all_profiles(&self) -> impl Iterator<Item = &str> + '_ {
        self.other_profiles
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(Self::DEFAULT_PROFILE))
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<DualcheckConfigDeserialize, ConfigParseErrorKind> {
        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(ConfigParseErrorKind::Build)
    }

    fn compile(
        root: Utf8PathBuf,
        deserialized: DualcheckConfigDeserialize,
    ) -> Result<Self, ConfigParseErrorKind> {
        let ProfilesDeserialize { default, other } = deserialized.profiles;

        let default_diff = compile_diff(Self::DEFAULT_PROFILE, &default, None)?;
        check_probe_address(Self::DEFAULT_PROFILE, default.connectivity_probe.as_deref())?;

        let mut other_profiles = HashMap::with_capacity(other.len());
        for (name, custom) in other {
            let diff = compile_diff(&name, &default, Some(&custom))?;
            check_probe_address(&name, custom.connectivity_probe.as_deref())?;
            other_profiles.insert(name, CompiledProfile { custom, diff });
        }

        Ok(Self {
            root,
            default_profile: default,
            default_diff,
            other_profiles,
        })
    }
}

fn compile_diff(
    profile: &str,
    default: &DefaultProfileImpl,
    custom: Option<&CustomProfileImpl>,
) -> Result<DiffConfig, ConfigParseErrorKind> {
    let ignore_fields = custom
        .and_then(|p| p.ignore_fields.as_deref())
        .unwrap_or(&default.ignore_fields);
    let ignore_time_fields = custom
        .and_then(|p| p.ignore_time_fields)
        .unwrap_or(default.ignore_time_fields);
    let max_differences = custom
        .and_then(|p| p.max_differences)
        .unwrap_or(default.max_differences);

    let mut builder = DiffConfig::builder();
    builder.ignore_all(ignore_fields).max_differences(max_differences);
    if ignore_time_fields {
        builder.ignore_time_fields();
    }
    builder
        .build()
        .map_err(|err| ConfigParseErrorKind::IgnoreFields {
            profile: profile.to_owned(),
            err,
        })
}

fn check_probe_address(profile: &str, address: Option<&str>) -> Result<(), ConfigParseErrorKind> {
    let Some(address) = address else {
        return Ok(());
    };
    let valid = address
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if valid {
        Ok(())
    } else {
        Err(ConfigParseErrorKind::InvalidProbeAddress {
            profile: profile.to_owned(),
            address: address.to_owned(),
        })
    }
}

/// A dualcheck profile, obtained through [`DualcheckConfig::profile`].
///
/// Values not set in the profile fall back to the default profile.
#[derive(Clone, Debug)]
pub struct DualcheckProfile<'cfg> {
    name: String,
    root: &'cfg Utf8Path,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
    diff_config: &'cfg DiffConfig,
}

impl<'cfg> DualcheckProfile<'cfg> {
    /// The name of this profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many times a failing test is retried.
    pub fn retries(&self) -> u32 {
        self.custom_profile
            .and_then(|p| p.retries)
            .unwrap_or(self.default_profile.retries)
    }

    /// Whether retained responses are compared.
    pub fn compare(&self) -> bool {
        self.custom_profile
            .and_then(|p| p.compare)
            .unwrap_or(self.default_profile.compare)
    }

    /// Whether every recorded response is retained.
    pub fn always_retain_responses(&self) -> bool {
        self.custom_profile
            .and_then(|p| p.always_retain_responses)
            .unwrap_or(self.default_profile.always_retain_responses)
    }

    /// The directory compared payloads are written to.
    pub fn diff_output_dir(&self) -> Utf8PathBuf {
        let dir = self
            .custom_profile
            .and_then(|p| p.diff_output_dir.as_deref())
            .unwrap_or(&self.default_profile.diff_output_dir);
        self.root.join(dir)
    }

    /// The directory the CSV summary is written to.
    pub fn summary_dir(&self) -> Utf8PathBuf {
        let dir = self
            .custom_profile
            .and_then(|p| p.summary_dir.as_deref())
            .unwrap_or(&self.default_profile.summary_dir);
        self.root.join(dir)
    }

    /// The diff configuration for responses retained without one of their own.
    pub fn diff_config(&self) -> &'cfg DiffConfig {
        self.diff_config
    }

    /// The `host:port` probed before the second identity is exercised, if any.
    pub fn connectivity_probe(&self) -> Option<&'cfg str> {
        self.custom_profile
            .and_then(|p| p.connectivity_probe.as_deref())
            .or(self.default_profile.connectivity_probe.as_deref())
    }

    /// How long the connectivity probe waits.
    pub fn probe_timeout(&self) -> Duration {
        self.custom_profile
            .and_then(|p| p.probe_timeout)
            .unwrap_or(self.default_profile.probe_timeout)
    }

    /// The users impersonated for each identity.
    pub fn identity_users(&self) -> IdentityUsers {
        let first = self
            .custom_profile
            .and_then(|p| p.first_user.as_deref())
            .unwrap_or(&self.default_profile.first_user);
        let second = self
            .custom_profile
            .and_then(|p| p.second_user.as_deref())
            .unwrap_or(&self.default_profile.second_user);
        IdentityUsers {
            first: first.to_owned(),
            second: second.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
struct DualcheckConfigDeserialize {
    #[serde(rename = "profile")]
    profiles: ProfilesDeserialize,
}

#[derive(Clone, Debug, Deserialize)]
struct ProfilesDeserialize {
    default: DefaultProfileImpl,
    #[serde(flatten)]
    other: HashMap<String, CustomProfileImpl>,
}

#[derive(Clone, Debug)]
struct CompiledProfile {
    custom: CustomProfileImpl,
    diff: DiffConfig,
}

/// The default profile: every key is present, since the default config sets them all.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultProfileImpl {
    retries: u32,
    compare: bool,
    always_retain_responses: bool,
    diff_output_dir: Utf8PathBuf,
    summary_dir: Utf8PathBuf,
    ignore_fields: Vec<String>,
    ignore_time_fields: bool,
    max_differences: usize,
    #[serde(default)]
    connectivity_probe: Option<String>,
    #[serde(with = "humantime_serde")]
    probe_timeout: Duration,
    first_user: String,
    second_user: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    retries: Option<u32>,
    #[serde(default)]
    compare: Option<bool>,
    #[serde(default)]
    always_retain_responses: Option<bool>,
    #[serde(default)]
    diff_output_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    summary_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    ignore_fields: Option<Vec<String>>,
    #[serde(default)]
    ignore_time_fields: Option<bool>,
    #[serde(default)]
    max_differences: Option<usize>,
    #[serde(default)]
    connectivity_probe: Option<String>,
    #[serde(default, with = "humantime_serde::option")]
    probe_timeout: Option<Duration>,
    #[serde(default)]
    first_user: Option<String>,
    #[serde(default)]
    second_user: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn temp_root(config_contents: &str) -> Utf8TempDir {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let config_path = dir.path().join(DualcheckConfig::CONFIG_PATH);
        std::fs::create_dir_all(config_path.parent().expect("config path has a parent"))
            .expect("created .config");
        std::fs::write(&config_path, config_contents).expect("wrote config");
        dir
    }

    #[test]
    fn default_profile_values() {
        let config = DualcheckConfig::default_config("/repo").expect("default config is valid");
        let profile = config.profile("default").expect("default profile exists");

        assert_eq!(profile.retries(), 0);
        assert!(!profile.compare());
        assert!(!profile.always_retain_responses());
        assert_eq!(profile.diff_output_dir(), "/repo/ObjectDiffs");
        assert_eq!(profile.summary_dir(), "/repo/.");
        assert_eq!(profile.connectivity_probe(), None);
        assert_eq!(profile.probe_timeout(), Duration::from_secs(5));
        assert_eq!(profile.identity_users(), IdentityUsers::default());
        assert_eq!(profile.diff_config().max_differences(), 100);
        assert!(profile.diff_config().ignore_patterns().is_empty());

        let ci = config.profile("ci").expect("ci profile exists");
        assert_eq!(ci.retries(), 2);
        assert!(ci.compare());
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let config = DualcheckConfig::from_sources(dir.path(), None).expect("defaults are valid");
        let profile = config.profile("default").expect("default profile exists");
        assert_eq!(profile.retries(), 0);
    }

    #[test]
    fn repository_config_overrides_defaults() {
        let dir = temp_root(indoc! {r#"
            [profile.default]
            retries = 1
            first-user = "auditor"

            [profile.nightly]
            ignore-fields = ["etag", "items[*].id"]
            ignore-time-fields = true
            max-differences = 10
            connectivity-probe = "api.internal:8443"
            probe-timeout = "250ms"
        "#});
        let config = DualcheckConfig::from_sources(dir.path(), None).expect("config is valid");

        let default = config.profile("default").expect("default profile exists");
        assert_eq!(default.retries(), 1);
        assert_eq!(default.identity_users().first, "auditor");

        let nightly = config.profile("nightly").expect("nightly profile exists");
        assert_eq!(nightly.retries(), 1, "inherited from the default profile");
        assert_eq!(nightly.identity_users().first, "auditor");
        assert_eq!(nightly.identity_users().second, "usertype2");
        assert_eq!(nightly.connectivity_probe(), Some("api.internal:8443"));
        assert_eq!(nightly.probe_timeout(), Duration::from_millis(250));
        assert_eq!(nightly.diff_config().max_differences(), 10);
        assert_eq!(nightly.diff_config().ignore_patterns()[..2], ["etag", "items[*].id"]);
        assert!(nightly.diff_config().ignore_patterns().len() > 2);
    }

    #[test]
    fn unknown_profile() {
        let dir = temp_root(indoc! {r#"
            [profile.nightly]
            retries = 3
        "#});
        let config = DualcheckConfig::from_sources(dir.path(), None).expect("config is valid");
        let err = config.profile("weekly").expect_err("weekly isn't defined");
        assert_eq!(err.profile(), "weekly");
        assert_eq!(
            err.to_string(),
            "profile `weekly` not found (known profiles: ci, default, nightly)"
        );
    }

    #[test_case(
        indoc! {r#"
            [profile.default]
            ignore-fields = ["items[.id"]
        "#},
        "in profile `default`";
        "bad glob in default profile"
    )]
    #[test_case(
        indoc! {r#"
            [profile.staging]
            connectivity-probe = "localhost"
        "#},
        "in profile `staging`: connectivity-probe `localhost` is not of the form host:port";
        "probe address without port"
    )]
    fn invalid_config(contents: &str, expected: &str) {
        let dir = temp_root(contents);
        let err = DualcheckConfig::from_sources(dir.path(), None).expect_err("config is invalid");
        assert_eq!(err.kind().to_string(), expected);
    }

    #[test]
    fn type_errors_are_reported() {
        let dir = temp_root(indoc! {r#"
            [profile.default]
            retries = "three"
        "#});
        let err = DualcheckConfig::from_sources(dir.path(), None).expect_err("config is invalid");
        assert!(
            matches!(err.kind(), ConfigParseErrorKind::Build(_)),
            "unexpected error: {err:?}"
        );
        assert!(err.config_file().ends_with(".config/dualcheck.toml"));
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let missing = dir.path().join("missing.toml");
        let err =
            DualcheckConfig::from_sources(dir.path(), Some(&missing)).expect_err("file is missing");
        assert_eq!(err.config_file(), &missing);
    }
}
