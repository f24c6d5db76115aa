//! Configuration loading via `ortho-config`.

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::skip_drain::{SkipDrain, SkipDrainError};

/// Drain settings derived from environment variables, configuration files,
/// and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "QUIESCE",
    discovery(
        app_name = "quiesce",
        env_var = "QUIESCE_CONFIG_PATH",
        config_file_name = "quiesce.toml",
        dotfile_name = ".quiesce.toml",
        project_file_name = "quiesce.toml"
    )
)]
pub struct DrainConfig {
    /// Instances to stop without draining: `*` for all of them, or a comma
    /// separated list of instance group names. Unset drains everything.
    ///
    /// Comma separated environment values arrive as a list and TOML files
    /// may use an array; both are normalised to the comma separated form.
    #[serde(default, deserialize_with = "deserialize_selector")]
    pub skip_drain: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectorValue {
    Text(String),
    List(Vec<String>),
}

fn deserialize_selector<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<SelectorValue>::deserialize(deserializer)?;
    Ok(value.map(|selector| match selector {
        SelectorValue::Text(text) => text,
        SelectorValue::List(entries) => entries.join(","),
    }))
}

impl DrainConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("quiesce")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the validated skip-drain policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SkipDrain`] when the selector is malformed.
    pub fn skip_drain_policy(&self) -> Result<SkipDrain, ConfigError> {
        self.skip_drain
            .as_deref()
            .map_or(Ok(SkipDrain::None), SkipDrain::parse)
            .map_err(ConfigError::from)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when the skip-drain selector cannot be parsed. Set
    /// `QUIESCE_SKIP_DRAIN` or `skip_drain` in quiesce.toml.
    #[error("invalid skip_drain (QUIESCE_SKIP_DRAIN / skip_drain in quiesce.toml): {0}")]
    SkipDrain(#[from] SkipDrainError),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
