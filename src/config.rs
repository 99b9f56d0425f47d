//! Configuration loading via `ortho-config`.
//!
//! Poll intervals, deadlines and SSH settings are layered from defaults,
//! `stratus.toml` and `STRATUS_*` environment variables, then turned into
//! [`LifecycleSettings`], the value every [`crate::VirtualMachine`] is built
//! with.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poll::Poller;

/// Layered lifecycle configuration.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STRATUS",
    discovery(
        app_name = "stratus",
        env_var = "STRATUS_CONFIG_PATH",
        config_file_name = "stratus.toml",
        dotfile_name = ".stratus.toml",
        project_file_name = "stratus.toml"
    )
)]
pub struct LifecycleConfig {
    /// Seconds between status polls.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Deadline in seconds for instance, volume and image transitions.
    #[ortho_config(default = 900)]
    pub action_timeout_secs: u64,
    /// Deadline in seconds for SSH to become reachable.
    #[ortho_config(default = 900)]
    pub ssh_timeout_secs: u64,
    /// Per-attempt TCP connect timeout in seconds for the SSH probe.
    #[ortho_config(default = 5)]
    pub ssh_connect_timeout_secs: u64,
    /// SSH port on the instance.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
}

/// Metadata for a configuration field, used to generate actionable errors.
struct FieldMetadata {
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(env_var: &'static str, toml_key: &'static str) -> Self {
        Self { env_var, toml_key }
    }
}

impl LifecycleConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn require_non_zero(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be greater than zero: set {} or {} in stratus.toml",
                metadata.toml_key, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Checks that every duration and the SSH port are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_non_zero(
            self.poll_interval_secs,
            &FieldMetadata::new("STRATUS_POLL_INTERVAL_SECS", "poll_interval_secs"),
        )?;
        Self::require_non_zero(
            self.action_timeout_secs,
            &FieldMetadata::new("STRATUS_ACTION_TIMEOUT_SECS", "action_timeout_secs"),
        )?;
        Self::require_non_zero(
            self.ssh_timeout_secs,
            &FieldMetadata::new("STRATUS_SSH_TIMEOUT_SECS", "ssh_timeout_secs"),
        )?;
        Self::require_non_zero(
            self.ssh_connect_timeout_secs,
            &FieldMetadata::new("STRATUS_SSH_CONNECT_TIMEOUT_SECS", "ssh_connect_timeout_secs"),
        )?;
        Self::require_non_zero(
            u64::from(self.ssh_port),
            &FieldMetadata::new("STRATUS_SSH_PORT", "ssh_port"),
        )?;
        Ok(())
    }

    /// Validates and converts into [`LifecycleSettings`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when validation fails.
    pub fn settings(&self) -> Result<LifecycleSettings, ConfigError> {
        self.validate()?;
        Ok(LifecycleSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            action_timeout: Duration::from_secs(self.action_timeout_secs),
            ssh_timeout: Duration::from_secs(self.ssh_timeout_secs),
            ssh_connect_timeout: Duration::from_secs(self.ssh_connect_timeout_secs),
            ssh_port: self.ssh_port,
        })
    }
}

/// Timing and SSH settings handed to the lifecycle orchestrator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LifecycleSettings {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Deadline for instance, volume and image transitions.
    pub action_timeout: Duration,
    /// Deadline for SSH to become reachable.
    pub ssh_timeout: Duration,
    /// Per-attempt connect timeout for the SSH probe.
    pub ssh_connect_timeout: Duration,
    /// SSH port on the instance.
    pub ssh_port: u16,
}

impl LifecycleSettings {
    /// Poller for provider state transitions.
    #[must_use]
    pub const fn action_poller(&self) -> Poller {
        Poller::new(self.poll_interval, self.action_timeout)
    }

    /// Poller for SSH reachability.
    #[must_use]
    pub const fn ssh_poller(&self) -> Poller {
        Poller::new(self.poll_interval, self.ssh_timeout)
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            action_timeout: Duration::from_secs(900),
            ssh_timeout: Duration::from_secs(900),
            ssh_connect_timeout: Duration::from_secs(5),
            ssh_port: 22,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// A configured value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
