//! Stack configuration.
//!
//! A YAML file selects the stack name and tunes the chart, image and
//! schedule settings. Every field except the stack name has a default
//! matching the production deployment, so a minimal file is one line.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Top-level stack configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Stack name, e.g. `dev` or `prod`. Drives all physical names.
    pub stack: String,

    /// Azure region for the resource group and storage account.
    #[serde(default = "default_location")]
    pub location: String,

    /// Kubernetes namespace for the backup tooling.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Helm release name.
    #[serde(default = "default_release_name")]
    pub release_name: String,

    /// Delay in milliseconds between service principal creation and
    /// password issuance, covering directory propagation.
    #[serde(default = "default_settling_delay_ms")]
    pub settling_delay_ms: u64,

    /// Chart source.
    #[serde(default)]
    pub chart: ChartConfig,

    /// Container image for the backup tool.
    #[serde(default)]
    pub image: ImageConfig,

    /// Object store plugin sidecar.
    #[serde(default)]
    pub plugin: PluginConfig,

    /// Recurring backup schedule.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Chart name, repository and pinned version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Chart name within the repository.
    #[serde(default = "default_chart_name")]
    pub name: String,
    /// Chart repository URL.
    #[serde(default = "default_chart_repository")]
    pub repository: String,
    /// Pinned chart version.
    #[serde(default = "default_chart_version")]
    pub version: String,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            name: default_chart_name(),
            repository: default_chart_repository(),
            version: default_chart_version(),
        }
    }
}

/// Main container image settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image repository.
    #[serde(default = "default_image_repository")]
    pub repository: String,
    /// Image pull policy.
    #[serde(default = "default_pull_policy")]
    pub pull_policy: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            repository: default_image_repository(),
            pull_policy: default_pull_policy(),
        }
    }
}

/// Object store plugin settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Init container name.
    #[serde(default = "default_plugin_name")]
    pub name: String,
    /// Plugin image.
    #[serde(default = "default_plugin_image")]
    pub image: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            name: default_plugin_name(),
            image: default_plugin_image(),
        }
    }
}

/// Recurring backup schedule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Schedule object name.
    #[serde(default = "default_schedule_name")]
    pub name: String,
    /// Cron expression.
    #[serde(default = "default_schedule_cron")]
    pub cron: String,
    /// Backup retention period.
    #[serde(default = "default_schedule_ttl")]
    pub ttl: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            name: default_schedule_name(),
            cron: default_schedule_cron(),
            ttl: default_schedule_ttl(),
        }
    }
}

fn default_location() -> String {
    String::from("westeurope")
}

fn default_namespace() -> String {
    String::from("velero-backups")
}

fn default_release_name() -> String {
    String::from("velero-release")
}

fn default_settling_delay_ms() -> u64 {
    2000
}

fn default_chart_name() -> String {
    String::from("velero")
}

fn default_chart_repository() -> String {
    String::from("https://vmware-tanzu.github.io/helm-charts")
}

fn default_chart_version() -> String {
    String::from("4.1.4")
}

fn default_image_repository() -> String {
    String::from("velero/velero")
}

fn default_pull_policy() -> String {
    String::from("Always")
}

fn default_plugin_name() -> String {
    String::from("velero-plugin-for-microsoft-azure")
}

fn default_plugin_image() -> String {
    String::from("velero/velero-plugin-for-microsoft-azure:master")
}

fn default_schedule_name() -> String {
    String::from("every-6-hours")
}

fn default_schedule_cron() -> String {
    String::from("0 */6 * * *")
}

fn default_schedule_ttl() -> String {
    String::from("168h0m0s")
}

impl StackConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, malformed or fails
    /// validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration for the given stack name with all defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack name fails validation.
    pub fn for_stack(stack: impl Into<String>) -> Result<Self> {
        let config = Self {
            stack: stack.into(),
            location: default_location(),
            namespace: default_namespace(),
            release_name: default_release_name(),
            settling_delay_ms: default_settling_delay_ms(),
            chart: ChartConfig::default(),
            image: ImageConfig::default(),
            plugin: PluginConfig::default(),
            schedule: ScheduleConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates all fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.stack.is_empty() {
            return Err(ConfigError::MissingStack.into());
        }
        if !self
            .stack
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ConfigError::validation(
                format!(
                    "Stack name '{}' may only contain ASCII letters, digits and dashes",
                    self.stack
                ),
                "stack",
            )
            .into());
        }
        if self.location.is_empty() {
            return Err(ConfigError::validation("Location cannot be empty", "location").into());
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::validation("Namespace cannot be empty", "namespace").into());
        }
        if self.release_name.is_empty() {
            return Err(
                ConfigError::validation("Release name cannot be empty", "release_name").into(),
            );
        }
        if self.chart.version.is_empty() {
            return Err(
                ConfigError::validation("Chart version cannot be empty", "chart.version").into(),
            );
        }
        Ok(())
    }

    /// Settling delay between principal creation and password issuance.
    #[must_use]
    pub fn settling_delay(&self) -> Duration {
        Duration::from_millis(self.settling_delay_ms)
    }
}
