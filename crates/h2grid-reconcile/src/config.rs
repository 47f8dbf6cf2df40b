//! h2grid.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file) yields a
//! working configuration for the stock `oscarfonts/h2` image.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub database: DatabaseConfig,
    pub backup: BackupConfig,
    pub exec: ExecConfig,
    pub requeue: RequeueConfig,
}

/// How database pods are built and addressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub image: String,
    /// TCP port of the H2 server, on the container and the service.
    pub port: i32,
    /// Directory inside the container holding the database files.
    pub data_dir: String,
    /// Classpath of the H2 jar inside the container (shell glob allowed).
    pub h2_jar: String,
    /// Database path used in the clustering JDBC URLs.
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            image: "oscarfonts/h2:alpine".to_string(),
            port: 1521,
            data_dir: "/opt/h2-data".to_string(),
            h2_jar: "/opt/h2/bin/h2*.jar".to_string(),
            database: "~/test".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Where the archive is staged inside the pod before upload.
    pub archive: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            archive: "/tmp/h2_backup.zip".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Upper bound on one remote command.
    pub timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Dispatcher retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequeueConfig {
    /// Delay before the pass that follows a workload creation.
    pub after_create_secs: u64,
    /// First retry delay after a failed pass; doubles per failure.
    pub error_backoff_base_secs: u64,
    pub error_backoff_max_secs: u64,
}

impl Default for RequeueConfig {
    fn default() -> Self {
        Self {
            after_create_secs: 1,
            error_backoff_base_secs: 5,
            error_backoff_max_secs: 300,
        }
    }
}

impl RequeueConfig {
    pub fn after_create(&self) -> Duration {
        Duration::from_secs(self.after_create_secs)
    }

    /// Backoff after `failures` consecutive failed passes (1-based).
    pub fn error_backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let secs = self
            .error_backoff_base_secs
            .saturating_mul(1u64 << exponent)
            .min(self.error_backoff_max_secs);
        Duration::from_secs(secs)
    }
}

impl OperatorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OperatorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
