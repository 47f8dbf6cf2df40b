//! Domain types for the `H2Database` resource.
//!
//! The spec carries the user's desired state; two of its fields double as
//! one-shot commands (`backupTarget`, `clusteringMode`). The status holds
//! the observed pod names and a ledger of the one-shot actions the
//! controller has fired, so a command is never issued twice for the same
//! request.

use std::fmt;

use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Sentinel value of `backupTarget` meaning "no backup requested".
pub const BACKUP_SKIP: &str = "skip";

// ── H2Database ─────────────────────────────────────────────────────

/// Desired state of a managed H2 database.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[kube(
    group = "h2.example.com",
    version = "v1alpha1",
    kind = "H2Database",
    plural = "h2databases",
    namespaced,
    status = "H2DatabaseStatus",
    shortname = "h2db",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Size","type":"integer","jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Clustering","type":"string","jsonPath":".spec.clusteringMode"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct H2DatabaseSpec {
    /// Target number of database pods.
    pub size: i32,

    /// URL to POST one backup of the data directory to, or `"skip"`.
    ///
    /// Reset to `"skip"` by the controller once the backup command has
    /// been issued.
    #[serde(default = "default_backup_target", alias = "backup")]
    pub backup_target: String,

    /// Two-node replication request. Only honored with exactly two pods.
    #[serde(default, alias = "clustering")]
    pub clustering_mode: ClusteringMode,
}

fn default_backup_target() -> String {
    BACKUP_SKIP.to_string()
}

/// Clustering request state. Moves `Yes → Issued` at most once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringMode {
    #[default]
    No,
    Yes,
    Issued,
}

impl fmt::Display for ClusteringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::No => "no",
            Self::Yes => "yes",
            Self::Issued => "issued",
        };
        f.write_str(s)
    }
}

/// Observed state of a managed H2 database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct H2DatabaseStatus {
    /// Names of the pods belonging to this database, sorted.
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Last backup command fired for this database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<ActionRecord>,

    /// Last clustering bootstrap fired for this database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clustering: Option<ActionRecord>,
}

// ── One-shot ledger ────────────────────────────────────────────────

/// Ledger entry for a one-shot remote command.
///
/// Written as `Attempted` before the command is issued. While an entry with
/// the same `key` is not `completed`, later passes never fire the command
/// again; they only finish moving the spec field to its terminal value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    /// Idempotency key derived from the action and the request value.
    pub key: String,
    /// The request value that triggered the action.
    pub request: String,
    /// Pod the command was sent to.
    pub target: String,
    pub phase: ActionPhase,
    /// Error text when the command failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set once the spec field reached its terminal value. Only then may
    /// the same request value fire again.
    #[serde(default)]
    pub completed: bool,
}

/// Outcome of a one-shot action as far as the controller knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ActionPhase {
    /// Recorded before the command fired; no outcome yet.
    Attempted,
    Succeeded,
    /// The command errored. It may or may not have taken effect.
    Failed,
}

// ── Keys ───────────────────────────────────────────────────────────

/// Namespace-scoped reference to an `H2Database`.
///
/// Child resources share the database's name, so the same key addresses
/// the deployment and the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build the key for a namespaced object. Returns None for objects
    /// without a namespace or name.
    pub fn from_resource<K: Resource>(obj: &K) -> Option<Self> {
        let namespace = obj.namespace()?;
        let name = obj.meta().name.clone()?;
        Some(Self { namespace, name })
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl H2Database {
    /// Generation of the spec, as maintained by the API server.
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }

    /// Current status, or an empty one if none has been written yet.
    pub fn status_or_default(&self) -> H2DatabaseStatus {
        self.status.clone().unwrap_or_default()
    }
}
