//! One-shot actions — backup and clustering bootstrap.
//!
//! Both are requested through spec fields and must fire at most once per
//! request. Planning is pure: given the record and the pod listing, each
//! action yields a [`OneShotStep`] that the engine carries out.
//!
//! ```text
//!                 ┌──── pending entry, same key ──────▶ Complete
//! Requested ──────┤
//!                 ├──── preconditions unmet ──────────▶ Wait
//!                 └──── otherwise ────────────────────▶ Fire ─▶ Complete
//!
//! Idle ───────────┬──── pending entry ────────────────▶ Settle
//!                 └──── otherwise ────────────────────▶ Nothing
//! ```
//!
//! The ledger key is `sha256(action, request)`. The engine records it as
//! `Attempted` before firing and marks the entry completed only after the
//! spec field reached its terminal value. A pass that dies anywhere in
//! between, or loses a write race to an unrelated spec edit, finds the
//! pending entry on retry and does not fire again.

use k8s_openapi::api::core::v1::Pod;
use sha2::{Digest, Sha256};
use shell_escape::unix::escape;

use h2grid_api::{
    ActionRecord, ClusteringMode, H2Database, H2DatabaseSpec, H2DatabaseStatus, BACKUP_SKIP,
};

use crate::config::OperatorConfig;
use crate::projector::pod_ip;

/// The two one-shot actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Backup,
    Clustering,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Clustering => "clustering",
        }
    }

    /// This action's ledger entry in status.
    pub fn ledger(self, status: &H2DatabaseStatus) -> Option<&ActionRecord> {
        match self {
            Self::Backup => status.backup.as_ref(),
            Self::Clustering => status.clustering.as_ref(),
        }
    }

    pub fn ledger_mut(self, status: &mut H2DatabaseStatus) -> &mut Option<ActionRecord> {
        match self {
            Self::Backup => &mut status.backup,
            Self::Clustering => &mut status.clustering,
        }
    }

    /// Move the spec field to its terminal value so the action cannot
    /// re-fire: `backupTarget = skip`, `clusteringMode = issued`.
    pub fn complete(self, spec: &mut H2DatabaseSpec) {
        match self {
            Self::Backup => spec.backup_target = BACKUP_SKIP.to_string(),
            Self::Clustering => spec.clustering_mode = ClusteringMode::Issued,
        }
    }
}

/// Backup request as read from the spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupRequest {
    /// `"skip"`: nothing to do.
    Idle,
    /// Perform one backup and send it to this URL.
    Requested(String),
}

impl BackupRequest {
    pub fn from_spec(spec: &H2DatabaseSpec) -> Self {
        let target = spec.backup_target.trim();
        if target.is_empty() || target == BACKUP_SKIP {
            Self::Idle
        } else {
            Self::Requested(target.to_string())
        }
    }
}

/// What the engine should do for one action in this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneShotStep {
    /// Not requested, or already in its terminal state.
    Nothing,
    /// Requested, but the pods do not allow it yet. No transition.
    Wait { reason: String },
    /// The ledger shows this request already fired; only the spec
    /// transition and the completion mark are left.
    Complete,
    /// Nothing requested, but the ledger entry was never marked completed.
    /// Mark it, so a later request with the same value fires.
    Settle,
    /// Record the attempt, run `command` in `pod`, then complete.
    Fire {
        key: String,
        request: String,
        pod: String,
        command: String,
    },
}

/// Idempotency key for one request value of one action.
pub fn action_key(action: Action, request: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.name().as_bytes());
    hasher.update([0u8]);
    hasher.update(request.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// The ledger entry of `action`, if it was recorded but not yet completed.
fn pending(db: &H2Database, action: Action) -> Option<&ActionRecord> {
    db.status
        .as_ref()
        .and_then(|s| action.ledger(s))
        .filter(|record| !record.completed)
}

fn idle(db: &H2Database, action: Action) -> OneShotStep {
    if pending(db, action).is_some() {
        OneShotStep::Settle
    } else {
        OneShotStep::Nothing
    }
}

/// Plan the backup action. Fires on the first listed pod.
pub fn plan_backup(db: &H2Database, pods: &[Pod], config: &OperatorConfig) -> OneShotStep {
    let BackupRequest::Requested(target) = BackupRequest::from_spec(&db.spec) else {
        return idle(db, Action::Backup);
    };

    let key = action_key(Action::Backup, &target);
    if pending(db, Action::Backup).is_some_and(|record| record.key == key) {
        return OneShotStep::Complete;
    }

    let Some(pod) = pods.first().and_then(|p| p.metadata.name.clone()) else {
        return OneShotStep::Wait {
            reason: "no pods to run the backup in".to_string(),
        };
    };

    OneShotStep::Fire {
        key,
        command: backup_command(&target, config),
        request: target,
        pod,
    }
}

/// Number of instances an H2 cluster is made of.
pub const CLUSTER_SIZE: i32 = 2;

/// Plan the clustering bootstrap. Requires `size` 2 and exactly two pods,
/// both with an IP; fires on the first, pointing it at the second.
pub fn plan_clustering(db: &H2Database, pods: &[Pod], config: &OperatorConfig) -> OneShotStep {
    if db.spec.clustering_mode != ClusteringMode::Yes {
        return idle(db, Action::Clustering);
    }

    let request = ClusteringMode::Yes.to_string();
    let key = action_key(Action::Clustering, &request);
    if pending(db, Action::Clustering).is_some_and(|record| record.key == key) {
        return OneShotStep::Complete;
    }

    if db.spec.size != CLUSTER_SIZE {
        return OneShotStep::Wait {
            reason: format!(
                "clustering needs size {CLUSTER_SIZE}, resource has size {}",
                db.spec.size
            ),
        };
    }

    let [source, target] = pods else {
        return OneShotStep::Wait {
            reason: format!(
                "clustering needs exactly 2 running instances, found {}",
                pods.len()
            ),
        };
    };

    let (Some(source_ip), Some(target_ip)) = (pod_ip(source), pod_ip(target)) else {
        return OneShotStep::Wait {
            reason: "clustering instances have no pod IP yet".to_string(),
        };
    };
    let Some(pod) = source.metadata.name.clone() else {
        return OneShotStep::Wait {
            reason: "clustering source pod has no name".to_string(),
        };
    };

    OneShotStep::Fire {
        key,
        command: clustering_command(source_ip, target_ip, config),
        request,
        pod,
    }
}

/// Archive the data directory and POST it to `target`.
pub fn backup_command(target: &str, config: &OperatorConfig) -> String {
    let archive = &config.backup.archive;
    format!(
        "apk add curl zip && zip -r {archive} {data_dir} && curl --data \"@{archive}\" {target}",
        data_dir = config.database.data_dir,
        target = escape(target.into()),
    )
}

/// Run H2's `CreateCluster` tool, replicating `source_ip` onto `target_ip`.
pub fn clustering_command(source_ip: &str, target_ip: &str, config: &OperatorConfig) -> String {
    let port = config.database.port;
    let db = &config.database.database;
    format!(
        "java -cp {jar} org.h2.tools.CreateCluster \
         -urlSource jdbc:h2:tcp://{source_ip}:{port}/{db} \
         -urlTarget jdbc:h2:tcp://{target_ip}:{port}/{db} \
         -serverList {source_ip}:{port},{target_ip}:{port}",
        jar = config.database.h2_jar,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use h2grid_api::ActionPhase;
    use k8s_openapi::api::core::v1::PodStatus;

    fn test_db(backup: &str, clustering: ClusteringMode) -> H2Database {
        let mut db = H2Database::new(
            "orders",
            H2DatabaseSpec {
                size: 2,
                backup_target: backup.to_string(),
                clustering_mode: clustering,
            },
        );
        db.metadata.namespace = Some("default".to_string());
        db.metadata.generation = Some(4);
        db
    }

    fn pod(name: &str, ip: Option<&str>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.status = Some(PodStatus {
            pod_ip: ip.map(str::to_string),
            ..Default::default()
        });
        pod
    }

    fn ledger(action: Action, request: &str, completed: bool) -> H2DatabaseStatus {
        let mut status = H2DatabaseStatus::default();
        *action.ledger_mut(&mut status) = Some(ActionRecord {
            key: action_key(action, request),
            request: request.to_string(),
            target: "orders-0".to_string(),
            phase: ActionPhase::Attempted,
            message: None,
            completed,
        });
        status
    }

    #[test]
    fn backup_request_parsing() {
        let db = test_db("skip", ClusteringMode::No);
        assert_eq!(BackupRequest::from_spec(&db.spec), BackupRequest::Idle);

        let db = test_db("  ", ClusteringMode::No);
        assert_eq!(BackupRequest::from_spec(&db.spec), BackupRequest::Idle);

        let db = test_db("https://x", ClusteringMode::No);
        assert_eq!(
            BackupRequest::from_spec(&db.spec),
            BackupRequest::Requested("https://x".to_string())
        );
    }

    #[test]
    fn backup_fires_on_first_pod() {
        let config = OperatorConfig::default();
        let db = test_db("https://backups.local/h2", ClusteringMode::No);
        let pods = [pod("orders-b", None), pod("orders-a", None)];

        match plan_backup(&db, &pods, &config) {
            OneShotStep::Fire {
                pod,
                command,
                request,
                key,
            } => {
                assert_eq!(pod, "orders-b");
                assert_eq!(request, "https://backups.local/h2");
                assert_eq!(key, action_key(Action::Backup, &request));
                assert!(command.contains("zip -r /tmp/h2_backup.zip /opt/h2-data"));
                assert!(command.ends_with("https://backups.local/h2"));
            }
            other => panic!("expected Fire, got {other:?}"),
        }
    }

    #[test]
    fn backup_idle_does_nothing() {
        let db = test_db("skip", ClusteringMode::No);
        let step = plan_backup(&db, &[pod("orders-a", None)], &OperatorConfig::default());
        assert_eq!(step, OneShotStep::Nothing);
    }

    #[test]
    fn backup_with_pending_ledger_only_completes() {
        let mut db = test_db("https://x", ClusteringMode::No);
        db.status = Some(ledger(Action::Backup, "https://x", false));

        let step = plan_backup(&db, &[pod("orders-a", None)], &OperatorConfig::default());
        assert_eq!(step, OneShotStep::Complete);
    }

    #[test]
    fn pending_ledger_outlives_unrelated_spec_edits() {
        let mut db = test_db("https://x", ClusteringMode::No);
        db.status = Some(ledger(Action::Backup, "https://x", false));
        db.spec.size = 5;
        db.metadata.generation = Some(9);

        let step = plan_backup(&db, &[pod("orders-a", None)], &OperatorConfig::default());
        assert_eq!(step, OneShotStep::Complete);
    }

    #[test]
    fn completed_ledger_lets_same_request_fire_again() {
        let mut db = test_db("https://x", ClusteringMode::No);
        db.status = Some(ledger(Action::Backup, "https://x", true));

        let step = plan_backup(&db, &[pod("orders-a", None)], &OperatorConfig::default());
        assert!(matches!(step, OneShotStep::Fire { .. }));
    }

    #[test]
    fn pending_ledger_for_other_request_fires() {
        let mut db = test_db("https://y", ClusteringMode::No);
        db.status = Some(ledger(Action::Backup, "https://x", false));

        let step = plan_backup(&db, &[pod("orders-a", None)], &OperatorConfig::default());
        assert!(matches!(step, OneShotStep::Fire { ref request, .. } if request == "https://y"));
    }

    #[test]
    fn idle_with_pending_ledger_settles() {
        let pods = [pod("orders-a", Some("10.0.0.1"))];
        let config = OperatorConfig::default();

        let mut db = test_db("skip", ClusteringMode::Issued);
        db.status = Some(ledger(Action::Backup, "https://x", false));
        assert_eq!(plan_backup(&db, &pods, &config), OneShotStep::Settle);

        db.status = Some(ledger(Action::Clustering, "yes", false));
        assert_eq!(plan_clustering(&db, &pods, &config), OneShotStep::Settle);

        db.status = Some(ledger(Action::Clustering, "yes", true));
        assert_eq!(plan_clustering(&db, &pods, &config), OneShotStep::Nothing);
    }

    #[test]
    fn backup_target_is_shell_quoted() {
        let command = backup_command("https://x/$(rm -rf /)", &OperatorConfig::default());
        assert!(command.ends_with("'https://x/$(rm -rf /)'"));
    }

    #[test]
    fn clustering_fires_with_two_pods() {
        let config = OperatorConfig::default();
        let db = test_db("skip", ClusteringMode::Yes);
        let pods = [
            pod("orders-a", Some("10.0.0.1")),
            pod("orders-b", Some("10.0.0.2")),
        ];

        match plan_clustering(&db, &pods, &config) {
            OneShotStep::Fire {
                pod,
                command,
                request,
                ..
            } => {
                assert_eq!(pod, "orders-a");
                assert_eq!(request, "yes");
                assert!(command.contains("-urlSource jdbc:h2:tcp://10.0.0.1:1521/~/test"));
                assert!(command.contains("-urlTarget jdbc:h2:tcp://10.0.0.2:1521/~/test"));
                assert!(command.ends_with("-serverList 10.0.0.1:1521,10.0.0.2:1521"));
            }
            other => panic!("expected Fire, got {other:?}"),
        }
    }

    #[test]
    fn clustering_waits_for_exactly_two_pods() {
        let config = OperatorConfig::default();
        let db = test_db("skip", ClusteringMode::Yes);

        for n in [1, 3] {
            let pods: Vec<Pod> = (0..n)
                .map(|i| pod(&format!("orders-{i}"), Some("10.0.0.9")))
                .collect();
            let step = plan_clustering(&db, &pods, &config);
            assert!(
                matches!(step, OneShotStep::Wait { ref reason } if reason.contains(&n.to_string())),
                "n={n}: {step:?}"
            );
        }
    }

    #[test]
    fn clustering_waits_unless_size_is_two() {
        let config = OperatorConfig::default();
        let pods = [
            pod("orders-a", Some("10.0.0.1")),
            pod("orders-b", Some("10.0.0.2")),
        ];

        for size in [1, 3] {
            let mut db = test_db("skip", ClusteringMode::Yes);
            db.spec.size = size;
            let step = plan_clustering(&db, &pods, &config);
            assert!(
                matches!(step, OneShotStep::Wait { ref reason } if reason.contains("size")),
                "size={size}: {step:?}"
            );
        }
    }

    #[test]
    fn clustering_waits_for_pod_ips() {
        let db = test_db("skip", ClusteringMode::Yes);
        let pods = [pod("orders-a", Some("10.0.0.1")), pod("orders-b", None)];
        let step = plan_clustering(&db, &pods, &OperatorConfig::default());
        assert!(matches!(step, OneShotStep::Wait { .. }));
    }

    #[test]
    fn clustering_inert_states() {
        let pods = [
            pod("orders-a", Some("10.0.0.1")),
            pod("orders-b", Some("10.0.0.2")),
        ];
        for mode in [ClusteringMode::No, ClusteringMode::Issued] {
            let db = test_db("skip", mode);
            let step = plan_clustering(&db, &pods, &OperatorConfig::default());
            assert_eq!(step, OneShotStep::Nothing);
        }
    }

    #[test]
    fn clustering_completes_even_if_size_or_pods_changed() {
        let mut db = test_db("skip", ClusteringMode::Yes);
        db.spec.size = 3;
        db.status = Some(ledger(Action::Clustering, "yes", false));

        let pods = [pod("orders-a", Some("10.0.0.1"))];
        let step = plan_clustering(&db, &pods, &OperatorConfig::default());
        assert_eq!(step, OneShotStep::Complete);
    }

    #[test]
    fn complete_moves_fields_to_terminal_values() {
        let mut db = test_db("https://x", ClusteringMode::Yes);
        Action::Backup.complete(&mut db.spec);
        Action::Clustering.complete(&mut db.spec);
        assert_eq!(db.spec.backup_target, BACKUP_SKIP);
        assert_eq!(db.spec.clustering_mode, ClusteringMode::Issued);
    }

    #[test]
    fn keys_differ_by_action_and_request() {
        let base = action_key(Action::Backup, "https://x");
        assert_eq!(base.len(), 32);
        assert_eq!(base, action_key(Action::Backup, "https://x"));
        assert_ne!(base, action_key(Action::Clustering, "https://x"));
        assert_ne!(base, action_key(Action::Backup, "https://y"));
    }
}
