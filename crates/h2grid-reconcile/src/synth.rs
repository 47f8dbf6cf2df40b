//! Child resource synthesis — the desired `Deployment` and `Service` for a
//! database.
//!
//! Pure functions: the same record and config always produce the same
//! objects. Both children carry a controller owner reference back to the
//! `H2Database`, so the platform garbage-collects them with it.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{Resource, ResourceExt};

use h2grid_api::{labels_for, H2Database};

use crate::config::OperatorConfig;

/// Name of the database container and its port.
pub const CONTAINER_NAME: &str = "h2database";

/// Metadata shared by both children: same name and namespace as the
/// database, owned by it.
fn child_meta(db: &H2Database) -> ObjectMeta {
    ObjectMeta {
        name: Some(db.name_any()),
        namespace: db.namespace(),
        labels: Some(labels_for(&db.name_any())),
        owner_references: db.controller_owner_ref(&()).map(|owner| vec![owner]),
        ..Default::default()
    }
}

/// Desired workload: `size` replicas of the H2 server image.
pub fn workload_for(db: &H2Database, config: &OperatorConfig) -> Deployment {
    let labels = labels_for(&db.name_any());

    Deployment {
        metadata: child_meta(db),
        spec: Some(DeploymentSpec {
            replicas: Some(db.spec.size),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(config.database.image.clone()),
                        ports: Some(vec![ContainerPort {
                            container_port: config.database.port,
                            name: Some(CONTAINER_NAME.to_string()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Desired service: the database port, selecting the workload's pods.
pub fn endpoint_for(db: &H2Database, config: &OperatorConfig) -> Service {
    Service {
        metadata: child_meta(db),
        spec: Some(ServiceSpec {
            selector: Some(labels_for(&db.name_any())),
            ports: Some(vec![ServicePort {
                port: config.database.port,
                name: Some(db.name_any()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Replica count of an existing workload, if the field is populated.
pub fn replicas_of(deployment: &Deployment) -> Option<i32> {
    deployment.spec.as_ref().and_then(|s| s.replicas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use h2grid_api::{ClusteringMode, H2DatabaseSpec, BACKUP_SKIP};

    fn test_db(size: i32) -> H2Database {
        let mut db = H2Database::new(
            "orders",
            H2DatabaseSpec {
                size,
                backup_target: BACKUP_SKIP.to_string(),
                clustering_mode: ClusteringMode::No,
            },
        );
        db.metadata.namespace = Some("default".to_string());
        db.metadata.uid = Some("4f1c-uid".to_string());
        db
    }

    #[test]
    fn workload_matches_size_and_image() {
        let config = OperatorConfig::default();
        let dep = workload_for(&test_db(3), &config);

        assert_eq!(dep.metadata.name.as_deref(), Some("orders"));
        assert_eq!(dep.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(replicas_of(&dep), Some(3));

        let pod_spec = dep.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let container = &pod_spec.containers[0];
        assert_eq!(container.image.as_deref(), Some("oscarfonts/h2:alpine"));
        let port = &container.ports.as_ref().unwrap()[0];
        assert_eq!(port.container_port, 1521);
        assert_eq!(port.name.as_deref(), Some("h2database"));
    }

    #[test]
    fn endpoint_selector_equals_workload_labels() {
        let config = OperatorConfig::default();
        let db = test_db(2);
        let dep = workload_for(&db, &config);
        let svc = endpoint_for(&db, &config);

        let spec = dep.spec.as_ref().unwrap();
        let pod_labels = spec.template.metadata.as_ref().unwrap().labels.clone();
        let selector = svc.spec.as_ref().unwrap().selector.clone();

        assert_eq!(selector, pod_labels);
        assert_eq!(spec.selector.match_labels, pod_labels);
        assert_eq!(selector, Some(labels_for("orders")));
    }

    #[test]
    fn children_are_owned_by_the_database() {
        let config = OperatorConfig::default();
        let db = test_db(1);

        for owners in [
            workload_for(&db, &config).metadata.owner_references,
            endpoint_for(&db, &config).metadata.owner_references,
        ] {
            let owners = owners.unwrap();
            assert_eq!(owners.len(), 1);
            assert_eq!(owners[0].kind, "H2Database");
            assert_eq!(owners[0].name, "orders");
            assert_eq!(owners[0].uid, "4f1c-uid");
            assert_eq!(owners[0].controller, Some(true));
        }
    }

    #[test]
    fn synthesis_is_deterministic() {
        let config = OperatorConfig::default();
        let db = test_db(2);
        assert_eq!(workload_for(&db, &config), workload_for(&db, &config));
        assert_eq!(endpoint_for(&db, &config), endpoint_for(&db, &config));
    }

    #[test]
    fn record_without_uid_has_no_owner() {
        let mut db = test_db(1);
        db.metadata.uid = None;
        let dep = workload_for(&db, &OperatorConfig::default());
        assert!(dep.metadata.owner_references.is_none());
    }

    #[test]
    fn service_uses_configured_port() {
        let mut config = OperatorConfig::default();
        config.database.port = 9092;
        let svc = endpoint_for(&test_db(1), &config);
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 9092);
        assert_eq!(port.name.as_deref(), Some("orders"));
    }
}
