//! The `ResourceStore` trait — typed access to the resources one
//! `H2Database` owns.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::Resource;

use h2grid_api::{H2Database, ResourceKey};

use crate::error::{StoreError, StoreResult};

/// Platform resource store as seen by the reconciler.
///
/// Getters return `Ok(None)` for absent objects. Writes return the object
/// as stored, with its new `resourceVersion`, so a pass can keep writing
/// without a re-read.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    // ── H2Database ─────────────────────────────────────────────────

    async fn get_database(&self, key: &ResourceKey) -> StoreResult<Option<H2Database>>;

    /// Write the spec and metadata. Status is ignored on this path.
    async fn replace_database(&self, db: &H2Database) -> StoreResult<H2Database>;

    /// Write the status sub-resource. Spec is ignored on this path.
    async fn replace_database_status(&self, db: &H2Database) -> StoreResult<H2Database>;

    // ── Children ───────────────────────────────────────────────────

    async fn get_deployment(&self, key: &ResourceKey) -> StoreResult<Option<Deployment>>;

    async fn create_deployment(&self, deployment: &Deployment) -> StoreResult<Deployment>;

    async fn replace_deployment(&self, deployment: &Deployment) -> StoreResult<Deployment>;

    async fn get_service(&self, key: &ResourceKey) -> StoreResult<Option<Service>>;

    async fn create_service(&self, service: &Service) -> StoreResult<Service>;

    /// List pods in `namespace` carrying all of `labels`, in the order the
    /// backend returns them.
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<Pod>>;
}

/// Key of a namespaced object, or an error naming the missing field.
pub fn key_of<K: Resource>(obj: &K) -> StoreResult<ResourceKey> {
    let meta = obj.meta();
    let namespace = meta
        .namespace
        .clone()
        .ok_or(StoreError::MissingMetadata("namespace"))?;
    let name = meta.name.clone().ok_or(StoreError::MissingMetadata("name"))?;
    Ok(ResourceKey { namespace, name })
}

/// Render a label map as an equality-based selector (`k=v,k2=v2`).
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_joins_sorted_pairs() {
        let labels = h2grid_api::labels_for("orders");
        assert_eq!(label_selector(&labels), "app=h2database,h2database_cr=orders");
    }

    #[test]
    fn key_of_requires_namespace() {
        let mut svc = Service::default();
        svc.metadata.name = Some("orders".to_string());
        assert!(matches!(
            key_of(&svc),
            Err(StoreError::MissingMetadata("namespace"))
        ));

        svc.metadata.namespace = Some("default".to_string());
        assert_eq!(key_of(&svc).unwrap(), ResourceKey::new("default", "orders"));
    }
}
