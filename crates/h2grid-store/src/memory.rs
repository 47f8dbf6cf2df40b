//! MemoryStore — in-process `ResourceStore` for testing.
//!
//! Emulates the parts of API server behavior the reconciler depends on:
//! `resourceVersion` checks on replace, spec `generation` bumps, separate
//! spec and status write paths, and label-selected pod listings in
//! insertion order. Every create/replace is counted so tests can assert
//! that a pass wrote nothing.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use h2grid_api::{H2Database, ResourceKey};

use crate::error::{StoreError, StoreResult};
use crate::store::{key_of, ResourceStore};

#[derive(Default)]
struct Inner {
    /// Keyed by `{namespace}/{name}`.
    databases: BTreeMap<String, H2Database>,
    deployments: BTreeMap<String, Deployment>,
    services: BTreeMap<String, Service>,
    /// Listing order is insertion order.
    pods: Vec<Pod>,
    last_version: u64,
    writes: usize,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }
}

/// Thread-safe in-memory resource store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

/// Reject a write whose `resourceVersion` does not match the stored one.
/// A write without a version is unconditional, as on the API server.
fn check_version(stored: &ObjectMeta, incoming: &ObjectMeta, what: &str) -> StoreResult<()> {
    match &incoming.resource_version {
        Some(v) if stored.resource_version.as_ref() != Some(v) => Err(StoreError::Conflict(
            format!(
                "{what}: stale resourceVersion {v}, stored {}",
                stored.resource_version.as_deref().unwrap_or("<none>")
            ),
        )),
        _ => Ok(()),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding and inspection ─────────────────────────────────────

    /// Seed a database as if a user had created it. Not counted as a write.
    pub fn insert_database(&self, mut db: H2Database) -> StoreResult<H2Database> {
        let key = key_of(&db)?;
        let mut inner = self.lock();
        let version = inner.next_version();
        db.metadata.resource_version = Some(version.clone());
        db.metadata.generation = Some(1);
        db.metadata.uid.get_or_insert_with(|| format!("uid-{version}"));
        inner.databases.insert(key.to_string(), db.clone());
        Ok(db)
    }

    /// Apply an out-of-band edit, as a user or another writer would.
    /// Bumps `resourceVersion`, and `generation` when the spec changed.
    pub fn edit_database(
        &self,
        key: &ResourceKey,
        edit: impl FnOnce(&mut H2Database),
    ) -> Option<H2Database> {
        let mut inner = self.lock();
        let version = inner.next_version();
        let db = inner.databases.get_mut(&key.to_string())?;
        let before = db.spec.clone();
        edit(db);
        if db.spec != before {
            db.metadata.generation = Some(db.generation() + 1);
        }
        db.metadata.resource_version = Some(version);
        Some(db.clone())
    }

    /// Apply an out-of-band edit to a deployment (simulates drift).
    pub fn edit_deployment(
        &self,
        key: &ResourceKey,
        edit: impl FnOnce(&mut Deployment),
    ) -> Option<Deployment> {
        let mut inner = self.lock();
        let version = inner.next_version();
        let deployment = inner.deployments.get_mut(&key.to_string())?;
        edit(deployment);
        deployment.metadata.resource_version = Some(version);
        Some(deployment.clone())
    }

    pub fn database(&self, key: &ResourceKey) -> Option<H2Database> {
        self.lock().databases.get(&key.to_string()).cloned()
    }

    pub fn deployment(&self, key: &ResourceKey) -> Option<Deployment> {
        self.lock().deployments.get(&key.to_string()).cloned()
    }

    pub fn service(&self, key: &ResourceKey) -> Option<Service> {
        self.lock().services.get(&key.to_string()).cloned()
    }

    /// Add a pod to the end of the listing order.
    pub fn insert_pod(&self, mut pod: Pod) {
        let mut inner = self.lock();
        pod.metadata.resource_version = Some(inner.next_version());
        inner.pods.push(pod);
    }

    /// Remove a pod. Returns true if it existed.
    pub fn remove_pod(&self, namespace: &str, name: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.pods.len();
        inner.pods.retain(|p| {
            p.metadata.namespace.as_deref() != Some(namespace)
                || p.metadata.name.as_deref() != Some(name)
        });
        inner.pods.len() != before
    }

    /// Number of create/replace calls served so far.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_database(&self, key: &ResourceKey) -> StoreResult<Option<H2Database>> {
        Ok(self.database(key))
    }

    async fn replace_database(&self, db: &H2Database) -> StoreResult<H2Database> {
        let key = key_of(db)?;
        let mut inner = self.lock();
        let stored = inner
            .databases
            .get(&key.to_string())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("h2database {key}")))?;
        check_version(&stored.metadata, &db.metadata, &format!("h2database {key}"))?;

        let mut next = db.clone();
        next.status = stored.status.clone();
        next.metadata.uid = stored.metadata.uid.clone();
        next.metadata.generation = Some(if next.spec != stored.spec {
            stored.generation() + 1
        } else {
            stored.generation()
        });
        next.metadata.resource_version = Some(inner.next_version());
        inner.writes += 1;
        inner.databases.insert(key.to_string(), next.clone());
        debug!(%key, "h2database spec replaced");
        Ok(next)
    }

    async fn replace_database_status(&self, db: &H2Database) -> StoreResult<H2Database> {
        let key = key_of(db)?;
        let mut inner = self.lock();
        let mut next = inner
            .databases
            .get(&key.to_string())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("h2database {key}")))?;
        check_version(&next.metadata, &db.metadata, &format!("h2database status {key}"))?;

        next.status = db.status.clone();
        next.metadata.resource_version = Some(inner.next_version());
        inner.writes += 1;
        inner.databases.insert(key.to_string(), next.clone());
        debug!(%key, "h2database status replaced");
        Ok(next)
    }

    async fn get_deployment(&self, key: &ResourceKey) -> StoreResult<Option<Deployment>> {
        Ok(self.deployment(key))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> StoreResult<Deployment> {
        let key = key_of(deployment)?;
        let mut inner = self.lock();
        if inner.deployments.contains_key(&key.to_string()) {
            return Err(StoreError::AlreadyExists(format!("deployment {key}")));
        }
        let mut next = deployment.clone();
        let version = inner.next_version();
        next.metadata.uid = Some(format!("uid-{version}"));
        next.metadata.generation = Some(1);
        next.metadata.resource_version = Some(version);
        inner.writes += 1;
        inner.deployments.insert(key.to_string(), next.clone());
        Ok(next)
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> StoreResult<Deployment> {
        let key = key_of(deployment)?;
        let mut inner = self.lock();
        let stored = inner
            .deployments
            .get(&key.to_string())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("deployment {key}")))?;
        check_version(&stored.metadata, &deployment.metadata, &format!("deployment {key}"))?;

        let mut next = deployment.clone();
        next.metadata.uid = stored.metadata.uid.clone();
        next.metadata.resource_version = Some(inner.next_version());
        inner.writes += 1;
        inner.deployments.insert(key.to_string(), next.clone());
        Ok(next)
    }

    async fn get_service(&self, key: &ResourceKey) -> StoreResult<Option<Service>> {
        Ok(self.service(key))
    }

    async fn create_service(&self, service: &Service) -> StoreResult<Service> {
        let key = key_of(service)?;
        let mut inner = self.lock();
        if inner.services.contains_key(&key.to_string()) {
            return Err(StoreError::AlreadyExists(format!("service {key}")));
        }
        let mut next = service.clone();
        let version = inner.next_version();
        next.metadata.uid = Some(format!("uid-{version}"));
        next.metadata.resource_version = Some(version);
        inner.writes += 1;
        inner.services.insert(key.to_string(), next.clone());
        Ok(next)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<Pod>> {
        let inner = self.lock();
        let pods = inner
            .pods
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
            .filter(|p| {
                let pod_labels = p.metadata.labels.as_ref();
                labels
                    .iter()
                    .all(|(k, v)| pod_labels.and_then(|l| l.get(k)) == Some(v))
            })
            .cloned()
            .collect();
        Ok(pods)
    }
}
