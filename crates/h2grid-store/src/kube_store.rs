//! KubeStore — `ResourceStore` backed by the Kubernetes API server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

use h2grid_api::{H2Database, ResourceKey};

use crate::error::{StoreError, StoreResult};
use crate::store::{key_of, label_selector, ResourceStore};

/// Convert a `kube::Error` into a `StoreError`, tagging it with the object
/// it concerns.
fn map_kube_err(what: String) -> impl FnOnce(kube::Error) -> StoreError {
    move |e| match e {
        kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound(what),
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            StoreError::AlreadyExists(what)
        }
        kube::Error::Api(resp) if resp.code == 409 => {
            StoreError::Conflict(format!("{what}: {}", resp.message))
        }
        kube::Error::SerdeError(e) => StoreError::Serialize(format!("{what}: {e}")),
        other => StoreError::Api(format!("{what}: {other}")),
    }
}

/// Resource store talking to the API server through a shared client.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn databases(&self, namespace: &str) -> Api<H2Database> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_database(&self, key: &ResourceKey) -> StoreResult<Option<H2Database>> {
        self.databases(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(map_kube_err(format!("h2database {key}")))
    }

    async fn replace_database(&self, db: &H2Database) -> StoreResult<H2Database> {
        let key = key_of(db)?;
        let stored = self
            .databases(&key.namespace)
            .replace(&key.name, &PostParams::default(), db)
            .await
            .map_err(map_kube_err(format!("h2database {key}")))?;
        debug!(%key, "h2database spec replaced");
        Ok(stored)
    }

    async fn replace_database_status(&self, db: &H2Database) -> StoreResult<H2Database> {
        let key = key_of(db)?;
        let body = serde_json::to_vec(db).map_err(|e| StoreError::Serialize(e.to_string()))?;
        let stored = self
            .databases(&key.namespace)
            .replace_status(&key.name, &PostParams::default(), body)
            .await
            .map_err(map_kube_err(format!("h2database status {key}")))?;
        debug!(%key, "h2database status replaced");
        Ok(stored)
    }

    async fn get_deployment(&self, key: &ResourceKey) -> StoreResult<Option<Deployment>> {
        self.deployments(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(map_kube_err(format!("deployment {key}")))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> StoreResult<Deployment> {
        let key = key_of(deployment)?;
        self.deployments(&key.namespace)
            .create(&PostParams::default(), deployment)
            .await
            .map_err(map_kube_err(format!("deployment {key}")))
    }

    async fn replace_deployment(&self, deployment: &Deployment) -> StoreResult<Deployment> {
        let key = key_of(deployment)?;
        self.deployments(&key.namespace)
            .replace(&key.name, &PostParams::default(), deployment)
            .await
            .map_err(map_kube_err(format!("deployment {key}")))
    }

    async fn get_service(&self, key: &ResourceKey) -> StoreResult<Option<Service>> {
        self.services(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(map_kube_err(format!("service {key}")))
    }

    async fn create_service(&self, service: &Service) -> StoreResult<Service> {
        let key = key_of(service)?;
        self.services(&key.namespace)
            .create(&PostParams::default(), service)
            .await
            .map_err(map_kube_err(format!("service {key}")))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<Pod>> {
        let selector = label_selector(labels);
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(map_kube_err(format!("pods {namespace} [{selector}]")))?;
        Ok(list.items)
    }
}
