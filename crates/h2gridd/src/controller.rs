//! Controller mode — watches resources and dispatches convergence passes.
//!
//! The watch machinery guarantees at most one pass in flight per
//! `H2Database`; passes for different resources run concurrently. A pass
//! that fails is retried with exponential backoff per resource.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::DynamicObject;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use tracing::{debug, error, info, warn};

use h2grid_api::{H2Database, ResourceKey};
use h2grid_exec::KubeExecutor;
use h2grid_reconcile::{OperatorConfig, ReconcileError, Reconciler};
use h2grid_store::KubeStore;

/// Consecutive failure counts, per resource.
#[derive(Default)]
pub struct FailureCounter {
    counts: Mutex<HashMap<ResourceKey, u32>>,
}

impl FailureCounter {
    /// Count one more failure for `key`; returns the new count.
    pub fn record(&self, key: &ResourceKey) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset(&self, key: &ResourceKey) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Drop the count of a resource that no longer exists.
    pub fn forget(&self, object: &ObjectRef<DynamicObject>) {
        if let Some(namespace) = object.namespace.as_deref() {
            self.reset(&ResourceKey::new(namespace, object.name.as_str()));
        }
    }
}

/// Shared state handed to every pass.
pub struct Context {
    reconciler: Reconciler<KubeStore, KubeExecutor>,
    failures: FailureCounter,
}

/// Run the controller until a shutdown signal arrives.
pub async fn run(config: OperatorConfig, namespace: Option<String>) -> anyhow::Result<()> {
    info!("h2grid daemon starting in controller mode");

    let client = Client::try_default().await?;
    info!(namespace = namespace.as_deref().unwrap_or("<all>"), "cluster client ready");

    let (databases, deployments, services) = match namespace.as_deref() {
        Some(ns) => (
            Api::<H2Database>::namespaced(client.clone(), ns),
            Api::<Deployment>::namespaced(client.clone(), ns),
            Api::<Service>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<H2Database>::all(client.clone()),
            Api::<Deployment>::all(client.clone()),
            Api::<Service>::all(client.clone()),
        ),
    };

    let exec = KubeExecutor::new(client.clone()).with_timeout(config.exec.timeout());
    let store = KubeStore::new(client);
    let ctx = Arc::new(Context {
        reconciler: Reconciler::new(store, exec, config),
        failures: FailureCounter::default(),
    });

    let dispatch_ctx = Arc::clone(&ctx);
    Controller::new(databases, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| {
            let ctx = Arc::clone(&dispatch_ctx);
            async move {
                match result {
                    Ok((object, _)) => info!(h2database = %object, "reconciled"),
                    Err(controller::Error::ObjectNotFound(object)) => {
                        debug!(h2database = %object, "deleted, dropping retry state");
                        ctx.failures.forget(&object);
                    }
                    Err(e) => warn!(error = %e, "reconcile dispatch failed"),
                }
            }
        })
        .await;

    info!("h2grid daemon stopped");
    Ok(())
}

async fn reconcile(db: Arc<H2Database>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let key = ResourceKey::from_resource(db.as_ref())
        .ok_or(ReconcileError::MissingMetadata("namespace"))?;

    let outcome = ctx.reconciler.reconcile(&key).await?;
    ctx.failures.reset(&key);

    let requeue = &ctx.reconciler.config().requeue;
    Ok(if outcome.requeue {
        Action::requeue(requeue.after_create())
    } else {
        Action::await_change()
    })
}

fn error_policy(db: Arc<H2Database>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    let Some(key) = ResourceKey::from_resource(db.as_ref()) else {
        error!(error = %err, "reconcile failed for a resource without namespace");
        return Action::await_change();
    };

    let failures = ctx.failures.record(&key);
    let delay = ctx.reconciler.config().requeue.error_backoff(failures);
    if err.is_conflict() {
        info!(h2database = %key, ?delay, "lost a write race, retrying");
    } else {
        error!(h2database = %key, error = %err, failures, ?delay, "reconcile failed, backing off");
    }
    Action::requeue(delay)
}
