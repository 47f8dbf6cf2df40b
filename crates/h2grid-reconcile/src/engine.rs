//! Reconciler — one convergence pass for one `H2Database`.
//!
//! Steps run strictly in order, each awaited before the next:
//! 1. read the record (absent → done)
//! 2. read the deployment (absent → create it, requeue)
//! 3. correct the replica count
//! 4. create the service if absent
//! 5. project pod names into status
//! 6. backup, then 7. clustering, when at least one pod exists
//!
//! Any store error aborts the pass and is returned for the dispatcher to
//! retry. Remote command errors are logged and recorded, never returned.

use tracing::{debug, error, info, warn};

use h2grid_api::{ActionPhase, ActionRecord, H2Database, ResourceKey};
use h2grid_exec::{CommandExecutor, ExecTarget};
use h2grid_store::ResourceStore;

use crate::config::OperatorConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::oneshot::{plan_backup, plan_clustering, Action, OneShotStep};
use crate::projector::{nodes_changed, project_nodes};
use crate::synth::{endpoint_for, replicas_of, workload_for, CONTAINER_NAME};

/// Result of a pass that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// Run another pass soon, independent of watch events.
    pub requeue: bool,
}

impl ReconcileOutcome {
    pub fn done() -> Self {
        Self { requeue: false }
    }

    pub fn requeue() -> Self {
        Self { requeue: true }
    }
}

/// Drives `H2Database` resources toward their spec.
///
/// Holds no per-resource state; everything a pass needs is read from the
/// store, so passes for different resources can run concurrently.
pub struct Reconciler<S, X> {
    store: S,
    exec: X,
    config: OperatorConfig,
}

impl<S: ResourceStore, X: CommandExecutor> Reconciler<S, X> {
    pub fn new(store: S, exec: X, config: OperatorConfig) -> Self {
        Self {
            store,
            exec,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn executor(&self) -> &X {
        &self.exec
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Run one convergence pass for `key`.
    pub async fn reconcile(&self, key: &ResourceKey) -> ReconcileResult<ReconcileOutcome> {
        let ns = key.namespace.as_str();
        debug!(h2database = %key, "reconciling");

        // 1. Desired state.
        let Some(mut db) = self.store.get_database(key).await? else {
            info!(
                h2database = %key,
                "not found, ignoring since it must have been deleted"
            );
            return Ok(ReconcileOutcome::done());
        };

        // 2. Workload. A fresh deployment is acted on in the next pass,
        // once it is observable.
        let Some(mut deployment) = self.store.get_deployment(key).await? else {
            let desired = workload_for(&db, &self.config);
            info!(h2database = %key, replicas = db.spec.size, "creating deployment");
            self.store.create_deployment(&desired).await.inspect_err(|e| {
                error!(h2database = %key, error = %e, "failed to create deployment");
            })?;
            return Ok(ReconcileOutcome::requeue());
        };

        // 3. Replica drift.
        let size = db.spec.size;
        let current = replicas_of(&deployment);
        if current != Some(size) {
            if let Some(spec) = deployment.spec.as_mut() {
                spec.replicas = Some(size);
            } else {
                deployment.spec = workload_for(&db, &self.config).spec;
            }
            info!(h2database = %key, from = ?current, to = size, "scaling deployment");
            self.store.replace_deployment(&deployment).await.inspect_err(|e| {
                error!(h2database = %key, error = %e, "failed to update deployment");
            })?;
        }

        // 4. Endpoint.
        if self.store.get_service(key).await?.is_none() {
            let desired = endpoint_for(&db, &self.config);
            info!(h2database = %key, "creating service");
            self.store.create_service(&desired).await.inspect_err(|e| {
                error!(h2database = %key, error = %e, "failed to create service");
            })?;
        }

        // 5. Observed node identities.
        let labels = h2grid_api::labels_for(&key.name);
        let pods = self.store.list_pods(ns, &labels).await.inspect_err(|e| {
            error!(h2database = %key, error = %e, "failed to list pods");
        })?;
        let nodes = project_nodes(&pods);
        let mut status = db.status_or_default();
        if nodes_changed(&status.nodes, &nodes) {
            debug!(h2database = %key, ?nodes, "updating status nodes");
            status.nodes = nodes;
            db.status = Some(status);
            db = self.store.replace_database_status(&db).await.inspect_err(|e| {
                error!(h2database = %key, error = %e, "failed to update h2database status");
            })?;
        }

        if pods.is_empty() {
            return Ok(ReconcileOutcome::done());
        }

        // 6. Backup.
        let step = plan_backup(&db, &pods, &self.config);
        db = self.run_one_shot(db, Action::Backup, step).await?;

        // 7. Clustering bootstrap.
        let step = plan_clustering(&db, &pods, &self.config);
        self.run_one_shot(db, Action::Clustering, step).await?;

        Ok(ReconcileOutcome::done())
    }

    /// Carry out one planned one-shot step. Returns the record as stored
    /// after any writes the step made.
    async fn run_one_shot(
        &self,
        db: H2Database,
        action: Action,
        step: OneShotStep,
    ) -> ReconcileResult<H2Database> {
        let resource = ResourceKey::from_resource(&db)
            .ok_or(ReconcileError::MissingMetadata("namespace"))?;

        match step {
            OneShotStep::Nothing => {
                debug!(h2database = %resource, action = action.name(), "nothing requested");
                Ok(db)
            }
            OneShotStep::Wait { reason } => {
                info!(
                    h2database = %resource,
                    action = action.name(),
                    %reason,
                    "one-shot action waiting"
                );
                Ok(db)
            }
            OneShotStep::Complete => {
                warn!(
                    h2database = %resource,
                    action = action.name(),
                    "command already issued for this request, completing transition"
                );
                self.complete(db, action).await
            }
            OneShotStep::Settle => {
                debug!(h2database = %resource, action = action.name(), "settling ledger entry");
                self.mark_completed(db, action).await
            }
            OneShotStep::Fire {
                key,
                request,
                pod,
                command,
            } => {
                let mut record = ActionRecord {
                    key,
                    request,
                    target: pod.clone(),
                    phase: ActionPhase::Attempted,
                    message: None,
                    completed: false,
                };
                let db = self.record(db, action, record.clone()).await?;

                let target = ExecTarget::new(resource.namespace.clone(), pod)
                    .with_container(CONTAINER_NAME);
                info!(
                    h2database = %resource,
                    %target,
                    action = action.name(),
                    "issuing remote command"
                );
                match self.exec.exec(&target, &command).await {
                    Ok(output) => {
                        debug!(
                            h2database = %resource,
                            action = action.name(),
                            stdout = %output.stdout,
                            stderr = %output.stderr,
                            "remote command finished"
                        );
                        record.phase = ActionPhase::Succeeded;
                    }
                    Err(e) => {
                        error!(
                            h2database = %resource,
                            action = action.name(),
                            error = %e,
                            stdout = e.stdout().unwrap_or_default(),
                            stderr = e.stderr().unwrap_or_default(),
                            "remote command failed, the action may not have taken effect"
                        );
                        record.phase = ActionPhase::Failed;
                        record.message = Some(match e.stderr() {
                            Some(stderr) => format!("{e}: {stderr}"),
                            None => e.to_string(),
                        });
                    }
                }

                let db = self.record(db, action, record).await?;
                self.complete(db, action).await
            }
        }
    }

    /// Write `record` as this action's ledger entry.
    async fn record(
        &self,
        mut db: H2Database,
        action: Action,
        record: ActionRecord,
    ) -> ReconcileResult<H2Database> {
        let mut status = db.status_or_default();
        *action.ledger_mut(&mut status) = Some(record);
        db.status = Some(status);
        let stored = self.store.replace_database_status(&db).await.inspect_err(|e| {
            error!(action = action.name(), error = %e, "failed to record one-shot action");
        })?;
        Ok(stored)
    }

    /// Move the request field to its terminal value, then mark the ledger
    /// entry completed.
    async fn complete(&self, mut db: H2Database, action: Action) -> ReconcileResult<H2Database> {
        action.complete(&mut db.spec);
        let stored = self.store.replace_database(&db).await.inspect_err(|e| {
            error!(action = action.name(), error = %e, "failed to update h2database spec");
        })?;
        info!(
            action = action.name(),
            backup_target = %stored.spec.backup_target,
            clustering_mode = %stored.spec.clustering_mode,
            "one-shot action completed"
        );
        self.mark_completed(stored, action).await
    }

    /// Mark this action's ledger entry completed. Must only run once the
    /// spec field no longer requests the action.
    async fn mark_completed(
        &self,
        mut db: H2Database,
        action: Action,
    ) -> ReconcileResult<H2Database> {
        let mut status = db.status_or_default();
        match action.ledger_mut(&mut status) {
            Some(record) if !record.completed => record.completed = true,
            _ => return Ok(db),
        }
        db.status = Some(status);
        let stored = self.store.replace_database_status(&db).await.inspect_err(|e| {
            error!(action = action.name(), error = %e, "failed to mark one-shot action completed");
        })?;
        Ok(stored)
    }
}
