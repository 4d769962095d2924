//! Per-node reconciliation pass.
//!
//! A pass moves a node through `NoStatusObject -> UpToDate <-> StaleJobPresent`:
//! it makes sure the node's `AccessPoint` exists, fingerprints the decision inputs and,
//! on drift, replaces the node's actuation job. The fingerprint is committed only after
//! the job was created, so a pass interrupted in between is redone by the next one.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Node;
use tracing::{debug, info, instrument};

use crate::config::OperatorConfig;
use crate::crd::{AccessPoint, blocking_owner_ref};
use crate::error::ReconcileError;
use crate::fingerprint::{DecisionInputs, Fingerprint};
use crate::job::build_job;
use crate::policy::resolve_activation;
use crate::store::ClusterStore;

/// What a completed pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The node is gone; its dependents are left to owner-reference cascading.
    NodeGone,
    /// The stored fingerprint matches, nothing was written.
    UpToDate,
    /// A job from an older decision was deleted; the pass must run again shortly.
    StaleJobDeleted { job: String },
    /// A new job was created and its fingerprint committed.
    JobCreated { job: String, fingerprint: Fingerprint },
}

impl PassOutcome {
    /// Delay before the same node must be reconciled again, if any.
    pub fn requeue_after(&self, config: &OperatorConfig) -> Option<Duration> {
        match self {
            PassOutcome::StaleJobDeleted { .. } => Some(config.stale_job_retry),
            _ => None,
        }
    }
}

pub struct Reconciler<S> {
    store: Arc<S>,
    config: Arc<OperatorConfig>,
}

impl<S> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: ClusterStore> Reconciler<S> {
    pub fn new(store: Arc<S>, config: Arc<OperatorConfig>) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one pass bounded by `config.pass_timeout`. Dropping the pass on timeout
    /// cancels the in-flight store call; no object is ever created without its owner.
    pub async fn reconcile_with_deadline(
        &self,
        node_name: &str,
    ) -> Result<PassOutcome, ReconcileError> {
        let deadline = self.config.pass_timeout;
        tokio::time::timeout(deadline, self.reconcile_node(node_name))
            .await
            .map_err(|_| ReconcileError::DeadlineExceeded(deadline))?
    }

    #[instrument(skip_all, fields(node = %node_name))]
    pub async fn reconcile_node(&self, node_name: &str) -> Result<PassOutcome, ReconcileError> {
        let config = &self.config;
        let settings = self
            .store
            .get_config_map(&config.namespace, &config.settings_name)
            .await?;
        let secret = self
            .store
            .get_secret(&config.namespace, &config.settings_name)
            .await?;

        let Some(node) = self.store.get_node(node_name).await? else {
            debug!("node no longer exists");
            return Ok(PassOutcome::NodeGone);
        };

        let activate = resolve_activation(settings.data.as_ref(), node.metadata.labels.as_ref())?;
        let mut access_point = self.ensure_access_point(&node).await?;

        let fingerprint = DecisionInputs {
            boot_id: boot_id(&node),
            activate,
            config: settings.data.as_ref(),
            secret: secret.data.as_ref(),
        }
        .fingerprint()?;
        if fingerprint.matches(access_point.stored_hash()) {
            info!("access point already up to date");
            return Ok(PassOutcome::UpToDate);
        }

        let job_name = config.job_name(node_name);
        if self.store.get_job(&config.namespace, &job_name).await?.is_some() {
            self.store.delete_job(&config.namespace, &job_name).await?;
            info!(job = %job_name, "deleted stale job, retrying once it is gone");
            return Ok(PassOutcome::StaleJobDeleted { job: job_name });
        }

        let owner = blocking_owner_ref(&access_point)
            .ok_or(ReconcileError::MissingField("access point metadata.uid"))?;
        let job = build_job(config, node_name, activate, owner);
        self.store.create_job(&job).await?;
        info!(job = %job_name, activate, %fingerprint, "created actuation job");

        access_point.set_hash(fingerprint.to_hex());
        self.store.replace_access_point_status(&access_point).await?;
        Ok(PassOutcome::JobCreated {
            job: job_name,
            fingerprint,
        })
    }

    async fn ensure_access_point(&self, node: &Node) -> Result<AccessPoint, ReconcileError> {
        let name = node
            .metadata
            .name
            .as_deref()
            .ok_or(ReconcileError::MissingField("node metadata.name"))?;
        if let Some(existing) = self.store.get_access_point(name).await? {
            return Ok(existing);
        }
        let created = self
            .store
            .create_access_point(&AccessPoint::for_node(node)?)
            .await?;
        info!("access point created");
        Ok(created)
    }
}

fn boot_id(node: &Node) -> &str {
    node.status
        .as_ref()
        .and_then(|status| status.node_info.as_ref())
        .map(|info| info.boot_id.as_str())
        .unwrap_or_default()
}
