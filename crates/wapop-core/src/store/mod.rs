//! Object store seam.
//!
//! The reconciler only talks to the cluster through [`ClusterStore`]. [`KubeStore`] backs
//! it with the Kubernetes API, [`MemStore`] keeps everything in process and provides the
//! owner-reference cascade and compare-and-swap status writes itself.

mod kube_store;
mod mem_store;

pub use kube_store::KubeStore;
pub use mem_store::{FailPoint, MemStore, StoreWrite};

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Secret};

use crate::crd::AccessPoint;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// `None` when the node no longer exists.
    async fn get_node(&self, name: &str) -> StoreResult<Option<Node>>;
    async fn get_config_map(&self, namespace: &str, name: &str) -> StoreResult<ConfigMap>;
    async fn get_secret(&self, namespace: &str, name: &str) -> StoreResult<Secret>;

    async fn get_access_point(&self, name: &str) -> StoreResult<Option<AccessPoint>>;
    /// Create the access point with the owner references it carries.
    async fn create_access_point(&self, access_point: &AccessPoint) -> StoreResult<AccessPoint>;
    /// Write `access_point.status`, rejected with [`StoreError::Conflict`] when its
    /// resource version is no longer current.
    async fn replace_access_point_status(
        &self,
        access_point: &AccessPoint,
    ) -> StoreResult<AccessPoint>;

    async fn get_job(&self, namespace: &str, name: &str) -> StoreResult<Option<Job>>;
    async fn create_job(&self, job: &Job) -> StoreResult<Job>;
    /// Delete a job and its pods. Deleting an absent job succeeds.
    async fn delete_job(&self, namespace: &str, name: &str) -> StoreResult<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },
    #[error("conflicting write to {kind} '{name}'")]
    Conflict { kind: &'static str, name: String },
    #[error("{0} has no metadata.name")]
    MissingName(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
