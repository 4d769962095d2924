use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Secret};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;

use super::{ClusterStore, StoreError, StoreResult};
use crate::crd::AccessPoint;

/// [`ClusterStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn access_points(&self) -> Api<AccessPoint> {
        Api::all(self.client.clone())
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn classify(kind: &'static str, name: &str, err: kube::Error) -> StoreError {
    if let kube::Error::Api(response) = &err {
        let name = name.to_string();
        match response.code {
            404 => return StoreError::NotFound { kind, name },
            409 if response.reason == "AlreadyExists" => {
                return StoreError::AlreadyExists { kind, name };
            }
            409 => return StoreError::Conflict { kind, name },
            _ => {}
        }
    }
    StoreError::Api(err)
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_node(&self, name: &str) -> StoreResult<Option<Node>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        nodes.get_opt(name).await.map_err(|err| classify("Node", name, err))
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> StoreResult<ConfigMap> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        config_maps
            .get(name)
            .await
            .map_err(|err| classify("ConfigMap", name, err))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> StoreResult<Secret> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets
            .get(name)
            .await
            .map_err(|err| classify("Secret", name, err))
    }

    async fn get_access_point(&self, name: &str) -> StoreResult<Option<AccessPoint>> {
        self.access_points()
            .get_opt(name)
            .await
            .map_err(|err| classify("AccessPoint", name, err))
    }

    async fn create_access_point(&self, access_point: &AccessPoint) -> StoreResult<AccessPoint> {
        let name = access_point
            .metadata
            .name
            .as_deref()
            .ok_or(StoreError::MissingName("AccessPoint"))?;
        self.access_points()
            .create(&PostParams::default(), access_point)
            .await
            .map_err(|err| classify("AccessPoint", name, err))
    }

    async fn replace_access_point_status(
        &self,
        access_point: &AccessPoint,
    ) -> StoreResult<AccessPoint> {
        let name = access_point
            .metadata
            .name
            .as_deref()
            .ok_or(StoreError::MissingName("AccessPoint"))?;
        let mut patch = json!({ "status": access_point.status });
        // The API server rejects the patch with 409 once the version moved on.
        if let Some(version) = &access_point.metadata.resource_version {
            patch["metadata"] = json!({ "resourceVersion": version });
        }
        self.access_points()
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| classify("AccessPoint", name, err))
    }

    async fn get_job(&self, namespace: &str, name: &str) -> StoreResult<Option<Job>> {
        self.jobs(namespace)
            .get_opt(name)
            .await
            .map_err(|err| classify("Job", name, err))
    }

    async fn create_job(&self, job: &Job) -> StoreResult<Job> {
        let name = job.metadata.name.as_deref().ok_or(StoreError::MissingName("Job"))?;
        let namespace = job.metadata.namespace.as_deref().unwrap_or_default();
        self.jobs(namespace)
            .create(&PostParams::default(), job)
            .await
            .map_err(|err| classify("Job", name, err))
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> StoreResult<()> {
        match self.jobs(namespace).delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(err) => match classify("Job", name, err) {
                StoreError::NotFound { .. } => Ok(()),
                other => Err(other),
            },
        }
    }
}
