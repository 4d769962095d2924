use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Secret};
use kube::api::ObjectMeta;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ClusterStore, StoreError, StoreResult};
use crate::crd::AccessPoint;

type NamespacedKey = (String, String);

/// Mutation performed through the [`ClusterStore`] interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    CreateAccessPoint(String),
    UpdateAccessPointStatus(String),
    CreateJob(String),
    DeleteJob(String),
}

/// Store operation that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailPoint {
    GetNode,
    GetConfigMap,
    GetSecret,
    GetAccessPoint,
    CreateAccessPoint,
    UpdateAccessPointStatus,
    GetJob,
    CreateJob,
    DeleteJob,
}

#[derive(Default)]
struct Objects {
    nodes: BTreeMap<String, Node>,
    config_maps: BTreeMap<NamespacedKey, ConfigMap>,
    secrets: BTreeMap<NamespacedKey, Secret>,
    access_points: BTreeMap<String, AccessPoint>,
    jobs: BTreeMap<NamespacedKey, Job>,
    version: u64,
    writes: Vec<StoreWrite>,
    failures: BTreeSet<FailPoint>,
}

impl Objects {
    fn stamp(&mut self, meta: &mut ObjectMeta) {
        self.version += 1;
        meta.resource_version = Some(self.version.to_string());
    }

    fn admit(&mut self, meta: &mut ObjectMeta) {
        meta.uid = Some(Uuid::new_v4().to_string());
        self.stamp(meta);
    }

    fn check(&mut self, point: FailPoint) -> StoreResult<()> {
        if self.failures.remove(&point) {
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    /// Remove everything transitively owned by `owner_uid`.
    fn collect_garbage(&mut self, owner_uid: String) {
        let mut pending = vec![owner_uid];
        while let Some(uid) = pending.pop() {
            let owned_by = |meta: &ObjectMeta| {
                meta.owner_references
                    .iter()
                    .flatten()
                    .any(|owner| owner.uid == uid)
            };
            let access_points: Vec<String> = self
                .access_points
                .iter()
                .filter(|(_, ap)| owned_by(&ap.metadata))
                .map(|(name, _)| name.clone())
                .collect();
            let jobs: Vec<NamespacedKey> = self
                .jobs
                .iter()
                .filter(|(_, job)| owned_by(&job.metadata))
                .map(|(key, _)| key.clone())
                .collect();
            for name in access_points {
                if let Some(ap) = self.access_points.remove(&name) {
                    pending.extend(ap.metadata.uid);
                }
            }
            for key in jobs {
                if let Some(job) = self.jobs.remove(&key) {
                    pending.extend(job.metadata.uid);
                }
            }
        }
    }
}

fn namespaced_key(meta: &ObjectMeta) -> NamespacedKey {
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

/// In-process [`ClusterStore`].
///
/// Objects get a fresh uid on creation and a new resource version on every write.
/// Deleting an object removes everything that names it as owner, and status writes
/// carrying a stale resource version are rejected with [`StoreError::Conflict`].
#[derive(Clone, Default)]
pub struct MemStore {
    objects: Arc<Mutex<Objects>>,
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.objects.try_lock() {
            Ok(objects) => f
                .debug_struct("MemStore")
                .field("nodes", &objects.nodes.len())
                .field("access_points", &objects.access_points.len())
                .field("jobs", &objects.jobs.len())
                .finish(),
            Err(_) => f.debug_struct("MemStore").finish_non_exhaustive(),
        }
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node. A replaced node keeps its uid so its dependents
    /// stay attached.
    pub async fn put_node(&self, mut node: Node) -> Node {
        let mut objects = self.objects.lock().await;
        let name = node.metadata.name.clone().unwrap_or_default();
        match objects.nodes.get(&name).and_then(|n| n.metadata.uid.clone()) {
            Some(uid) => {
                node.metadata.uid = Some(uid);
                objects.stamp(&mut node.metadata);
            }
            None => objects.admit(&mut node.metadata),
        }
        objects.nodes.insert(name, node.clone());
        node
    }

    /// Delete a node and cascade to everything it owns.
    pub async fn delete_node(&self, name: &str) -> bool {
        let mut objects = self.objects.lock().await;
        match objects.nodes.remove(name) {
            Some(node) => {
                if let Some(uid) = node.metadata.uid {
                    objects.collect_garbage(uid);
                }
                true
            }
            None => false,
        }
    }

    pub async fn put_config_map(&self, mut config_map: ConfigMap) -> ConfigMap {
        let mut objects = self.objects.lock().await;
        objects.admit(&mut config_map.metadata);
        objects
            .config_maps
            .insert(namespaced_key(&config_map.metadata), config_map.clone());
        config_map
    }

    pub async fn put_secret(&self, mut secret: Secret) -> Secret {
        let mut objects = self.objects.lock().await;
        objects.admit(&mut secret.metadata);
        objects
            .secrets
            .insert(namespaced_key(&secret.metadata), secret.clone());
        secret
    }

    /// Remove a job out of band, as its TTL controller would.
    pub async fn expire_job(&self, namespace: &str, name: &str) -> bool {
        let mut objects = self.objects.lock().await;
        objects
            .jobs
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some()
    }

    pub async fn access_point(&self, name: &str) -> Option<AccessPoint> {
        self.objects.lock().await.access_points.get(name).cloned()
    }

    pub async fn job(&self, namespace: &str, name: &str) -> Option<Job> {
        self.objects
            .lock()
            .await
            .jobs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn job_count(&self) -> usize {
        self.objects.lock().await.jobs.len()
    }

    /// Drain the mutations recorded since the last call.
    pub async fn take_writes(&self) -> Vec<StoreWrite> {
        std::mem::take(&mut self.objects.lock().await.writes)
    }

    /// Make the next call of `point` fail with [`StoreError::Unavailable`].
    pub async fn fail_once(&self, point: FailPoint) {
        self.objects.lock().await.failures.insert(point);
    }
}

#[async_trait]
impl ClusterStore for MemStore {
    async fn get_node(&self, name: &str) -> StoreResult<Option<Node>> {
        let mut objects = self.objects.lock().await;
        objects.check(FailPoint::GetNode)?;
        Ok(objects.nodes.get(name).cloned())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> StoreResult<ConfigMap> {
        let mut objects = self.objects.lock().await;
        objects.check(FailPoint::GetConfigMap)?;
        objects
            .config_maps
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "ConfigMap",
                name: name.to_string(),
            })
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> StoreResult<Secret> {
        let mut objects = self.objects.lock().await;
        objects.check(FailPoint::GetSecret)?;
        objects
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "Secret",
                name: name.to_string(),
            })
    }

    async fn get_access_point(&self, name: &str) -> StoreResult<Option<AccessPoint>> {
        let mut objects = self.objects.lock().await;
        objects.check(FailPoint::GetAccessPoint)?;
        Ok(objects.access_points.get(name).cloned())
    }

    async fn create_access_point(&self, access_point: &AccessPoint) -> StoreResult<AccessPoint> {
        let mut objects = self.objects.lock().await;
        objects.check(FailPoint::CreateAccessPoint)?;
        let name = access_point
            .metadata
            .name
            .clone()
            .ok_or(StoreError::MissingName("AccessPoint"))?;
        if objects.access_points.contains_key(&name) {
            return Err(StoreError::AlreadyExists {
                kind: "AccessPoint",
                name,
            });
        }
        let mut created = access_point.clone();
        objects.admit(&mut created.metadata);
        objects.access_points.insert(name.clone(), created.clone());
        objects.writes.push(StoreWrite::CreateAccessPoint(name));
        Ok(created)
    }

    async fn replace_access_point_status(
        &self,
        access_point: &AccessPoint,
    ) -> StoreResult<AccessPoint> {
        let mut objects = self.objects.lock().await;
        objects.check(FailPoint::UpdateAccessPointStatus)?;
        let name = access_point
            .metadata
            .name
            .clone()
            .ok_or(StoreError::MissingName("AccessPoint"))?;
        let Some(current) = objects.access_points.get(&name) else {
            return Err(StoreError::NotFound {
                kind: "AccessPoint",
                name,
            });
        };
        let expected = access_point.metadata.resource_version.as_ref();
        if expected.is_some_and(|version| Some(version) != current.metadata.resource_version.as_ref())
        {
            return Err(StoreError::Conflict {
                kind: "AccessPoint",
                name,
            });
        }
        let mut updated = current.clone();
        updated.status = access_point.status.clone();
        objects.stamp(&mut updated.metadata);
        objects.access_points.insert(name.clone(), updated.clone());
        objects.writes.push(StoreWrite::UpdateAccessPointStatus(name));
        Ok(updated)
    }

    async fn get_job(&self, namespace: &str, name: &str) -> StoreResult<Option<Job>> {
        let mut objects = self.objects.lock().await;
        objects.check(FailPoint::GetJob)?;
        Ok(objects
            .jobs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_job(&self, job: &Job) -> StoreResult<Job> {
        let mut objects = self.objects.lock().await;
        objects.check(FailPoint::CreateJob)?;
        if job.metadata.name.is_none() {
            return Err(StoreError::MissingName("Job"));
        }
        let key = namespaced_key(&job.metadata);
        if objects.jobs.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "Job",
                name: key.1,
            });
        }
        let mut created = job.clone();
        objects.admit(&mut created.metadata);
        objects.writes.push(StoreWrite::CreateJob(key.1.clone()));
        objects.jobs.insert(key, created.clone());
        Ok(created)
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> StoreResult<()> {
        let mut objects = self.objects.lock().await;
        objects.check(FailPoint::DeleteJob)?;
        if let Some(job) = objects.jobs.remove(&(namespace.to_string(), name.to_string())) {
            if let Some(uid) = job.metadata.uid {
                objects.collect_garbage(uid);
            }
            objects.writes.push(StoreWrite::DeleteJob(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::AccessPointSpec;
    use kube::Resource;

    fn node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn replaced_node_keeps_its_uid() {
        let store = MemStore::new();
        let first = store.put_node(node("rpi-1")).await;
        let second = store.put_node(node("rpi-1")).await;
        assert!(first.metadata.uid.is_some());
        assert_eq!(first.metadata.uid, second.metadata.uid);
        assert_ne!(first.metadata.resource_version, second.metadata.resource_version);
    }

    #[tokio::test]
    async fn stale_status_write_conflicts() {
        let store = MemStore::new();
        let n = store.put_node(node("rpi-1")).await;
        let ap = AccessPoint::for_node(&n).unwrap();
        let created = store.create_access_point(&ap).await.unwrap();

        let mut first = created.clone();
        first.set_hash("aa".into());
        store.replace_access_point_status(&first).await.unwrap();

        let mut second = created;
        second.set_hash("bb".into());
        let err = store.replace_access_point_status(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        let stored = store.access_point("rpi-1").await.unwrap();
        assert_eq!(stored.stored_hash(), Some("aa"));
    }

    #[tokio::test]
    async fn duplicate_job_is_rejected() {
        let store = MemStore::new();
        let mut job = Job::default();
        job.metadata.name = Some("wifi-job-rpi-1".into());
        job.metadata.namespace = Some("ns".into());
        store.create_job(&job).await.unwrap();
        let err = store.create_job(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { kind: "Job", .. }));
    }

    #[tokio::test]
    async fn deleting_a_node_cascades_through_owners() {
        let store = MemStore::new();
        let n = store.put_node(node("rpi-1")).await;
        let ap = store
            .create_access_point(&AccessPoint::for_node(&n).unwrap())
            .await
            .unwrap();
        let mut job = Job::default();
        job.metadata.name = Some("wifi-job-rpi-1".into());
        job.metadata.namespace = Some("ns".into());
        job.metadata.owner_references = ap.controller_owner_ref(&()).map(|owner| vec![owner]);
        store.create_job(&job).await.unwrap();

        let unrelated = AccessPoint::new("other", AccessPointSpec::default());
        store.create_access_point(&unrelated).await.unwrap();

        assert!(store.delete_node("rpi-1").await);
        assert!(store.access_point("rpi-1").await.is_none());
        assert!(store.job("ns", "wifi-job-rpi-1").await.is_none());
        assert!(store.access_point("other").await.is_some());
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let store = MemStore::new();
        store.fail_once(FailPoint::GetNode).await;
        assert!(matches!(
            store.get_node("rpi-1").await.unwrap_err(),
            StoreError::Unavailable(_)
        ));
        assert!(store.get_node("rpi-1").await.unwrap().is_none());
    }
}
