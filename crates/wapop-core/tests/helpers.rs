//! Shared builders for the integration tests.
//!
//! Each integration test compiles this module separately, so some helpers may look
//! unused from one file or another.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Node, NodeStatus, NodeSystemInfo, Secret};
use kube::api::ObjectMeta;
use wapop_core::{MemStore, OperatorConfig, Reconciler};

pub const NAMESPACE: &str = "wapop-system";

pub fn config() -> OperatorConfig {
    OperatorConfig::for_namespace(NAMESPACE)
}

pub fn node(name: &str, labels: &[(&str, &str)], boot_id: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.into()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        status: Some(NodeStatus {
            node_info: Some(NodeSystemInfo {
                boot_id: boot_id.into(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn settings(data: &[(&str, &str)]) -> ConfigMap {
    settings_named("wifi-settings", NAMESPACE, data)
}

pub fn settings_named(name: &str, namespace: &str, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn secret(data: &[(&str, &[u8])]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("wifi-settings".into()),
            namespace: Some(NAMESPACE.into()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
                .collect::<BTreeMap<_, _>>(),
        ),
        ..Default::default()
    }
}

/// Store seeded with default settings and the given nodes, plus a reconciler over it.
pub async fn world(nodes: Vec<Node>) -> (Arc<MemStore>, Reconciler<MemStore>) {
    let store = Arc::new(MemStore::new());
    store
        .put_config_map(settings(&[("ssid", "platyplus")]))
        .await;
    store
        .put_secret(secret(&[("password", b"correct horse")]))
        .await;
    for n in nodes {
        store.put_node(n).await;
    }
    let reconciler = Reconciler::new(store.clone(), Arc::new(config()));
    (store, reconciler)
}
