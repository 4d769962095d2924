//! Re-enqueue mapping for watched objects that are not nodes.
//!
//! A change to the settings ConfigMap or Secret can move the decision or the
//! fingerprint of every node, so it fans out to all of them. Passes that find nothing
//! changed are no-ops.

use k8s_openapi::api::core::v1::Node;
use kube::api::ObjectMeta;
use kube::runtime::reflector::{ObjectRef, Store};

use crate::config::OperatorConfig;

/// Whether `meta` names the settings object in the operator's home namespace.
pub fn is_settings_object(meta: &ObjectMeta, config: &OperatorConfig) -> bool {
    meta.name.as_deref() == Some(config.settings_name.as_str())
        && meta.namespace.as_deref().unwrap_or_default() == config.namespace
}

/// One request per node when `changed` is the settings object, none otherwise.
pub fn fan_out<'a>(
    changed: &ObjectMeta,
    nodes: impl IntoIterator<Item = &'a Node>,
    config: &OperatorConfig,
) -> Vec<ObjectRef<Node>> {
    if !is_settings_object(changed, config) {
        return Vec::new();
    }
    nodes
        .into_iter()
        .filter_map(|node| node.metadata.name.as_deref())
        .map(ObjectRef::new)
        .collect()
}

/// [`fan_out`] over the nodes currently held by the controller's reflector cache.
pub fn fan_out_cached(
    changed: &ObjectMeta,
    nodes: &Store<Node>,
    config: &OperatorConfig,
) -> Vec<ObjectRef<Node>> {
    if !is_settings_object(changed, config) {
        return Vec::new();
    }
    let known = nodes.state();
    fan_out(changed, known.iter().map(|node| node.as_ref()), config)
}

/// Map an actuation job back to the node it was created for.
pub fn node_for_job(job: &ObjectMeta, config: &OperatorConfig) -> Option<ObjectRef<Node>> {
    if job.namespace.as_deref().unwrap_or_default() != config.namespace {
        return None;
    }
    job.name
        .as_deref()
        .and_then(|name| config.node_for_job(name))
        .map(ObjectRef::new)
}
