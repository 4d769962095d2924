//! `AccessPoint` custom resource: one per node, owned by it, recording the fingerprint
//! of the last actuated decision.

use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "wifi.networking.platyplus.io",
    version = "v1alpha1",
    kind = "AccessPoint",
    status = "AccessPointStatus",
    printcolumn = r#"{"name":"Hash","type":"string","jsonPath":".status.hash"}"#
)]
pub struct AccessPointSpec {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AccessPointStatus {
    /// Fingerprint of the inputs last handed to an actuation job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl AccessPoint {
    /// Status object for `node`, named after it and controlled by it so that deleting
    /// the node cascades to the access point.
    pub fn for_node(node: &Node) -> Result<Self, ReconcileError> {
        let name = node
            .metadata
            .name
            .as_deref()
            .ok_or(ReconcileError::MissingField("node metadata.name"))?;
        let owner =
            blocking_owner_ref(node).ok_or(ReconcileError::MissingField("node metadata.uid"))?;
        let mut access_point = AccessPoint::new(name, AccessPointSpec::default());
        access_point.metadata.owner_references = Some(vec![owner]);
        Ok(access_point)
    }

    pub fn stored_hash(&self) -> Option<&str> {
        self.status.as_ref().and_then(|status| status.hash.as_deref())
    }

    pub fn set_hash(&mut self, hash: String) {
        self.status.get_or_insert_with(AccessPointStatus::default).hash = Some(hash);
    }
}

/// Controller reference to `owner` that also holds back foreground deletion of the
/// owner until the dependent is gone. `None` when the owner has no uid yet.
pub fn blocking_owner_ref<K: Resource<DynamicType = ()>>(owner: &K) -> Option<OwnerReference> {
    let mut reference = owner.controller_owner_ref(&())?;
    reference.block_owner_deletion = Some(true);
    Some(reference)
}
