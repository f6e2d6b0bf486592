//! Cluster Custom Resource Definition
//!
//! Only the fields the teardown logic reads are modelled. The object is owned
//! by the platform; this crate mutates nothing but its finalizers and
//! annotations.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CloudSpec, ClusterNetworkingConfig};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubermatic.k8s.io",
    version = "v1",
    kind = "Cluster",
    plural = "clusters",
    shortname = "cl",
    printcolumn = r#"{"name":"HumanReadableName","type":"string","jsonPath":".spec.humanReadableName"}"#,
    printcolumn = r#"{"name":"Datacenter","type":"string","jsonPath":".spec.cloud.dc"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub cloud: CloudSpec,

    #[serde(default)]
    pub cluster_network: ClusterNetworkingConfig,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub human_readable_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl Cluster {
    /// Namespace in the seed that hosts the control plane of this cluster
    pub fn seed_namespace(&self) -> String {
        format!(
            "cluster-{}",
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}
