//! Finalizer names and the ledger operations on finalizer lists
//!
//! Every cleanup step owns exactly one finalizer on the Cluster. The finalizer
//! is added when the cluster is created (elsewhere) and removed here only
//! after the step's cleanup is confirmed, so the finalizer list is the single
//! source of truth for how far a teardown has progressed.

use kube::ResourceExt;

/// Guards deletion of LoadBalancer Services in the user cluster
pub const IN_CLUSTER_LB_CLEANUP_FINALIZER: &str = "kubermatic.io/cleanup-in-cluster-lb";
/// Guards deletion of PVs, PVCs and the pods using them
pub const IN_CLUSTER_PV_CLEANUP_FINALIZER: &str = "kubermatic.io/cleanup-in-cluster-pv";
pub const IN_CLUSTER_CREDENTIALS_REQUESTS_CLEANUP_FINALIZER: &str =
    "kubermatic.io/cleanup-credentialsrequests";
pub const IN_CLUSTER_IMAGE_REGISTRY_CONFIG_CLEANUP_FINALIZER: &str =
    "kubermatic.io/cleanup-imageregistry-configs";
/// Guards the MachineDeployment/MachineSet/Machine cascade
pub const NODE_DELETION_FINALIZER: &str = "kubermatic.io/delete-nodes";
/// Guards the provider credentials Secret in the seed
pub const CREDENTIALS_SECRETS_CLEANUP_FINALIZER: &str =
    "kubermatic.io/cleanup-credentials-secrets";

pub const GCP_FIREWALL_SELF_CLEANUP_FINALIZER: &str = "kubermatic.io/cleanup-gcp-firewall-self";
pub const GCP_FIREWALL_ICMP_CLEANUP_FINALIZER: &str = "kubermatic.io/cleanup-gcp-firewall-icmp";
pub const GCP_FIREWALL_NODEPORT_CLEANUP_FINALIZER: &str =
    "kubermatic.io/cleanup-gcp-firewall-nodeport";
pub const GCP_ROUTES_CLEANUP_FINALIZER: &str = "kubermatic.io/cleanup-gcp-routes";

/// The finalizers of the in-cluster phase, removed together
pub const IN_CLUSTER_FINALIZERS: [&str; 4] = [
    IN_CLUSTER_LB_CLEANUP_FINALIZER,
    IN_CLUSTER_PV_CLEANUP_FINALIZER,
    IN_CLUSTER_CREDENTIALS_REQUESTS_CLEANUP_FINALIZER,
    IN_CLUSTER_IMAGE_REGISTRY_CONFIG_CLEANUP_FINALIZER,
];

/// Node annotation telling the node controller to skip draining
pub const SKIP_EVICTION_ANNOTATION: &str = "kubermatic.io/skip-eviction";

pub fn has_finalizer<K: ResourceExt>(object: &K, name: &str) -> bool {
    object.finalizers().iter().any(|f| f == name)
}

pub fn has_any_finalizer<K: ResourceExt>(object: &K, names: &[&str]) -> bool {
    names.iter().any(|name| has_finalizer(object, name))
}

/// `true` when `name` is the one and only finalizer left
pub fn has_only_finalizer<K: ResourceExt>(object: &K, name: &str) -> bool {
    matches!(object.finalizers(), [only] if only == name)
}

/// Append `name` unless it is already present
pub fn add_finalizer<K: ResourceExt>(object: &mut K, name: &str) {
    if !has_finalizer(object, name) {
        object.finalizers_mut().push(name.to_string());
    }
}

/// Remove the first exact match of each name, keeping the rest in order
pub fn remove_finalizers<K: ResourceExt>(object: &mut K, names: &[&str]) {
    remove_from_list(object.finalizers_mut(), names);
}

pub fn remove_finalizer<K: ResourceExt>(object: &mut K, name: &str) {
    remove_finalizers(object, &[name]);
}

fn remove_from_list(list: &mut Vec<String>, names: &[&str]) {
    for name in names {
        if let Some(pos) = list.iter().position(|f| f.as_str() == *name) {
            list.remove(pos);
        }
    }
}
