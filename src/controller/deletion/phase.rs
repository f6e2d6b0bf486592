use crate::controller::finalizers::{
    has_any_finalizer, has_finalizer, has_only_finalizer, CREDENTIALS_SECRETS_CLEANUP_FINALIZER,
    IN_CLUSTER_FINALIZERS, NODE_DELETION_FINALIZER,
};
use crate::crd::Cluster;

/// Where a cluster's teardown currently stands, derived from its finalizers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Services, volumes and OpenShift objects inside the user cluster
    InClusterResources,
    /// The machine cascade
    NodeDeletion,
    /// Only the credentials Secret finalizer is left
    CredentialsSecret,
    /// Finalizers owned by other controllers (e.g. cloud providers) remain
    WaitingForOtherFinalizers,
    Done,
}

impl Phase {
    pub fn current(cluster: &Cluster) -> Self {
        if has_any_finalizer(cluster, &IN_CLUSTER_FINALIZERS) {
            Phase::InClusterResources
        } else if has_finalizer(cluster, NODE_DELETION_FINALIZER) {
            Phase::NodeDeletion
        } else if has_only_finalizer(cluster, CREDENTIALS_SECRETS_CLEANUP_FINALIZER) {
            Phase::CredentialsSecret
        } else if cluster.metadata.finalizers.as_ref().map_or(true, Vec::is_empty) {
            Phase::Done
        } else {
            Phase::WaitingForOtherFinalizers
        }
    }
}
