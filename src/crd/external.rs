//! Resource kinds that live in user clusters but have no Rust types here
//!
//! Machine API objects (installed by the machine-controller) and OpenShift
//! operator objects are handled as `DynamicObject`s. Any of them may be
//! missing on a given cluster flavor.

use kube::api::{ApiResource, GroupVersionKind};

pub const MACHINE_API_GROUP: &str = "cluster.k8s.io";
pub const MACHINE_API_VERSION: &str = "v1alpha1";

pub const IMAGE_REGISTRY_GROUP: &str = "imageregistry.operator.openshift.io";
pub const CLOUD_CREDENTIAL_GROUP: &str = "cloudcredential.openshift.io";

fn resource(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
}

pub fn machine_deployment() -> ApiResource {
    resource(
        MACHINE_API_GROUP,
        MACHINE_API_VERSION,
        "MachineDeployment",
        "machinedeployments",
    )
}

pub fn machine_set() -> ApiResource {
    resource(MACHINE_API_GROUP, MACHINE_API_VERSION, "MachineSet", "machinesets")
}

pub fn machine() -> ApiResource {
    resource(MACHINE_API_GROUP, MACHINE_API_VERSION, "Machine", "machines")
}

/// The cluster-scoped `configs.imageregistry.operator.openshift.io` kind
pub fn image_registry_config() -> ApiResource {
    resource(IMAGE_REGISTRY_GROUP, "v1", "Config", "configs")
}

pub fn credentials_request() -> ApiResource {
    resource(
        CLOUD_CREDENTIAL_GROUP,
        "v1",
        "CredentialsRequest",
        "credentialsrequests",
    )
}
