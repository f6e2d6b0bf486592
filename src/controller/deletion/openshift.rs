//! OpenShift operator objects
//!
//! Both kinds only exist on OpenShift user clusters; elsewhere the list fails
//! with no-kind-match and there is nothing to do.

use kube::api::ApiResource;
use tracing::info;

use super::webhook::{ensure_terminating_webhook, resource_protection_webhook};
use super::{delete_all, list_if_served};
use crate::client::{ListOptions, ObjectClient};
use crate::crd::external;
use crate::error::Result;

pub(super) async fn cleanup_image_registry_configs(user: &dyn ObjectClient) -> Result<bool> {
    cleanup_protected(
        user,
        &external::image_registry_config(),
        "imageregistry-configs",
    )
    .await
}

pub(super) async fn cleanup_credentials_requests(user: &dyn ObjectClient) -> Result<bool> {
    cleanup_protected(
        user,
        &external::credentials_request(),
        "credentialsrequests",
    )
    .await
}

/// Block creation of `resource`, then delete all existing objects
async fn cleanup_protected(
    user: &dyn ObjectClient,
    resource: &ApiResource,
    webhook_suffix: &str,
) -> Result<bool> {
    let objects = list_if_served(user, resource, &ListOptions::default()).await?;
    if objects.is_empty() {
        return Ok(false);
    }

    ensure_terminating_webhook(
        user,
        &resource_protection_webhook(webhook_suffix, &resource.group, &[&resource.plural]),
    )
    .await?;

    delete_all(user, resource, &objects).await?;
    info!(kind = %resource.kind, count = objects.len(), "Deleted OpenShift objects");
    Ok(true)
}
