//! Admission webhooks that block re-creation of resources during teardown
//!
//! The webhooks point at an address nothing listens on and fail closed, so
//! every matching CREATE is rejected. Controllers still running in the user
//! cluster (StatefulSets, operators) can then no longer recreate what the
//! teardown deletes.

use std::collections::BTreeMap;

use k8s_openapi::api::admissionregistration::v1::{
    RuleWithOperations, ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use kube::api::ObjectMeta;
use tracing::info;

use crate::client::{typed, ObjectClient};
use crate::error::Result;

pub const VOLUME_PROTECTION_WEBHOOK_NAME: &str = "kubernetes-cluster-cleanup";
const WEBHOOK_NAME: &str = "kubernetes.cluster.cleanup";
const UNREACHABLE_URL: &str = "https://127.0.0.1:1";

fn create_rule(api_group: &str, resources: &[&str]) -> RuleWithOperations {
    RuleWithOperations {
        api_groups: Some(vec![api_group.to_string()]),
        api_versions: Some(vec!["*".to_string()]),
        operations: Some(vec!["CREATE".to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        scope: None,
    }
}

fn terminating_webhook(name: String, rules: Vec<RuleWithOperations>) -> ValidatingWebhookConfiguration {
    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(name),
            annotations: Some(BTreeMap::from([(
                "description".to_string(),
                "Prevents creation of new resources in a cluster that is being terminated"
                    .to_string(),
            )])),
            ..Default::default()
        },
        webhooks: Some(vec![ValidatingWebhook {
            // Must be a domain with at least three segments
            name: WEBHOOK_NAME.to_string(),
            admission_review_versions: vec!["v1".to_string()],
            side_effects: "None".to_string(),
            failure_policy: Some("Fail".to_string()),
            client_config: WebhookClientConfig {
                url: Some(UNREACHABLE_URL.to_string()),
                ..Default::default()
            },
            rules: Some(rules),
            ..Default::default()
        }]),
    }
}

/// Rejects creation of PVs, PVCs and PodDisruptionBudgets
pub fn volume_protection_webhook() -> ValidatingWebhookConfiguration {
    terminating_webhook(
        VOLUME_PROTECTION_WEBHOOK_NAME.to_string(),
        vec![
            create_rule("", &["persistentvolumes", "persistentvolumeclaims"]),
            create_rule("policy", &["poddisruptionbudgets"]),
        ],
    )
}

/// Rejects creation of `resources` in `api_group`
pub fn resource_protection_webhook(
    suffix: &str,
    api_group: &str,
    resources: &[&str],
) -> ValidatingWebhookConfiguration {
    terminating_webhook(
        format!("{VOLUME_PROTECTION_WEBHOOK_NAME}-{suffix}"),
        vec![create_rule(api_group, resources)],
    )
}

/// Create `webhook` unless a configuration of that name already exists
pub(super) async fn ensure_terminating_webhook(
    client: &dyn ObjectClient,
    webhook: &ValidatingWebhookConfiguration,
) -> Result<()> {
    let name = webhook.metadata.name.clone().unwrap_or_default();

    match typed::get::<ValidatingWebhookConfiguration>(client, None, &name).await {
        Ok(_) => return Ok(()),
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            return Err(e.context(format!(
                "failed to check if webhook configuration {name:?} exists"
            )))
        }
    }

    match typed::create(client, webhook).await {
        Ok(_) => {
            info!(webhook = %name, "Created terminating admission webhook");
            Ok(())
        }
        Err(e) if e.is_already_exists() => Ok(()),
        Err(e) => Err(e.context(format!("failed to create webhook configuration {name:?}"))),
    }
}
