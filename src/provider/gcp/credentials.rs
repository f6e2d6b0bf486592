//! GCP service account handling

use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use serde::Deserialize;

use crate::client::{typed, ObjectClient};
use crate::crd::GCPCloudSpec;
use crate::error::{Error, Result, ResultExt};

/// Key of the service account in a referenced credentials Secret
pub const SERVICE_ACCOUNT_SECRET_KEY: &str = "serviceAccount";

/// The parts of a service account JSON key file we use
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Decode a base64 encoded JSON key; the project id is mandatory
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::ConfigError(format!("error decoding service account: {e}")))?;
        let key: ServiceAccountKey = serde_json::from_slice(&raw)
            .map_err(|e| Error::ConfigError(format!("failed unmarshaling service account: {e}")))?;
        if key.project_id.is_empty() {
            return Err(Error::ConfigError("empty project_id".to_string()));
        }
        Ok(key)
    }
}

/// The base64 service account of a cluster, inline or from its credentials Secret
pub async fn service_account_for_cluster(
    seed: &dyn ObjectClient,
    spec: &GCPCloudSpec,
) -> Result<String> {
    if !spec.service_account.is_empty() {
        return Ok(spec.service_account.clone());
    }

    let reference = spec
        .credentials_reference
        .as_ref()
        .ok_or_else(|| Error::ConfigError("no credentials provided".to_string()))?;
    let key = if reference.key.is_empty() {
        SERVICE_ACCOUNT_SECRET_KEY
    } else {
        reference.key.as_str()
    };

    let secret: Secret = typed::get(seed, Some(&reference.namespace), &reference.name)
        .await
        .with_context(|| {
            format!(
                "failed to get credentials secret {}/{}",
                reference.namespace, reference.name
            )
        })?;
    let value = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .ok_or_else(|| {
            Error::ConfigError(format!(
                "secret {}/{} has no {key:?} key",
                reference.namespace, reference.name
            ))
        })?;

    String::from_utf8(value.0.clone())
        .map_err(|e| Error::ConfigError(format!("service account is not valid UTF-8: {e}")))
}
