//! Minimal GCP Compute REST client
//!
//! Only the calls needed for teardown: deleting firewall rules, listing and
//! deleting routes. Authentication uses the OAuth2 JWT bearer flow with the
//! service account's private key.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::credentials::ServiceAccountKey;
use crate::error::{Error, Result};

pub const COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";
const COMPUTE_SCOPE: &str = "https://www.googleapis.com/auth/compute";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub name: String,
    #[serde(default)]
    pub dest_range: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub warnings: Vec<RouteWarning>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RouteWarning {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Compute API calls used during teardown, bound to one project
#[async_trait]
pub trait ComputeClient: Send + Sync {
    fn project_id(&self) -> &str;

    async fn delete_firewall(&self, name: &str) -> Result<()>;

    /// All routes matching `filter`, across pages
    async fn list_routes(&self, filter: &str) -> Result<Vec<Route>>;

    async fn delete_route(&self, name: &str) -> Result<()>;
}

/// Creates [`ComputeClient`]s from a base64 encoded service account
#[async_trait]
pub trait ComputeClientFactory: Send + Sync {
    async fn connect(&self, service_account: &str) -> Result<Arc<dyn ComputeClient>>;
}

#[derive(Clone)]
pub struct RestComputeClientFactory {
    http: Client,
    endpoint: String,
}

impl Default for RestComputeClientFactory {
    fn default() -> Self {
        Self::new(COMPUTE_ENDPOINT)
    }
}

impl RestComputeClientFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteList {
    #[serde(default)]
    items: Vec<Route>,
    next_page_token: Option<String>,
}

/// Turn a non-success response into [`Error::GcpError`]
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    Err(Error::GcpError {
        status: status.as_u16(),
        message,
    })
}

async fn fetch_access_token(http: &Client, key: &ServiceAccountKey) -> Result<String> {
    let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
    let now = Utc::now().timestamp();
    let claims = Claims {
        iss: &key.client_email,
        scope: COMPUTE_SCOPE,
        aud: token_uri,
        iat: now,
        exp: now + 3600,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| Error::ConfigError(format!("invalid service account private key: {e}")))?;
    let assertion = jsonwebtoken::encode(&header, &claims, &signing_key)
        .map_err(|e| Error::ConfigError(format!("failed to sign token request: {e}")))?;

    let response = http
        .post(token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT_TYPE), ("assertion", assertion.as_str())])
        .send()
        .await?;
    let token: TokenResponse = check(response).await?.json().await?;
    debug!(client_email = %key.client_email, "Obtained GCP access token");
    Ok(token.access_token)
}

#[async_trait]
impl ComputeClientFactory for RestComputeClientFactory {
    async fn connect(&self, service_account: &str) -> Result<Arc<dyn ComputeClient>> {
        let key = ServiceAccountKey::from_base64(service_account)?;
        let token = fetch_access_token(&self.http, &key).await?;
        Ok(Arc::new(RestComputeClient {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            project_id: key.project_id,
            token,
        }))
    }
}

pub struct RestComputeClient {
    http: Client,
    endpoint: String,
    project_id: String,
    token: String,
}

impl RestComputeClient {
    fn url(&self, path: &str) -> String {
        format!("{}/projects/{}/global/{path}", self.endpoint, self.project_id)
    }
}

#[async_trait]
impl ComputeClient for RestComputeClient {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn delete_firewall(&self, name: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("firewalls/{name}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn list_routes(&self, filter: &str) -> Result<Vec<Route>> {
        let mut routes = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("filter", filter.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let response = self
                .http
                .get(self.url("routes"))
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await?;
            let page: RouteList = check(response).await?.json().await?;
            routes.extend(page.items);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(routes),
            }
        }
    }

    async fn delete_route(&self, name: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("routes/{name}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
