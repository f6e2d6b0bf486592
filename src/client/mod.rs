//! Object store access
//!
//! Every read and write of the seed and user clusters goes through
//! [`ObjectClient`], a thin dynamic-object interface over the Kubernetes API.
//! It distinguishes the error kinds the teardown logic has to branch on
//! (not-found, no-kind-match, already-exists, conflict) and keeps the
//! orchestrator testable against an in-memory store.

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};

use crate::error::Result;

#[cfg(test)]
pub mod fake;
mod kube_client;
pub mod typed;
mod user_cluster;

pub use kube_client::KubeObjectClient;
pub use user_cluster::{KubeconfigClientProvider, UserClusterClientProvider};

/// Options for list calls
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Restrict to one namespace; `None` lists across all namespaces
    pub namespace: Option<String>,
    /// Field selector, e.g. `involvedObject.uid=1234`
    pub field_selector: Option<String>,
}

impl ListOptions {
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn with_field_selector(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }
}

/// Generic Kubernetes object client
///
/// Error contract:
/// - `get`, `replace` and `delete` return [`Error::NotFound`](crate::Error::NotFound) for missing objects
/// - `list` returns [`Error::NoKindMatch`](crate::Error::NoKindMatch) when the kind is not served
/// - `create` returns [`Error::AlreadyExists`](crate::Error::AlreadyExists)
/// - `replace` returns [`Error::Conflict`](crate::Error::Conflict) on a stale resourceVersion
#[async_trait]
pub trait ObjectClient: Send + Sync {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject>;

    async fn list(
        &self,
        resource: &ApiResource,
        options: &ListOptions,
    ) -> Result<Vec<DynamicObject>>;

    async fn create(&self, resource: &ApiResource, object: &DynamicObject)
        -> Result<DynamicObject>;

    /// Full update, guarded by the object's resourceVersion
    async fn replace(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject>;

    async fn delete(&self, resource: &ApiResource, namespace: Option<&str>, name: &str)
        -> Result<()>;
}
