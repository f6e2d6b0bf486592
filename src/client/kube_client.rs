//! [`ObjectClient`] backed by a real API server

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::TypeMeta;
use kube::{Client, ResourceExt};
use tracing::debug;

use super::{ListOptions, ObjectClient};
use crate::error::{Error, Result};

#[derive(Clone, Copy)]
enum Verb {
    Get,
    List,
    Create,
    Replace,
    Delete,
}

/// Object client talking to a Kubernetes API server through kube-rs
#[derive(Clone)]
pub struct KubeObjectClient {
    client: Client,
}

impl KubeObjectClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

/// Translate API status codes into the error kinds callers branch on
fn map_error(err: kube::Error, verb: Verb, resource: &ApiResource, name: &str) -> Error {
    let kube::Error::Api(response) = &err else {
        return Error::KubeError(err);
    };
    match (verb, response.code) {
        // A list only 404s when the resource path itself is unknown
        (Verb::List, 404) => Error::NoKindMatch(resource.kind.clone()),
        (Verb::Get | Verb::Replace | Verb::Delete, 404) => Error::NotFound {
            kind: resource.kind.clone(),
            name: name.to_string(),
        },
        (Verb::Create, 409) => Error::AlreadyExists {
            kind: resource.kind.clone(),
            name: name.to_string(),
        },
        (Verb::Replace, 409) => Error::Conflict {
            kind: resource.kind.clone(),
            name: name.to_string(),
            message: response.message.clone(),
        },
        _ => Error::KubeError(err),
    }
}

fn with_type_meta(resource: &ApiResource, object: &DynamicObject) -> DynamicObject {
    let mut object = object.clone();
    if object.types.is_none() {
        object.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    object
}

#[async_trait]
impl ObjectClient for KubeObjectClient {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.api(resource, namespace)
            .get(name)
            .await
            .map_err(|e| map_error(e, Verb::Get, resource, name))
    }

    async fn list(
        &self,
        resource: &ApiResource,
        options: &ListOptions,
    ) -> Result<Vec<DynamicObject>> {
        let mut params = ListParams::default();
        if let Some(selector) = &options.field_selector {
            params = params.fields(selector);
        }
        let list = self
            .api(resource, options.namespace.as_deref())
            .list(&params)
            .await
            .map_err(|e| map_error(e, Verb::List, resource, ""))?;
        debug!(kind = %resource.kind, count = list.items.len(), "Listed objects");
        Ok(list.items)
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = object.name_any();
        self.api(resource, object.metadata.namespace.as_deref())
            .create(&PostParams::default(), &with_type_meta(resource, object))
            .await
            .map_err(|e| map_error(e, Verb::Create, resource, &name))
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = object.name_any();
        self.api(resource, object.metadata.namespace.as_deref())
            .replace(&name, &PostParams::default(), &with_type_meta(resource, object))
            .await
            .map_err(|e| map_error(e, Verb::Replace, resource, &name))
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        self.api(resource, namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_error(e, Verb::Delete, resource, name))?;
        Ok(())
    }
}
