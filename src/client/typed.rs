//! Typed helpers on top of [`ObjectClient`]
//!
//! Objects cross the client boundary as `DynamicObject`s; these helpers do the
//! serde round trip for kinds that have Rust types (k8s-openapi and our CRDs).

use kube::api::{ApiResource, DynamicObject};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ListOptions, ObjectClient};
use crate::error::Result;

/// `ApiResource` of a statically typed kind
pub fn api_resource<K>() -> ApiResource
where
    K: Resource<DynamicType = ()>,
{
    ApiResource::erase::<K>(&())
}

pub fn to_dynamic<K: Serialize>(object: &K) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

pub fn from_dynamic<K: DeserializeOwned>(object: DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

pub async fn get<K>(client: &dyn ObjectClient, namespace: Option<&str>, name: &str) -> Result<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let object = client.get(&api_resource::<K>(), namespace, name).await?;
    from_dynamic(object)
}

pub async fn list<K>(client: &dyn ObjectClient, options: &ListOptions) -> Result<Vec<K>>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    client
        .list(&api_resource::<K>(), options)
        .await?
        .into_iter()
        .map(from_dynamic)
        .collect()
}

pub async fn create<K>(client: &dyn ObjectClient, object: &K) -> Result<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let created = client
        .create(&api_resource::<K>(), &to_dynamic(object)?)
        .await?;
    from_dynamic(created)
}

pub async fn replace<K>(client: &dyn ObjectClient, object: &K) -> Result<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let updated = client
        .replace(&api_resource::<K>(), &to_dynamic(object)?)
        .await?;
    from_dynamic(updated)
}
