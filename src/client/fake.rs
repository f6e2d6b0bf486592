//! In-memory [`ObjectClient`] for tests
//!
//! Behaves like a tiny API server: objects get resourceVersions and uids,
//! stale replaces conflict, unregistered kinds fail to list with
//! no-kind-match, and every call is recorded for assertions.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{
    Event, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service,
};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{ApiResource, DynamicObject};
use kube::core::TypeMeta;
use kube::{Resource, ResourceExt};
use serde::Serialize;

use super::typed::{api_resource, to_dynamic};
use super::{ListOptions, ObjectClient};
use crate::crd::{external, Cluster};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    List,
    Create,
    Replace,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// Failure to inject into the next matching calls
#[derive(Clone, Copy, Debug)]
pub enum Failure {
    Conflict,
    Internal,
}

type Key = (String, Option<String>, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, DynamicObject>,
    registered: BTreeSet<String>,
    failures: HashMap<(Op, String), (usize, Failure)>,
    calls: Vec<Call>,
    resource_version: u64,
}

pub struct FakeObjectClient {
    state: Mutex<State>,
    /// When set, deletes only stamp a deletionTimestamp, like objects held by finalizers
    retain_deleted: bool,
}

fn kind_key(resource: &ApiResource) -> String {
    format!("{}/{}", resource.api_version, resource.kind)
}

impl FakeObjectClient {
    /// A store serving the core, apps, policy, admission, Cluster and Machine API kinds
    pub fn new() -> Self {
        let client = Self {
            state: Mutex::new(State::default()),
            retain_deleted: false,
        };
        for resource in [
            api_resource::<Service>(),
            api_resource::<Pod>(),
            api_resource::<PersistentVolume>(),
            api_resource::<PersistentVolumeClaim>(),
            api_resource::<PodDisruptionBudget>(),
            api_resource::<Node>(),
            api_resource::<Event>(),
            api_resource::<Secret>(),
            api_resource::<ValidatingWebhookConfiguration>(),
            api_resource::<Deployment>(),
            api_resource::<ReplicaSet>(),
            api_resource::<StatefulSet>(),
            api_resource::<DaemonSet>(),
            api_resource::<Cluster>(),
            external::machine_deployment(),
            external::machine_set(),
            external::machine(),
        ] {
            client.register(&resource);
        }
        client
    }

    pub fn retaining_deleted(mut self) -> Self {
        self.retain_deleted = true;
        self
    }

    pub fn register(&self, resource: &ApiResource) {
        self.state
            .lock()
            .unwrap()
            .registered
            .insert(kind_key(resource));
    }

    /// Seed a typed object, bypassing call recording
    pub fn add<K>(&self, object: &K)
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let dynamic = to_dynamic(object).expect("object serializes");
        self.add_dynamic(&api_resource::<K>(), dynamic);
    }

    /// Seed a dynamic object, registering its kind
    pub fn add_dynamic(&self, resource: &ApiResource, mut object: DynamicObject) {
        let mut state = self.state.lock().unwrap();
        state.registered.insert(kind_key(resource));
        state.resource_version += 1;
        object.metadata.resource_version = Some(state.resource_version.to_string());
        if object.metadata.uid.is_none() {
            object.metadata.uid = Some(format!("uid-{}", object.name_any()));
        }
        object.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
        let key = (
            kind_key(resource),
            object.metadata.namespace.clone(),
            object.name_any(),
        );
        state.objects.insert(key, object);
    }

    /// Fail the next `times` calls of `op` against `kind`
    pub fn fail(&self, op: Op, kind: &str, times: usize, failure: Failure) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, kind.to_string()), (times, failure));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: Op, kind: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.op == op && c.kind == kind)
            .count()
    }

    /// Names passed to delete calls for `kind`, in call order
    pub fn deleted(&self, kind: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == Op::Delete && c.kind == kind)
            .map(|c| c.name)
            .collect()
    }

    pub fn contains<K>(&self, namespace: Option<&str>, name: &str) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        let key = (
            kind_key(&api_resource::<K>()),
            namespace.map(String::from),
            name.to_string(),
        );
        self.state.lock().unwrap().objects.contains_key(&key)
    }

    pub fn stored<K>(&self, namespace: Option<&str>, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + serde::de::DeserializeOwned,
    {
        let key = (
            kind_key(&api_resource::<K>()),
            namespace.map(String::from),
            name.to_string(),
        );
        let object = self.state.lock().unwrap().objects.get(&key).cloned()?;
        super::typed::from_dynamic(object).ok()
    }

    fn record(&self, state: &mut State, op: Op, resource: &ApiResource, ns: Option<&str>, name: &str) -> Result<()> {
        state.calls.push(Call {
            op,
            kind: resource.kind.clone(),
            namespace: ns.map(String::from),
            name: name.to_string(),
        });
        if let Some((remaining, failure)) = state.failures.get_mut(&(op, resource.kind.clone())) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(match failure {
                    Failure::Conflict => Error::Conflict {
                        kind: resource.kind.clone(),
                        name: name.to_string(),
                        message: "the object has been modified".to_string(),
                    },
                    Failure::Internal => Error::ConfigError("injected failure".to_string()),
                });
            }
        }
        Ok(())
    }
}

/// Evaluate a `a.b=value,c=value` field selector against the object's JSON
fn matches_field_selector(object: &DynamicObject, selector: &str) -> bool {
    let Ok(json) = serde_json::to_value(object) else {
        return false;
    };
    selector.split(',').all(|term| {
        let Some((path, expected)) = term.split_once('=') else {
            return false;
        };
        let expected = expected.trim_start_matches('=');
        let pointer = format!("/{}", path.trim().replace('.', "/"));
        json.pointer(&pointer)
            .and_then(|v| v.as_str())
            .map_or(false, |v| v == expected)
    })
}

#[async_trait]
impl ObjectClient for FakeObjectClient {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, Op::Get, resource, namespace, name)?;
        let key = (kind_key(resource), namespace.map(String::from), name.to_string());
        state.objects.get(&key).cloned().ok_or_else(|| Error::NotFound {
            kind: resource.kind.clone(),
            name: name.to_string(),
        })
    }

    async fn list(
        &self,
        resource: &ApiResource,
        options: &ListOptions,
    ) -> Result<Vec<DynamicObject>> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, Op::List, resource, options.namespace.as_deref(), "")?;
        let kind = kind_key(resource);
        if !state.registered.contains(&kind) {
            return Err(Error::NoKindMatch(resource.kind.clone()));
        }
        Ok(state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| {
                *k == kind
                    && options
                        .namespace
                        .as_ref()
                        .map_or(true, |wanted| ns.as_ref() == Some(wanted))
            })
            .map(|(_, o)| o)
            .filter(|o| {
                options
                    .field_selector
                    .as_deref()
                    .map_or(true, |s| matches_field_selector(o, s))
            })
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = object.name_any();
        {
            let mut state = self.state.lock().unwrap();
            let ns = object.metadata.namespace.clone();
            self.record(&mut state, Op::Create, resource, ns.as_deref(), &name)?;
            let key = (kind_key(resource), ns, name.clone());
            if state.objects.contains_key(&key) {
                return Err(Error::AlreadyExists {
                    kind: resource.kind.clone(),
                    name,
                });
            }
        }
        self.add_dynamic(resource, object.clone());
        let state = self.state.lock().unwrap();
        let key = (kind_key(resource), object.metadata.namespace.clone(), name.clone());
        state.objects.get(&key).cloned().ok_or(Error::NotFound {
            kind: resource.kind.clone(),
            name,
        })
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = object.name_any();
        let mut state = self.state.lock().unwrap();
        let ns = object.metadata.namespace.clone();
        self.record(&mut state, Op::Replace, resource, ns.as_deref(), &name)?;
        let key = (kind_key(resource), ns, name.clone());
        let current_version = match state.objects.get(&key) {
            Some(current) => current.metadata.resource_version.clone(),
            None => {
                return Err(Error::NotFound {
                    kind: resource.kind.clone(),
                    name,
                })
            }
        };
        if object.metadata.resource_version.is_some()
            && object.metadata.resource_version != current_version
        {
            return Err(Error::Conflict {
                kind: resource.kind.clone(),
                name,
                message: "the object has been modified; please apply your changes to the latest version and try again".to_string(),
            });
        }
        state.resource_version += 1;
        let mut updated = object.clone();
        updated.metadata.resource_version = Some(state.resource_version.to_string());
        updated.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
        state.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.record(&mut state, Op::Delete, resource, namespace, name)?;
        let key = (kind_key(resource), namespace.map(String::from), name.to_string());
        let missing = || Error::NotFound {
            kind: resource.kind.clone(),
            name: name.to_string(),
        };
        if self.retain_deleted {
            let object = state.objects.get_mut(&key).ok_or_else(missing)?;
            object.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            Ok(())
        } else {
            state.objects.remove(&key).map(|_| ()).ok_or_else(missing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::typed;
    use kube::api::ObjectMeta;

    fn secret(name: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("kubermatic".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stale_replace_conflicts() {
        let client = FakeObjectClient::new();
        client.add(&secret("a"));

        let first: Secret = typed::get(&client, Some("kubermatic"), "a").await.unwrap();
        let second = first.clone();
        typed::replace(&client, &first).await.unwrap();

        let err = typed::replace(&client, &second).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_no_kind_match() {
        let client = FakeObjectClient::new();
        let err = client
            .list(&external::credentials_request(), &ListOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_no_kind_match());
    }

    #[tokio::test]
    async fn test_field_selector_filters_events() {
        let client = FakeObjectClient::new();
        for (name, uid) in [("e1", "svc-1"), ("e2", "svc-2")] {
            client.add(&Event {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some("default".to_string()),
                    ..Default::default()
                },
                involved_object: k8s_openapi::api::core::v1::ObjectReference {
                    uid: Some(uid.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            });
        }

        let events: Vec<Event> = typed::list(
            &client,
            &ListOptions::default().with_field_selector("involvedObject.uid=svc-2"),
        )
        .await
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.name.as_deref(), Some("e2"));
    }
}
