//! # In-memory store
//!
//! Objects are kept as JSON keyed by [`ResourceRef`], with a store-wide
//! `resourceVersion` counter so stale writes fail the same way they do against
//! the API server. Every call is recorded for assertions.

use async_trait::async_trait;
use kube::core::Selector;
use kube::{Resource, ResourceExt};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::debug;

use super::ResourceStore;
use crate::error::{Error, Result};
use crate::kinds::{ManagedResource, ResourceRef};
use crate::labels::selects;

/// A recorded store interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(ResourceRef),
    Create(ResourceRef),
    Replace(ResourceRef),
    Delete(ResourceRef),
    List { kind: String, namespace: String },
}

impl StoreCall {
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StoreCall::Create(_) | StoreCall::Replace(_) | StoreCall::Delete(_)
        )
    }
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ResourceRef, JsonValue>,
    last_version: u64,
    calls: Vec<StoreCall>,
    failing: Vec<StoreCall>,
    racing: BTreeSet<ResourceRef>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }
}

/// [`ResourceStore`] held entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `obj` directly, bypassing call recording and failure injection.
    pub async fn insert<K: ManagedResource>(&self, mut obj: K) -> Result<K> {
        let mut state = self.state.lock().await;
        let key = ResourceRef::of(&obj);
        let version = state.next_version();
        let meta = obj.meta_mut();
        meta.resource_version = Some(version);
        meta.uid.get_or_insert_with(|| format!("uid-{}", key.name));
        state.objects.insert(key, serde_json::to_value(&obj)?);
        Ok(obj)
    }

    /// Reads an object without recording the call.
    pub async fn fetch<K: ManagedResource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>> {
        let state = self.state.lock().await;
        let key = key_for::<K>(namespace, name);
        state
            .objects
            .get(&key)
            .map(|value| serde_json::from_value(value.clone()).map_err(Error::from))
            .transpose()
    }

    /// Makes every matching call fail with an internal server error.
    pub async fn fail_on(&self, call: StoreCall) {
        self.state.lock().await.failing.push(call);
    }

    /// Simulates another writer updating `resource` right after it is read.
    pub async fn race_after_get(&self, resource: ResourceRef) {
        self.state.lock().await.racing.insert(resource);
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn write_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.is_write())
            .count()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.objects.is_empty()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

fn key_for<K: ManagedResource>(namespace: Option<&str>, name: &str) -> ResourceRef {
    ResourceRef {
        kind: K::kind(&()).into_owned(),
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
    }
}

fn injected_failure(call: &StoreCall) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected failure for {call:?}"),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

/// Records `call` and returns the injected failure if one matches.
fn record(state: &mut State, call: StoreCall) -> Result<()> {
    state.calls.push(call.clone());
    if state.failing.contains(&call) {
        return Err(injected_failure(&call));
    }
    Ok(())
}

fn version_of(value: &JsonValue) -> Option<&str> {
    value
        .pointer("/metadata/resourceVersion")
        .and_then(JsonValue::as_str)
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get<K: ManagedResource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>> {
        let mut state = self.state.lock().await;
        let key = key_for::<K>(namespace, name);
        record(&mut state, StoreCall::Get(key.clone()))?;

        let Some(value) = state.objects.get(&key).cloned() else {
            return Ok(None);
        };
        let found: K = serde_json::from_value(value)?;

        if state.racing.remove(&key) {
            let version = state.next_version();
            let mut raced = found.clone();
            raced.meta_mut().resource_version = Some(version);
            raced
                .annotations_mut()
                .insert("racing-writer".to_string(), "true".to_string());
            debug!(resource = %key, "Concurrent write injected after read");
            state.objects.insert(key, serde_json::to_value(&raced)?);
        }

        Ok(Some(found))
    }

    async fn create<K: ManagedResource>(&self, obj: &K) -> Result<K> {
        let mut state = self.state.lock().await;
        let key = ResourceRef::of(obj);
        record(&mut state, StoreCall::Create(key.clone()))?;

        if state.objects.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: key.kind,
                name: key.name,
            });
        }

        let mut created = obj.clone();
        let version = state.next_version();
        let meta = created.meta_mut();
        meta.resource_version = Some(version);
        meta.uid = Some(format!("uid-{}", key.name));
        state.objects.insert(key, serde_json::to_value(&created)?);
        Ok(created)
    }

    async fn replace<K: ManagedResource>(&self, obj: &K) -> Result<K> {
        let mut state = self.state.lock().await;
        let key = ResourceRef::of(obj);
        record(&mut state, StoreCall::Replace(key.clone()))?;

        let Some(current) = state.objects.get(&key) else {
            return Err(Error::NotFound {
                kind: key.kind,
                name: key.name,
            });
        };

        // An absent version is an unconditional write, as on the API server
        if let Some(expected) = obj.resource_version() {
            if version_of(current) != Some(expected.as_str()) {
                return Err(Error::Conflict {
                    kind: key.kind,
                    name: key.name,
                    message: format!(
                        "the object has been modified; expected resourceVersion {expected}"
                    ),
                });
            }
        }

        let mut replaced = obj.clone();
        replaced.meta_mut().resource_version = Some(state.next_version());
        state.objects.insert(key, serde_json::to_value(&replaced)?);
        Ok(replaced)
    }

    async fn delete<K: ManagedResource>(&self, obj: &K) -> Result<()> {
        let mut state = self.state.lock().await;
        let key = ResourceRef::of(obj);
        record(&mut state, StoreCall::Delete(key.clone()))?;

        match state.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound {
                kind: key.kind,
                name: key.name,
            }),
        }
    }

    async fn list<K: ManagedResource>(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<K>> {
        let mut state = self.state.lock().await;
        let kind = K::kind(&()).into_owned();
        record(
            &mut state,
            StoreCall::List {
                kind: kind.clone(),
                namespace: namespace.to_string(),
            },
        )?;

        let mut items = Vec::new();
        for (key, value) in &state.objects {
            if key.kind != kind || key.namespace.as_deref() != Some(namespace) {
                continue;
            }
            let obj: K = serde_json::from_value(value.clone())?;
            if selects(selector, obj.meta().labels.as_ref()) {
                items.push(obj);
            }
        }
        Ok(items)
    }
}
