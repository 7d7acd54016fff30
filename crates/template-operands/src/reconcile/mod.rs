//! # Create-or-update engine
//!
//! [`reconcile_one`] fetches the stored object, creates it when absent, and
//! otherwise merges the desired fields into the stored copy and writes it back
//! only when something changed. The write carries the resourceVersion of the
//! fetch made in the same call, so a concurrent change surfaces as a conflict
//! instead of being overwritten.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::fmt;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::kinds::{ManagedResource, ResourceRef};
use crate::labels::AppLabels;
use crate::store::ResourceStore;

mod aggregate;
mod cleanup;

pub use aggregate::{collect_resource_status, ReconcileOp, StatusReport};
pub use cleanup::{delete_all, DeleteTarget};

/// Kind-specific merge: copy mutable fields from desired (first) into found (second)
pub type MergeFn<K> = fn(&K, &mut K);

/// Everything one reconcile call needs
pub struct ReconcileSpec<K> {
    pub object: K,
    pub labels: AppLabels,
    pub merge: MergeFn<K>,
}

impl<K: ManagedResource> ReconcileSpec<K> {
    /// Uses the kind's default merge policy.
    #[must_use]
    pub fn new(object: K, labels: AppLabels) -> Self {
        Self {
            object,
            labels,
            merge: K::merge_fields,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Created => "Created",
            Outcome::Updated => "Updated",
            Outcome::Unchanged => "Unchanged",
        };
        f.write_str(s)
    }
}

/// Result of reconciling a single object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStatus {
    pub resource: ResourceRef,
    pub outcome: Option<Outcome>,
    pub error: Option<String>,
}

impl ResourceStatus {
    #[must_use]
    pub fn applied(resource: ResourceRef, outcome: Outcome) -> Self {
        Self {
            resource,
            outcome: Some(outcome),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(resource: ResourceRef, err: &Error) -> Self {
        Self {
            resource,
            outcome: None,
            error: Some(err.to_string()),
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.outcome, &self.error) {
            (Some(outcome), _) => write!(f, "{}: {outcome}", self.resource),
            (None, Some(err)) => write!(f, "{}: failed: {err}", self.resource),
            (None, None) => write!(f, "{}: unknown", self.resource),
        }
    }
}

/// Creates `spec.object` or brings the stored copy in line with it.
#[instrument(skip_all, fields(resource = %ResourceRef::of(&spec.object)))]
pub async fn reconcile_one<S, K>(store: &S, spec: ReconcileSpec<K>) -> Result<ResourceStatus>
where
    S: ResourceStore,
    K: ManagedResource,
{
    let ReconcileSpec {
        object: mut desired,
        labels,
        merge,
    } = spec;
    let resource = ResourceRef::of(&desired);

    let found = store
        .get::<K>(resource.namespace.as_deref(), &resource.name)
        .await?;

    let Some(found) = found else {
        let meta = desired.meta_mut();
        labels.apply(&mut meta.labels);
        clear_server_fields(meta);
        store.create(&desired).await?;
        info!("Created {}", resource);
        return Ok(ResourceStatus::applied(resource, Outcome::Created));
    };

    let mut merged = found.clone();
    copy_labels_and_annotations(desired.meta(), merged.meta_mut());
    merge(&desired, &mut merged);
    restore_system_fields(found.meta(), merged.meta_mut());
    labels.apply(&mut merged.meta_mut().labels);

    if merged == found {
        debug!("{} is up to date", resource);
        return Ok(ResourceStatus::applied(resource, Outcome::Unchanged));
    }

    store.replace(&merged).await?;
    info!("Updated {}", resource);
    Ok(ResourceStatus::applied(resource, Outcome::Updated))
}

/// Desired labels and annotations are added; unrelated keys on the stored
/// object are kept.
fn copy_labels_and_annotations(desired: &ObjectMeta, found: &mut ObjectMeta) {
    if let Some(labels) = &desired.labels {
        found
            .labels
            .get_or_insert_with(Default::default)
            .extend(labels.clone());
    }
    if let Some(annotations) = &desired.annotations {
        found
            .annotations
            .get_or_insert_with(Default::default)
            .extend(annotations.clone());
    }
}

/// Identity, version token and timestamps belong to the API server.
fn restore_system_fields(original: &ObjectMeta, merged: &mut ObjectMeta) {
    merged.name.clone_from(&original.name);
    merged.namespace.clone_from(&original.namespace);
    merged.uid.clone_from(&original.uid);
    merged.resource_version.clone_from(&original.resource_version);
    merged.generation = original.generation;
    merged.creation_timestamp.clone_from(&original.creation_timestamp);
    merged.deletion_timestamp.clone_from(&original.deletion_timestamp);
    merged.managed_fields.clone_from(&original.managed_fields);
}

/// Objects built from listed or bundled copies may carry stale server fields.
fn clear_server_fields(meta: &mut ObjectMeta) {
    meta.uid = None;
    meta.resource_version = None;
    meta.generation = None;
    meta.creation_timestamp = None;
    meta.managed_fields = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{APP_COMPONENT_LABEL, APP_NAME_LABEL};
    use crate::store::{MemoryStore, StoreCall};
    use k8s_openapi::api::rbac::v1::{PolicyRule, Role};
    use std::collections::BTreeMap;

    fn app() -> AppLabels {
        AppLabels::new("common-templates", "templating")
    }

    fn view_role(verbs: &[&str]) -> Role {
        Role {
            metadata: ObjectMeta {
                name: Some("os-images.kubevirt.io:view".to_string()),
                namespace: Some("kubevirt-os-images".to_string()),
                ..ObjectMeta::default()
            },
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec!["cdi.kubevirt.io".to_string()]),
                resources: Some(vec!["datavolumes".to_string()]),
                verbs: verbs.iter().map(ToString::to_string).collect(),
                ..PolicyRule::default()
            }]),
        }
    }

    async fn stored(store: &MemoryStore) -> Role {
        store
            .fetch::<Role>(Some("kubevirt-os-images"), "os-images.kubevirt.io:view")
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn second_call_is_unchanged_without_a_write() {
        let store = MemoryStore::new();

        let first = reconcile_one(&store, ReconcileSpec::new(view_role(&["get"]), app()))
            .await
            .unwrap();
        let writes_after_first = store.write_count().await;
        let second = reconcile_one(&store, ReconcileSpec::new(view_role(&["get"]), app()))
            .await
            .unwrap();

        assert_eq!(first.outcome, Some(Outcome::Created));
        assert_eq!(second.outcome, Some(Outcome::Unchanged));
        assert_eq!(writes_after_first, 1);
        assert_eq!(store.write_count().await, 1);
    }

    #[tokio::test]
    async fn changed_fields_are_written_back() {
        let store = MemoryStore::new();
        store.insert(view_role(&["get"])).await.unwrap();

        let status = reconcile_one(&store, ReconcileSpec::new(view_role(&["get", "list"]), app()))
            .await
            .unwrap();

        assert_eq!(status.outcome, Some(Outcome::Updated));
        assert_eq!(stored(&store).await.rules.unwrap()[0].verbs, vec!["get", "list"]);
    }

    #[tokio::test]
    async fn managed_labels_survive_a_partial_merge() {
        let store = MemoryStore::new();
        let mut existing = view_role(&["get"]);
        existing.metadata.labels = Some(BTreeMap::from([(
            "team".to_string(),
            "virt".to_string(),
        )]));
        store.insert(existing).await.unwrap();

        fn rules_only(desired: &Role, found: &mut Role) {
            found.rules.clone_from(&desired.rules);
            found.metadata.labels = None;
        }

        let spec = ReconcileSpec {
            object: view_role(&["get"]),
            labels: app(),
            merge: rules_only,
        };
        reconcile_one(&store, spec).await.unwrap();

        let labels = stored(&store).await.metadata.labels.unwrap();
        assert_eq!(labels.get(APP_NAME_LABEL).map(String::as_str), Some("common-templates"));
        assert_eq!(labels.get(APP_COMPONENT_LABEL).map(String::as_str), Some("templating"));
    }

    #[tokio::test]
    async fn merge_cannot_rewrite_system_metadata() {
        let store = MemoryStore::new();
        let inserted = store.insert(view_role(&["get"])).await.unwrap();

        fn vandal(desired: &Role, found: &mut Role) {
            found.rules.clone_from(&desired.rules);
            found.metadata.uid = Some("forged".to_string());
            found.metadata.resource_version = Some("0".to_string());
        }

        let spec = ReconcileSpec {
            object: view_role(&["watch"]),
            labels: app(),
            merge: vandal,
        };
        let status = reconcile_one(&store, spec).await.unwrap();

        assert_eq!(status.outcome, Some(Outcome::Updated));
        assert_eq!(stored(&store).await.metadata.uid, inserted.metadata.uid);
    }

    #[tokio::test]
    async fn concurrent_write_between_fetch_and_update_is_a_conflict() {
        let store = MemoryStore::new();
        store.insert(view_role(&["get"])).await.unwrap();
        store
            .race_after_get(ResourceRef::of(&view_role(&[])))
            .await;

        let err = reconcile_one(&store, ReconcileSpec::new(view_role(&["list"]), app()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Conflict { .. }));
        let current = stored(&store).await;
        assert_eq!(current.rules.unwrap()[0].verbs, vec!["get"]);
        assert!(current.metadata.annotations.unwrap().contains_key("racing-writer"));
    }

    #[tokio::test]
    async fn store_errors_surface_untouched() {
        let store = MemoryStore::new();
        let role = view_role(&["get"]);
        store
            .fail_on(StoreCall::Get(ResourceRef::of(&role)))
            .await;

        let err = reconcile_one(&store, ReconcileSpec::new(role, app()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Kube(kube::Error::Api(ref r)) if r.code == 500));
        assert_eq!(store.write_count().await, 0);
    }

    #[tokio::test]
    async fn create_drops_stale_server_fields() {
        let store = MemoryStore::new();
        let mut role = view_role(&["get"]);
        role.metadata.resource_version = Some("999".to_string());
        role.metadata.uid = Some("from-another-cluster".to_string());

        reconcile_one(&store, ReconcileSpec::new(role, app()))
            .await
            .unwrap();

        let created = stored(&store).await;
        assert_ne!(created.metadata.uid.as_deref(), Some("from-another-cluster"));
        assert!(app().is_applied(created.metadata.labels.as_ref()));
    }
}
