//! # Managed kinds
//!
//! Every kind an operand reconciles implements [`ManagedResource`]. The trait
//! is the kind-to-merge table: `merge_fields` is the default merge policy for
//! the kind, resolved statically at the call site.

use k8s_openapi::api::admissionregistration::v1::{
    ValidatingWebhook, ValidatingWebhookConfiguration,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Namespace, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use crate::template::Template;

/// A kind the reconcile engine can fetch, merge and write
pub trait ManagedResource:
    Resource<DynamicType = ()>
    + Clone
    + fmt::Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Copies the mutable, kind-specific fields of `desired` into `found`.
    ///
    /// Implementations must leave metadata alone; labels and annotations are
    /// handled by the engine.
    fn merge_fields(desired: &Self, found: &mut Self);

    /// API handle for this kind, scoped to `namespace` when the kind is namespaced.
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;
}

/// Identity of a stored object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceRef {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceRef {
    #[must_use]
    pub fn of<K: ManagedResource>(obj: &K) -> Self {
        Self {
            kind: K::kind(&()).into_owned(),
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Merge that copies nothing beyond labels and annotations.
pub fn merge_nothing<K>(_desired: &K, _found: &mut K) {}

macro_rules! namespaced_api {
    () => {
        fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
            match namespace {
                Some(ns) => Api::namespaced(client, ns),
                None => Api::default_namespaced(client),
            }
        }
    };
}

macro_rules! cluster_api {
    () => {
        fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
            Api::all(client)
        }
    };
}

impl ManagedResource for Namespace {
    fn merge_fields(desired: &Self, found: &mut Self) {
        merge_nothing(desired, found);
    }

    cluster_api!();
}

impl ManagedResource for ServiceAccount {
    fn merge_fields(desired: &Self, found: &mut Self) {
        merge_nothing(desired, found);
    }

    namespaced_api!();
}

impl ManagedResource for Role {
    fn merge_fields(desired: &Self, found: &mut Self) {
        found.rules.clone_from(&desired.rules);
    }

    namespaced_api!();
}

impl ManagedResource for ClusterRole {
    fn merge_fields(desired: &Self, found: &mut Self) {
        found.rules.clone_from(&desired.rules);
    }

    cluster_api!();
}

impl ManagedResource for RoleBinding {
    fn merge_fields(desired: &Self, found: &mut Self) {
        found.subjects.clone_from(&desired.subjects);
        found.role_ref = desired.role_ref.clone();
    }

    namespaced_api!();
}

impl ManagedResource for ClusterRoleBinding {
    fn merge_fields(desired: &Self, found: &mut Self) {
        found.subjects.clone_from(&desired.subjects);
        found.role_ref = desired.role_ref.clone();
    }

    cluster_api!();
}

impl ManagedResource for Service {
    // clusterIP and the other allocated fields stay as the API server set them
    fn merge_fields(desired: &Self, found: &mut Self) {
        let desired_spec = desired.spec.clone().unwrap_or_default();
        let spec = found.spec.get_or_insert_with(Default::default);
        spec.ports = desired_spec.ports;
        spec.selector = desired_spec.selector;
    }

    namespaced_api!();
}

impl ManagedResource for Deployment {
    // Strategy, history limits and pod scheduling policies are left to the API server
    fn merge_fields(desired: &Self, found: &mut Self) {
        let Some(desired_spec) = desired.spec.as_ref() else {
            return;
        };
        let spec = found.spec.get_or_insert_with(Default::default);
        spec.replicas = desired_spec.replicas;
        spec.selector.clone_from(&desired_spec.selector);

        let desired_template = &desired_spec.template;
        let template_meta = spec.template.metadata.get_or_insert_with(Default::default);
        template_meta.labels = desired_template
            .metadata
            .as_ref()
            .and_then(|meta| meta.labels.clone());

        let Some(desired_pod) = desired_template.spec.as_ref() else {
            return;
        };
        let pod = spec.template.spec.get_or_insert_with(Default::default);
        pod.service_account_name.clone_from(&desired_pod.service_account_name);
        pod.volumes.clone_from(&desired_pod.volumes);
        pod.containers = merge_by_name(
            &desired_pod.containers,
            std::mem::take(&mut pod.containers),
            |c| c.name.as_str(),
            merge_container,
        );
    }

    namespaced_api!();
}

impl ManagedResource for ValidatingWebhookConfiguration {
    /// Webhooks are matched by name. The CA bundle injected by the serving
    /// certificate controller and the selector and timeout defaults stay as stored.
    fn merge_fields(desired: &Self, found: &mut Self) {
        let previous = found.webhooks.take().unwrap_or_default();
        found.webhooks = desired.webhooks.as_ref().map(|webhooks| {
            merge_by_name(webhooks, previous, |w| w.name.as_str(), merge_webhook)
        });
    }

    cluster_api!();
}

/// Builds the desired list, reusing the stored entry with the same name so
/// fields this crate does not own survive.
fn merge_by_name<T: Clone>(
    desired: &[T],
    mut found: Vec<T>,
    name: fn(&T) -> &str,
    merge: fn(&T, &mut T),
) -> Vec<T> {
    desired
        .iter()
        .map(|want| match found.iter().position(|have| name(have) == name(want)) {
            Some(index) => {
                let mut have = found.swap_remove(index);
                merge(want, &mut have);
                have
            }
            None => want.clone(),
        })
        .collect()
}

fn merge_container(desired: &Container, found: &mut Container) {
    found.image.clone_from(&desired.image);
    found.image_pull_policy.clone_from(&desired.image_pull_policy);
    found.args.clone_from(&desired.args);
    found.ports.clone_from(&desired.ports);
    found.volume_mounts.clone_from(&desired.volume_mounts);
    found.security_context.clone_from(&desired.security_context);
}

fn merge_webhook(desired: &ValidatingWebhook, found: &mut ValidatingWebhook) {
    found.client_config.service.clone_from(&desired.client_config.service);
    found.rules.clone_from(&desired.rules);
    found.failure_policy.clone_from(&desired.failure_policy);
    found.side_effects.clone_from(&desired.side_effects);
    found
        .admission_review_versions
        .clone_from(&desired.admission_review_versions);
}

impl ManagedResource for Template {
    fn merge_fields(desired: &Self, found: &mut Self) {
        found.objects.clone_from(&desired.objects);
        found.parameters.clone_from(&desired.parameters);
    }

    namespaced_api!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::admissionregistration::v1::WebhookClientConfig;
    use k8s_openapi::api::rbac::v1::{PolicyRule, RoleRef, Subject};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;

    fn rule(verb: &str) -> PolicyRule {
        PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["pods".to_string()]),
            verbs: vec![verb.to_string()],
            ..PolicyRule::default()
        }
    }

    #[test]
    fn resource_ref_formats_scope() {
        let role = Role {
            metadata: ObjectMeta {
                name: Some("view".to_string()),
                namespace: Some("images".to_string()),
                ..ObjectMeta::default()
            },
            ..Role::default()
        };
        assert_eq!(ResourceRef::of(&role).to_string(), "Role images/view");

        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some("images".to_string()),
                ..ObjectMeta::default()
            },
            ..Namespace::default()
        };
        assert_eq!(ResourceRef::of(&ns).to_string(), "Namespace images");
    }

    #[test]
    fn role_merge_replaces_rules_only() {
        let desired = Role {
            rules: Some(vec![rule("get"), rule("list")]),
            ..Role::default()
        };
        let mut found = Role {
            metadata: ObjectMeta {
                resource_version: Some("42".to_string()),
                uid: Some("abc".to_string()),
                ..ObjectMeta::default()
            },
            rules: Some(vec![rule("delete")]),
        };

        Role::merge_fields(&desired, &mut found);

        assert_eq!(found.rules, desired.rules);
        assert_eq!(found.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(found.metadata.uid.as_deref(), Some("abc"));
    }

    #[test]
    fn binding_merge_copies_subjects_and_role_ref() {
        let desired = RoleBinding {
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: "view".to_string(),
            },
            subjects: Some(vec![Subject {
                kind: "Group".to_string(),
                name: "system:authenticated".to_string(),
                api_group: Some("rbac.authorization.k8s.io".to_string()),
                ..Subject::default()
            }]),
            ..RoleBinding::default()
        };
        let mut found = RoleBinding::default();

        RoleBinding::merge_fields(&desired, &mut found);

        assert_eq!(found.role_ref, desired.role_ref);
        assert_eq!(found.subjects, desired.subjects);
    }

    #[test]
    fn webhook_merge_keeps_injected_ca_bundle() {
        let webhook = |ca: Option<&str>| ValidatingWebhook {
            name: "virt-template-admission.kubevirt.io".to_string(),
            client_config: WebhookClientConfig {
                ca_bundle: ca.map(|c| ByteString(c.as_bytes().to_vec())),
                ..WebhookClientConfig::default()
            },
            side_effects: "None".to_string(),
            admission_review_versions: vec!["v1".to_string()],
            ..ValidatingWebhook::default()
        };
        let desired = ValidatingWebhookConfiguration {
            webhooks: Some(vec![webhook(None)]),
            ..ValidatingWebhookConfiguration::default()
        };
        let mut found = ValidatingWebhookConfiguration {
            webhooks: Some(vec![webhook(Some("injected"))]),
            ..ValidatingWebhookConfiguration::default()
        };
        let before = found.clone();

        ValidatingWebhookConfiguration::merge_fields(&desired, &mut found);

        assert_eq!(found, before);
    }

    #[test]
    fn template_merge_leaves_labels_and_message() {
        let mut desired = Template::new("fedora");
        desired.objects = vec![serde_json::json!({ "kind": "VirtualMachine" })];
        desired.message = Some("new".to_string());

        let mut found = Template::new("fedora");
        found.message = Some("old".to_string());

        Template::merge_fields(&desired, &mut found);

        assert_eq!(found.objects, desired.objects);
        assert_eq!(found.message.as_deref(), Some("old"));
    }

    fn deployment(image: &str) -> Deployment {
        use k8s_openapi::api::apps::v1::DeploymentSpec;
        use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};

        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(2),
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "webhook".to_string(),
                            image: Some(image.to_string()),
                            ..Container::default()
                        }],
                        ..PodSpec::default()
                    }),
                },
                ..Default::default()
            }),
            ..Deployment::default()
        }
    }

    /// Fields the API server fills in on admission.
    fn server_defaulted(mut deployment: Deployment) -> Deployment {
        let spec = deployment.spec.as_mut().unwrap();
        spec.revision_history_limit = Some(10);
        spec.progress_deadline_seconds = Some(600);
        let pod = spec.template.spec.as_mut().unwrap();
        pod.restart_policy = Some("Always".to_string());
        pod.dns_policy = Some("ClusterFirst".to_string());
        pod.scheduler_name = Some("default-scheduler".to_string());
        pod.containers[0].termination_message_path = Some("/dev/termination-log".to_string());
        deployment
    }

    #[test]
    fn deployment_merge_keeps_server_defaults() {
        let desired = deployment("validator:v1");
        let mut found = server_defaulted(deployment("validator:v1"));
        let before = found.clone();

        Deployment::merge_fields(&desired, &mut found);

        assert_eq!(found, before);
    }

    #[test]
    fn deployment_merge_rolls_image_only() {
        let desired = deployment("validator:v2");
        let mut found = server_defaulted(deployment("validator:v1"));

        Deployment::merge_fields(&desired, &mut found);

        let spec = found.spec.unwrap();
        assert_eq!(spec.revision_history_limit, Some(10));
        let container = &spec.template.spec.unwrap().containers[0];
        assert_eq!(container.image.as_deref(), Some("validator:v2"));
        assert_eq!(
            container.termination_message_path.as_deref(),
            Some("/dev/termination-log")
        );
    }

    #[test]
    fn webhook_merge_keeps_server_defaults_and_adds_new_hooks() {
        let hook = |name: &str| ValidatingWebhook {
            name: name.to_string(),
            side_effects: "None".to_string(),
            failure_policy: Some("Fail".to_string()),
            admission_review_versions: vec!["v1beta1".to_string()],
            ..ValidatingWebhook::default()
        };
        let mut stored = hook("a.kubevirt.io");
        stored.match_policy = Some("Equivalent".to_string());
        stored.timeout_seconds = Some(10);
        stored.failure_policy = Some("Ignore".to_string());

        let desired = ValidatingWebhookConfiguration {
            webhooks: Some(vec![hook("a.kubevirt.io"), hook("b.kubevirt.io")]),
            ..ValidatingWebhookConfiguration::default()
        };
        let mut found = ValidatingWebhookConfiguration {
            webhooks: Some(vec![stored, hook("stale.kubevirt.io")]),
            ..ValidatingWebhookConfiguration::default()
        };

        ValidatingWebhookConfiguration::merge_fields(&desired, &mut found);

        let hooks = found.webhooks.unwrap();
        let names: Vec<_> = hooks.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["a.kubevirt.io", "b.kubevirt.io"]);
        assert_eq!(hooks[0].failure_policy.as_deref(), Some("Fail"));
        assert_eq!(hooks[0].timeout_seconds, Some(10));
        assert_eq!(hooks[0].match_policy.as_deref(), Some("Equivalent"));
    }
}
