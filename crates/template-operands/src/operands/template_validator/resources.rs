//! Objects for the kubevirt-template-validator admission webhook (v0.7.0).

use k8s_openapi::api::admissionregistration::v1::{
    RuleWithOperations, ServiceReference, ValidatingWebhook, ValidatingWebhookConfiguration,
    WebhookClientConfig,
};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, SecretVolumeSource, SecurityContext,
    Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

pub const CONTAINER_PORT: i32 = 8443;
pub const KUBEVIRT_IO: &str = "kubevirt.io";
pub const SECRET_NAME: &str = "virt-template-validator-certs";
pub const VIRT_TEMPLATE_VALIDATOR: &str = "virt-template-validator";
pub const CLUSTER_ROLE_NAME: &str = "template:view";
pub const CLUSTER_ROLE_BINDING_NAME: &str = "template-validator";
pub const WEBHOOK_NAME: &str = VIRT_TEMPLATE_VALIDATOR;
pub const SERVICE_ACCOUNT_NAME: &str = "template-validator";
pub const SERVICE_NAME: &str = VIRT_TEMPLATE_VALIDATOR;
pub const DEPLOYMENT_NAME: &str = VIRT_TEMPLATE_VALIDATOR;

const WEBHOOK_PATH: &str = "/virtualmachine-template-validate";
const CERT_MOUNT_PATH: &str = "/etc/webhook/certs";
const TLS_VOLUME: &str = "tls";
/// 0644, the mode the API server fills in for secret volumes
const DEFAULT_SECRET_MODE: i32 = 420;

/// KubeVirt API versions the webhook intercepts
const SUPPORTED_WEBHOOK_VERSIONS: [&str; 2] = ["v1alpha3", "v1"];

fn common_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(KUBEVIRT_IO.to_string(), VIRT_TEMPLATE_VALIDATOR.to_string())])
}

fn meta(name: &str, namespace: Option<&str>, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(labels),
        ..ObjectMeta::default()
    }
}

pub fn new_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: meta(
            CLUSTER_ROLE_NAME,
            None,
            BTreeMap::from([(KUBEVIRT_IO.to_string(), String::new())]),
        ),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["template.openshift.io".to_string()]),
            resources: Some(vec!["templates".to_string()]),
            verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
            ..PolicyRule::default()
        }]),
        ..ClusterRole::default()
    }
}

pub fn new_service_account(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(SERVICE_ACCOUNT_NAME, Some(namespace), common_labels()),
        ..ServiceAccount::default()
    }
}

pub fn new_cluster_role_binding(namespace: &str) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: meta(CLUSTER_ROLE_BINDING_NAME, None, common_labels()),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: CLUSTER_ROLE_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: SERVICE_ACCOUNT_NAME.to_string(),
            namespace: Some(namespace.to_string()),
            api_group: None,
        }]),
    }
}

pub fn new_service(namespace: &str) -> Service {
    let mut metadata = meta(SERVICE_NAME, Some(namespace), common_labels());
    metadata.annotations = Some(BTreeMap::from([(
        "service.beta.openshift.io/serving-cert-secret-name".to_string(),
        SECRET_NAME.to_string(),
    )]));

    Service {
        metadata,
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("webhook".to_string()),
                port: 443,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(CONTAINER_PORT)),
                ..ServicePort::default()
            }]),
            selector: Some(common_labels()),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

pub fn new_deployment(namespace: &str, replicas: i32, image: &str) -> Deployment {
    let container = Container {
        name: "webhook".to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        args: Some(vec![
            "-v=2".to_string(),
            format!("--port={CONTAINER_PORT}"),
            format!("--cert-dir={CERT_MOUNT_PATH}"),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: TLS_VOLUME.to_string(),
            mount_path: CERT_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        }]),
        security_context: Some(SecurityContext {
            read_only_root_filesystem: Some(true),
            ..SecurityContext::default()
        }),
        ports: Some(vec![ContainerPort {
            name: Some("webhook".to_string()),
            container_port: CONTAINER_PORT,
            protocol: Some("TCP".to_string()),
            ..ContainerPort::default()
        }]),
        ..Container::default()
    };

    Deployment {
        metadata: meta(
            DEPLOYMENT_NAME,
            Some(namespace),
            BTreeMap::from([("name".to_string(), VIRT_TEMPLATE_VALIDATOR.to_string())]),
        ),
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(common_labels()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(meta(VIRT_TEMPLATE_VALIDATOR, None, common_labels())),
                spec: Some(PodSpec {
                    service_account_name: Some(SERVICE_ACCOUNT_NAME.to_string()),
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: TLS_VOLUME.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(SECRET_NAME.to_string()),
                            default_mode: Some(DEFAULT_SECRET_MODE),
                            ..SecretVolumeSource::default()
                        }),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        ..Deployment::default()
    }
}

pub fn new_validating_webhook(namespace: &str) -> ValidatingWebhookConfiguration {
    let rules = SUPPORTED_WEBHOOK_VERSIONS
        .iter()
        .map(|version| RuleWithOperations {
            operations: Some(vec!["CREATE".to_string(), "UPDATE".to_string()]),
            api_groups: Some(vec![KUBEVIRT_IO.to_string()]),
            api_versions: Some(vec![(*version).to_string()]),
            resources: Some(vec!["virtualmachines".to_string()]),
            scope: Some("*".to_string()),
            ..RuleWithOperations::default()
        })
        .collect();

    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(WEBHOOK_NAME.to_string()),
            annotations: Some(BTreeMap::from([(
                "service.beta.openshift.io/inject-cabundle".to_string(),
                "true".to_string(),
            )])),
            ..ObjectMeta::default()
        },
        webhooks: Some(vec![ValidatingWebhook {
            name: "virt-template-admission.kubevirt.io".to_string(),
            client_config: WebhookClientConfig {
                service: Some(ServiceReference {
                    name: SERVICE_NAME.to_string(),
                    namespace: namespace.to_string(),
                    path: Some(WEBHOOK_PATH.to_string()),
                    port: Some(443),
                }),
                ..WebhookClientConfig::default()
            },
            rules: Some(rules),
            failure_policy: Some("Fail".to_string()),
            side_effects: "None".to_string(),
            // The validator only speaks v1beta1 AdmissionReview so far
            admission_review_versions: vec!["v1beta1".to_string()],
            ..ValidatingWebhook::default()
        }]),
    }
}
