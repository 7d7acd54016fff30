//! Static objects owned by the common-templates operand.

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

pub const VIEW_ROLE_NAME: &str = "os-images.kubevirt.io:view";
pub const EDIT_CLUSTER_ROLE_NAME: &str = "os-images.kubevirt.io:edit";

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
const CDI_GROUP: &str = "cdi.kubevirt.io";

fn rule(group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(resources.iter().map(ToString::to_string).collect()),
        verbs: verbs.iter().map(ToString::to_string).collect(),
        ..PolicyRule::default()
    }
}

fn named(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..ObjectMeta::default()
    }
}

pub fn new_golden_images_ns(namespace: &str) -> Namespace {
    Namespace {
        metadata: named(namespace, None),
        ..Namespace::default()
    }
}

/// Read access to golden images for every authenticated user
pub fn new_view_role(namespace: &str) -> Role {
    Role {
        metadata: named(VIEW_ROLE_NAME, Some(namespace)),
        rules: Some(vec![
            rule(CDI_GROUP, &["datavolumes"], &["get", "list", "watch"]),
            rule(CDI_GROUP, &["datavolumes/source"], &["create"]),
        ]),
    }
}

pub fn new_view_role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: named(VIEW_ROLE_NAME, Some(namespace)),
        role_ref: RoleRef {
            api_group: RBAC_GROUP.to_string(),
            kind: "Role".to_string(),
            name: VIEW_ROLE_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            api_group: Some(RBAC_GROUP.to_string()),
            kind: "Group".to_string(),
            name: "system:authenticated".to_string(),
            namespace: None,
        }]),
    }
}

/// Aggregatable role for users allowed to manage golden images
pub fn new_edit_role() -> ClusterRole {
    let core = |resources: &[&str], verbs: &[&str]| rule("", resources, verbs);
    ClusterRole {
        metadata: named(EDIT_CLUSTER_ROLE_NAME, None),
        rules: Some(vec![
            rule(
                CDI_GROUP,
                &["datavolumes"],
                &["get", "list", "watch", "create", "update", "patch", "delete"],
            ),
            rule(CDI_GROUP, &["datavolumes/source"], &["create"]),
            core(
                &["persistentvolumeclaims"],
                &["get", "list", "watch", "create", "update", "patch", "delete"],
            ),
            core(&["persistentvolumeclaims/status"], &["get", "list", "watch"]),
        ]),
        ..ClusterRole::default()
    }
}
