//! # `template.openshift.io/v1` Template
//!
//! k8s-openapi does not ship the OpenShift template kind, so it is declared here
//! with the `k8s_openapi::Resource` and `Metadata` impls that make it usable
//! through `kube::Api` like any built-in kind.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

pub const TEMPLATE_API_VERSION: &str = "template.openshift.io/v1";
pub const TEMPLATE_KIND: &str = "Template";

/// A parameterised list of objects
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Optional message shown when the template is instantiated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Raw embedded objects; kept opaque so unknown kinds round-trip untouched
    #[serde(default)]
    pub objects: Vec<JsonValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<TemplateParameter>,

    /// Labels applied to every object the template produces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParameter {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

fn default_api_version() -> String {
    TEMPLATE_API_VERSION.to_string()
}

fn default_kind() -> String {
    TEMPLATE_KIND.to_string()
}

impl Default for Template {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::default(),
            message: None,
            objects: Vec::new(),
            parameters: Vec::new(),
            labels: None,
        }
    }
}

impl Template {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Self::default()
        }
    }
}

impl k8s_openapi::Resource for Template {
    const API_VERSION: &'static str = TEMPLATE_API_VERSION;
    const GROUP: &'static str = "template.openshift.io";
    const KIND: &'static str = TEMPLATE_KIND;
    const VERSION: &'static str = "v1";
    const URL_PATH_SEGMENT: &'static str = "templates";
    type Scope = NamespaceResourceScope;
}

impl k8s_openapi::Metadata for Template {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}
