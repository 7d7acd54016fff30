//! # Label and annotation contracts
//!
//! Keys in this module are read by other tooling and must not be renamed.

use kube::core::{Expression, Selector, SelectorExt};
use std::collections::BTreeMap;

/// Category label distinguishing base templates from the rest
pub const TEMPLATE_TYPE_LABEL: &str = "template.kubevirt.io/type";
/// Release version a template was shipped with
pub const TEMPLATE_VERSION_LABEL: &str = "template.kubevirt.io/version";
/// Category value selected by the version migration
pub const TEMPLATE_TYPE_BASE: &str = "base";

pub const TEMPLATE_OS_LABEL_PREFIX: &str = "os.template.kubevirt.io/";
pub const TEMPLATE_FLAVOR_LABEL_PREFIX: &str = "flavor.template.kubevirt.io/";
pub const TEMPLATE_WORKLOAD_LABEL_PREFIX: &str = "workload.template.kubevirt.io/";

/// Prefixes stripped from deprecated templates so they stop matching selectors
pub const RESERVED_LABEL_PREFIXES: [&str; 3] = [
    TEMPLATE_OS_LABEL_PREFIX,
    TEMPLATE_FLAVOR_LABEL_PREFIX,
    TEMPLATE_WORKLOAD_LABEL_PREFIX,
];

/// Set to `"true"` on templates superseded by a newer bundle
pub const TEMPLATE_DEPRECATED_ANNOTATION: &str = "template.kubevirt.io/deprecated";

pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";
pub const APP_COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const APP_MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "template-operands";

/// Returns true when `key` carries one of the reserved categorization prefixes.
#[must_use]
pub fn has_reserved_prefix(key: &str) -> bool {
    RESERVED_LABEL_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

/// Removes every reserved-prefix label, returning how many were dropped.
pub fn strip_reserved_labels(labels: &mut BTreeMap<String, String>) -> usize {
    let before = labels.len();
    labels.retain(|key, _| !has_reserved_prefix(key));
    before - labels.len()
}

/// Ownership labels stamped on every object an operand creates or updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLabels {
    pub name: String,
    pub component: String,
}

impl AppLabels {
    #[must_use]
    pub fn new(name: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component: component.into(),
        }
    }

    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_NAME_LABEL.to_string(), self.name.clone()),
            (APP_COMPONENT_LABEL.to_string(), self.component.clone()),
            (APP_MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
        ])
    }

    /// Inserts the ownership labels, overwriting any drifted values.
    pub fn apply(&self, labels: &mut Option<BTreeMap<String, String>>) {
        labels.get_or_insert_with(BTreeMap::new).extend(self.to_map());
    }

    /// True when every ownership label is present with the expected value.
    #[must_use]
    pub fn is_applied(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        let Some(labels) = labels else {
            return false;
        };
        self.to_map()
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

/// Base templates shipped by any version other than `version`.
///
/// Templates without a version label match too, as they do on the API server.
#[must_use]
pub fn stale_base_templates(version: &str) -> Selector {
    Selector::from_iter([
        Expression::Equal(TEMPLATE_TYPE_LABEL.into(), TEMPLATE_TYPE_BASE.into()),
        Expression::NotEqual(TEMPLATE_VERSION_LABEL.into(), version.into()),
    ])
}

/// Selector match over optional object labels; absent labels are an empty set.
#[must_use]
pub fn selects(selector: &Selector, labels: Option<&BTreeMap<String, String>>) -> bool {
    match labels {
        Some(labels) => selector.matches(labels),
        None => selector.matches(&BTreeMap::new()),
    }
}
