//! # Version migration
//!
//! Base templates left behind by an earlier release are kept but flagged:
//! they get the deprecated annotation and lose their os/flavor/workload labels
//! so selectors written for the current release no longer match them.

use kube::ResourceExt;
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::labels::{
    stale_base_templates, strip_reserved_labels, AppLabels, TEMPLATE_DEPRECATED_ANNOTATION,
};
use crate::reconcile::{ReconcileOp, ReconcileSpec};
use crate::store::ResourceStore;
use crate::template::Template;

/// Lists stale base templates and returns one deprecation step per template.
///
/// The list is the only I/O; the returned steps run later through the
/// aggregator. Each step owns the template it was built from.
#[instrument(skip(store, labels))]
pub async fn plan_migration<'a, S: ResourceStore>(
    store: &'a S,
    namespace: &str,
    version: &str,
    labels: &AppLabels,
) -> Result<Vec<ReconcileOp<'a>>> {
    let selector = stale_base_templates(version);

    let stale: Vec<Template> = match store.list(namespace, &selector).await {
        Ok(templates) => templates,
        // Fresh installs have nothing to migrate
        Err(err) if err.is_not_found() => Vec::new(),
        Err(err) => return Err(err),
    };

    if stale.is_empty() {
        debug!("No templates from previous versions");
    } else {
        info!(
            count = stale.len(),
            "Deprecating templates from previous versions"
        );
    }

    Ok(stale
        .into_iter()
        .map(|template| deprecation_step(store, template, labels.clone()))
        .collect())
}

fn deprecation_step<S: ResourceStore>(
    store: &S,
    mut template: Template,
    labels: AppLabels,
) -> ReconcileOp<'_> {
    template
        .annotations_mut()
        .insert(TEMPLATE_DEPRECATED_ANNOTATION.to_string(), "true".to_string());
    if let Some(current) = template.metadata.labels.as_mut() {
        strip_reserved_labels(current);
    }

    ReconcileOp::reconcile(
        store,
        ReconcileSpec {
            object: template,
            labels,
            merge: strip_reserved_prefixes,
        },
    )
}

fn strip_reserved_prefixes(_desired: &Template, found: &mut Template) {
    if let Some(current) = found.metadata.labels.as_mut() {
        strip_reserved_labels(current);
    }
}
