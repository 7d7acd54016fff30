//! # Common templates operand
//!
//! Owns the golden-images namespace with its RBAC and the versioned bundle of
//! VM templates. Reconcile order matters: the namespace must exist before the
//! role inside it, and the role before its binding.

use kube::ResourceExt;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::bundle::{BundleCache, BundleSource, YamlBundleSource};
use crate::config::OperandConfig;
use crate::error::Result;
use crate::labels::AppLabels;
use crate::reconcile::{
    collect_resource_status, delete_all, DeleteTarget, ReconcileOp, ReconcileSpec, StatusReport,
};
use crate::store::ResourceStore;
use crate::template::Template;

pub mod migration;
pub mod resources;

use resources::{new_edit_role, new_golden_images_ns, new_view_role, new_view_role_binding};

pub const OPERAND_NAME: &str = "common-templates";
pub const OPERAND_COMPONENT: &str = "templating";

/// Reconciler for the common templates and golden-images access
pub struct CommonTemplates<B = YamlBundleSource> {
    config: OperandConfig,
    bundle: BundleCache<B>,
}

impl CommonTemplates<YamlBundleSource> {
    #[must_use]
    pub fn new(config: OperandConfig) -> Self {
        let bundle = BundleCache::new(config.bundle_dir.clone());
        Self { config, bundle }
    }
}

impl<B: BundleSource> CommonTemplates<B> {
    #[must_use]
    pub fn with_bundle(config: OperandConfig, bundle: BundleCache<B>) -> Self {
        Self { config, bundle }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        OPERAND_NAME
    }

    #[must_use]
    pub fn labels() -> AppLabels {
        AppLabels::new(OPERAND_NAME, OPERAND_COMPONENT)
    }

    /// Brings namespace, RBAC and templates to the desired state.
    ///
    /// An `Err` means the pass could not be planned: the stale-template query
    /// failed or the bundle is unusable. A bundle fault is fatal to the process.
    #[instrument(skip_all, fields(operand = OPERAND_NAME, version = %self.config.version))]
    pub async fn reconcile<S: ResourceStore>(&self, store: &S) -> Result<StatusReport> {
        let labels = Self::labels();
        let golden_ns = &self.config.golden_images_namespace;

        let mut ops = vec![
            ReconcileOp::reconcile(
                store,
                ReconcileSpec::new(new_golden_images_ns(golden_ns), labels.clone()),
            ),
            ReconcileOp::reconcile(
                store,
                ReconcileSpec::new(new_view_role(golden_ns), labels.clone()),
            ),
            ReconcileOp::reconcile(
                store,
                ReconcileSpec::new(new_view_role_binding(golden_ns), labels.clone()),
            ),
            ReconcileOp::reconcile(store, ReconcileSpec::new(new_edit_role(), labels.clone())),
        ];

        ops.extend(
            migration::plan_migration(
                store,
                &self.config.templates_namespace,
                &self.config.version,
                &labels,
            )
            .await?,
        );

        let bundle = self.bundle.load(&self.config.version).await?;
        ops.extend(
            self.desired_templates(&bundle)
                .map(|template| ReconcileOp::reconcile(store, ReconcileSpec::new(template, labels.clone()))),
        );

        info!(operations = ops.len(), "Reconciling common templates");
        Ok(collect_resource_status(ops).await)
    }

    /// Deletes everything this operand owns, including every bundled template.
    ///
    /// The bundle is loaded here when no reconcile has loaded it yet, so a
    /// fresh process knows which templates to remove. A bundle fault fails the
    /// pass before anything is deleted.
    #[instrument(skip_all, fields(operand = OPERAND_NAME, version = %self.config.version))]
    pub async fn cleanup<S: ResourceStore>(&self, store: &S) -> Result<()> {
        let golden_ns = &self.config.golden_images_namespace;
        let bundle = self.bundle.load(&self.config.version).await?;

        let mut targets = vec![
            DeleteTarget::new(store, new_golden_images_ns(golden_ns)),
            DeleteTarget::new(store, new_view_role(golden_ns)),
            DeleteTarget::new(store, new_view_role_binding(golden_ns)),
            DeleteTarget::new(store, new_edit_role()),
        ];
        targets.extend(
            self.desired_templates(&bundle)
                .map(|template| DeleteTarget::new(store, template)),
        );

        delete_all(targets).await
    }

    /// Fresh copies of the bundle placed in the templates namespace.
    fn desired_templates<'t>(
        &'t self,
        bundle: &'t Arc<[Template]>,
    ) -> impl Iterator<Item = Template> + 't {
        bundle.iter().cloned().map(move |mut template| {
            template.metadata.namespace = Some(self.config.templates_namespace.clone());
            template
        })
    }

    /// Names of the templates in the loaded bundle.
    #[must_use]
    pub fn bundled_template_names(&self) -> Vec<String> {
        self.bundle
            .cached()
            .map(|bundle| bundle.iter().map(ResourceExt::name_any).collect())
            .unwrap_or_default()
    }
}
