//! # Template validator operand
//!
//! Deploys the admission webhook that validates VirtualMachines against the
//! template they were created from.

use tracing::instrument;

use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::labels::AppLabels;
use crate::reconcile::{
    collect_resource_status, delete_all, DeleteTarget, ReconcileOp, ReconcileSpec, StatusReport,
};
use crate::store::ResourceStore;

pub mod resources;

use resources::{
    new_cluster_role, new_cluster_role_binding, new_deployment, new_service, new_service_account,
    new_validating_webhook,
};

pub const OPERAND_NAME: &str = "template-validator";
pub const OPERAND_COMPONENT: &str = "templating";

pub struct TemplateValidator {
    config: ValidatorConfig,
}

impl TemplateValidator {
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        OPERAND_NAME
    }

    #[must_use]
    pub fn labels() -> AppLabels {
        AppLabels::new(OPERAND_NAME, OPERAND_COMPONENT)
    }

    #[instrument(skip_all, fields(operand = OPERAND_NAME, namespace = %self.config.namespace))]
    pub async fn reconcile<S: ResourceStore>(&self, store: &S) -> Result<StatusReport> {
        let labels = Self::labels();
        let ns = &self.config.namespace;

        let ops = vec![
            ReconcileOp::reconcile(store, ReconcileSpec::new(new_cluster_role(), labels.clone())),
            ReconcileOp::reconcile(
                store,
                ReconcileSpec::new(new_service_account(ns), labels.clone()),
            ),
            ReconcileOp::reconcile(
                store,
                ReconcileSpec::new(new_cluster_role_binding(ns), labels.clone()),
            ),
            ReconcileOp::reconcile(store, ReconcileSpec::new(new_service(ns), labels.clone())),
            ReconcileOp::reconcile(
                store,
                ReconcileSpec::new(
                    new_deployment(ns, self.config.replicas, &self.config.image),
                    labels.clone(),
                ),
            ),
            ReconcileOp::reconcile(store, ReconcileSpec::new(new_validating_webhook(ns), labels)),
        ];

        Ok(collect_resource_status(ops).await)
    }

    /// Removes the webhook first so admission stops before its backend goes away.
    #[instrument(skip_all, fields(operand = OPERAND_NAME))]
    pub async fn cleanup<S: ResourceStore>(&self, store: &S) -> Result<()> {
        let ns = &self.config.namespace;
        let targets = vec![
            DeleteTarget::new(store, new_validating_webhook(ns)),
            DeleteTarget::new(store, new_deployment(ns, self.config.replicas, &self.config.image)),
            DeleteTarget::new(store, new_service(ns)),
            DeleteTarget::new(store, new_cluster_role_binding(ns)),
            DeleteTarget::new(store, new_service_account(ns)),
            DeleteTarget::new(store, new_cluster_role()),
        ];
        delete_all(targets).await
    }
}
