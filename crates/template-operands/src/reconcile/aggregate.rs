//! Ordered execution of reconcile operations with fail-fast semantics.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use tracing::{error, warn};

use super::{reconcile_one, ReconcileSpec, ResourceStatus};
use crate::error::{Error, Result};
use crate::kinds::{ManagedResource, ResourceRef};
use crate::store::ResourceStore;

type RunFn<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<ResourceStatus>> + Send + 'a>;

/// A deferred reconcile step; nothing runs until the aggregator reaches it
pub struct ReconcileOp<'a> {
    resource: ResourceRef,
    run: RunFn<'a>,
}

impl<'a> ReconcileOp<'a> {
    pub fn new<F, Fut>(resource: ResourceRef, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<ResourceStatus>> + Send + 'a,
    {
        Self {
            resource,
            run: Box::new(move || run().boxed()),
        }
    }

    /// Step that runs the create-or-update engine on its own copy of the object.
    pub fn reconcile<S, K>(store: &'a S, spec: ReconcileSpec<K>) -> Self
    where
        S: ResourceStore,
        K: ManagedResource,
    {
        let resource = ResourceRef::of(&spec.object);
        Self::new(resource, move || reconcile_one(store, spec))
    }

    #[must_use]
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }
}

/// Statuses of the operations that ran, plus the error that stopped the run
#[derive(Debug)]
pub struct StatusReport {
    pub statuses: Vec<ResourceStatus>,
    pub error: Option<Error>,
}

impl StatusReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<ResourceStatus>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.statuses),
        }
    }
}

/// Runs `ops` in order, stopping at the first error other than absence.
///
/// The failing operation is reported as a failed status. Work already applied
/// stays applied and nothing is retried; the next invocation picks up from the
/// live state.
pub async fn collect_resource_status(ops: Vec<ReconcileOp<'_>>) -> StatusReport {
    let mut statuses = Vec::with_capacity(ops.len());

    for op in ops {
        let ReconcileOp { resource, run } = op;
        match run().await {
            Ok(status) => statuses.push(status),
            Err(err) if err.is_not_found() => {
                warn!(resource = %resource, error = %err, "Dependency missing, continuing");
                statuses.push(ResourceStatus::failed(resource, &err));
            }
            Err(err) => {
                error!(resource = %resource, error = %err, "Reconcile aborted");
                statuses.push(ResourceStatus::failed(resource, &err));
                return StatusReport {
                    statuses,
                    error: Some(err),
                };
            }
        }
    }

    StatusReport {
        statuses,
        error: None,
    }
}
