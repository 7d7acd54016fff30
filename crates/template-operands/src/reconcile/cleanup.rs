//! Teardown of operand-owned objects.

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::kinds::{ManagedResource, ResourceRef};
use crate::store::ResourceStore;

type DeleteFn<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<()>> + Send + 'a>;

/// One object to delete
pub struct DeleteTarget<'a> {
    resource: ResourceRef,
    run: DeleteFn<'a>,
}

impl<'a> DeleteTarget<'a> {
    pub fn new<S, K>(store: &'a S, object: K) -> Self
    where
        S: ResourceStore,
        K: ManagedResource,
    {
        Self {
            resource: ResourceRef::of(&object),
            run: Box::new(move || async move { store.delete(&object).await }.boxed()),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }
}

/// Deletes every target once, in order.
///
/// Already-absent objects count as deleted. Any other failure stops the pass;
/// earlier deletions are not undone.
pub async fn delete_all(targets: Vec<DeleteTarget<'_>>) -> Result<()> {
    let total = targets.len();

    for target in targets {
        let DeleteTarget { resource, run } = target;
        match run().await {
            Ok(()) => debug!(resource = %resource, "Deleted"),
            Err(err) if err.is_not_found() => {
                debug!(resource = %resource, "Already absent");
            }
            Err(err) => {
                error!("Error deleting \"{}\": {}", resource.name, err);
                return Err(err);
            }
        }
    }

    info!("Cleanup removed {} object(s)", total);
    Ok(())
}
