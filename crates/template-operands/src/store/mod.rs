//! # Resource store
//!
//! The seam between the reconcile engine and wherever objects live. The
//! cluster implementation wraps `kube::Api`; the in-memory one backs tests and
//! dry runs with the same optimistic-concurrency rules.

use async_trait::async_trait;
use kube::core::Selector;

use crate::error::Result;
use crate::kinds::ManagedResource;

pub mod cluster;
pub mod memory;

pub use self::cluster::KubeStore;
pub use self::memory::{MemoryStore, StoreCall};

/// CRUD access to managed objects
///
/// Writes carry the object's `resourceVersion`; a stale version must fail with
/// [`crate::Error::Conflict`] instead of overwriting. Absent objects surface as
/// [`crate::Error::NotFound`] from `replace` and `delete`.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get<K: ManagedResource>(&self, namespace: Option<&str>, name: &str)
        -> Result<Option<K>>;

    async fn create<K: ManagedResource>(&self, obj: &K) -> Result<K>;

    async fn replace<K: ManagedResource>(&self, obj: &K) -> Result<K>;

    async fn delete<K: ManagedResource>(&self, obj: &K) -> Result<()>;

    async fn list<K: ManagedResource>(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<K>>;
}
