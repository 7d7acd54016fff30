//! Cluster-backed store.

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::core::Selector;
use kube::{Client, ResourceExt};
use tracing::{debug, instrument};

use super::ResourceStore;
use crate::error::{Error, Result};
use crate::kinds::ManagedResource;

/// [`ResourceStore`] over the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Maps API status codes onto the store error taxonomy.
fn map_api_error<K: ManagedResource>(err: kube::Error, name: &str) -> Error {
    let kind = K::kind(&()).into_owned();
    match err {
        kube::Error::Api(response) if response.code == 404 => Error::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
            Error::AlreadyExists {
                kind,
                name: name.to_string(),
            }
        }
        kube::Error::Api(response) if response.code == 409 => Error::Conflict {
            kind,
            name: name.to_string(),
            message: response.message,
        },
        other => Error::Kube(other),
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn get<K: ManagedResource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>> {
        K::api(self.client.clone(), namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_api_error::<K>(e, name))
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), name = %obj.name_any()))]
    async fn create<K: ManagedResource>(&self, obj: &K) -> Result<K> {
        let name = obj.name_any();
        K::api(self.client.clone(), obj.namespace().as_deref())
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_api_error::<K>(e, &name))
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), name = %obj.name_any()))]
    async fn replace<K: ManagedResource>(&self, obj: &K) -> Result<K> {
        let name = obj.name_any();
        K::api(self.client.clone(), obj.namespace().as_deref())
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_api_error::<K>(e, &name))
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), name = %obj.name_any()))]
    async fn delete<K: ManagedResource>(&self, obj: &K) -> Result<()> {
        let name = obj.name_any();
        K::api(self.client.clone(), obj.namespace().as_deref())
            .delete(&name, &DeleteParams::background())
            .await
            .map_err(|e| map_api_error::<K>(e, &name))?;
        debug!("Delete accepted");
        Ok(())
    }

    #[instrument(skip(self, selector), fields(kind = %K::kind(&()), selector = %selector))]
    async fn list<K: ManagedResource>(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<K>> {
        let params = ListParams::default().labels_from(selector);
        let list = K::api(self.client.clone(), Some(namespace))
            .list(&params)
            .await
            .map_err(|e| map_api_error::<K>(e, namespace))?;
        Ok(list.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::rbac::v1::Role;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} from the API server"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn maps_status_codes() {
        assert!(matches!(
            map_api_error::<Role>(api_error(404, "NotFound"), "view"),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            map_api_error::<Role>(api_error(409, "AlreadyExists"), "view"),
            Error::AlreadyExists { .. }
        ));
        assert!(matches!(
            map_api_error::<Role>(api_error(409, "Conflict"), "view"),
            Error::Conflict { .. }
        ));
        assert!(matches!(
            map_api_error::<Role>(api_error(500, "InternalError"), "view"),
            Error::Kube(_)
        ));
    }
}
