//! ImageRegistry API adapter

use crate::crd::ImageRegistry;
use crate::domain::ports::RegistryApi;
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};

const KIND: &str = "ImageRegistry";

/// Reads and writes the managed object through the API server
pub struct KubeRegistryApi {
    api: Api<ImageRegistry>,
}

impl KubeRegistryApi {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

/// Status subresource body carrying the resourceVersion of the main write
fn status_payload(registry: &ImageRegistry, updated: &ImageRegistry) -> Result<Vec<u8>> {
    let mut with_status = updated.clone();
    with_status.status = registry.status.clone();
    Ok(serde_json::to_vec(&with_status)?)
}

#[async_trait]
impl RegistryApi for KubeRegistryApi {
    async fn get(&self, name: &str) -> Result<Option<ImageRegistry>> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| Error::from_kube(KIND, name, e))
    }

    async fn create(&self, registry: &ImageRegistry) -> Result<ImageRegistry> {
        let name = registry.name_any();
        self.api
            .create(&PostParams::default(), registry)
            .await
            .map_err(|e| Error::from_kube(KIND, &name, e))
    }

    async fn update(&self, registry: &ImageRegistry) -> Result<ImageRegistry> {
        let name = registry.name_any();
        let pp = PostParams::default();

        let updated = self
            .api
            .replace(&name, &pp, registry)
            .await
            .map_err(|e| Error::from_kube(KIND, &name, e))?;

        // releasing the last finalizer of a deleting object removes it
        if registry.status.is_none() || (updated.is_deleting() && updated.finalizers().is_empty()) {
            return Ok(updated);
        }

        let data = status_payload(registry, &updated)?;
        match self.api.replace_status(&name, &pp, data).await {
            Ok(written) => Ok(written),
            Err(e) => match Error::from_kube(KIND, &name, e) {
                Error::ResourceNotFound { .. } if registry.is_deleting() => Ok(updated),
                other => Err(other),
            },
        }
    }
}
