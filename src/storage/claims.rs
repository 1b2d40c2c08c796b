//! PersistentVolumeClaim backend
//!
//! Creates and deletes the claim backing PVC storage in the operator
//! namespace.

use crate::domain::ports::{StorageBackend, StorageLocation};
use crate::error::{Error, Result};
use crate::parameters::OperatorParams;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::info;

pub struct KubeVolumeClaims {
    api: Api<PersistentVolumeClaim>,
    labels: std::collections::BTreeMap<String, String>,
}

impl KubeVolumeClaims {
    pub fn new(client: Client, params: &OperatorParams) -> Self {
        Self {
            api: Api::namespaced(client, &params.namespace),
            labels: params.labels.clone(),
        }
    }
}

/// Claim manifest for a location
pub fn claim_for(
    location: &StorageLocation,
    labels: &std::collections::BTreeMap<String, String>,
) -> Result<PersistentVolumeClaim> {
    let size = location.size.as_deref().unwrap_or("100Gi");
    let claim = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": {
            "name": location.name,
            "labels": labels,
        },
        "spec": {
            "accessModes": ["ReadWriteMany"],
            "resources": { "requests": { "storage": size } },
        },
    }))?;
    Ok(claim)
}

#[async_trait]
impl StorageBackend for KubeVolumeClaims {
    async fn exists(&self, location: &StorageLocation) -> Result<bool> {
        let claim = self
            .api
            .get_opt(&location.name)
            .await
            .map_err(|e| Error::from_kube("PersistentVolumeClaim", &location.name, e))?;
        Ok(claim.is_some())
    }

    async fn create(&self, location: &StorageLocation) -> Result<bool> {
        if self.exists(location).await? {
            return Ok(false);
        }

        let claim = claim_for(location, &self.labels)?;
        match self.api.create(&PostParams::default(), &claim).await {
            Ok(_) => {
                info!(claim = %location.name, "Created persistent volume claim");
                Ok(true)
            }
            Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(false),
            Err(e) => Err(Error::from_kube("PersistentVolumeClaim", &location.name, e)),
        }
    }

    async fn delete(&self, location: &StorageLocation) -> Result<()> {
        match self.api.delete(&location.name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(claim = %location.name, "Deleted persistent volume claim");
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(Error::from_kube("PersistentVolumeClaim", &location.name, e)),
        }
    }

    fn backend_name(&self) -> &str {
        "persistentvolumeclaims"
    }
}
