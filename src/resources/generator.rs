//! Server-side apply of the registry child resources

use super::{build_deployment, build_secret, build_service, build_service_account, FIELD_MANAGER};
use crate::crd::ImageRegistry;
use crate::domain::ports::ManifestGenerator;
use crate::error::{Error, Result};
use crate::parameters::OperatorParams;
use crate::storage::Driver;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

/// Whether an apply moved the object
fn applied_changed(before: Option<&str>, after: Option<&str>) -> bool {
    match before {
        None => true,
        Some(before) => after != Some(before),
    }
}

pub struct KubeGenerator {
    client: Client,
    params: Arc<OperatorParams>,
}

impl KubeGenerator {
    pub fn new(client: Client, params: Arc<OperatorParams>) -> Self {
        Self { client, params }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), &self.params.namespace)
    }

    /// Apply one object. Returns true if it was created or its
    /// resourceVersion moved.
    async fn apply_object<K>(&self, obj: &K) -> Result<bool>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let kind = K::kind(&()).to_string();
        let name = obj.name_any();
        let api: Api<K> = self.api();

        let before = api
            .get_opt(&name)
            .await
            .map_err(|e| Error::from_kube(&kind, &name, e))?
            .and_then(|o| o.resource_version());

        let after = api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(obj))
            .await
            .map_err(|e| Error::from_kube(&kind, &name, e))?;

        let changed = applied_changed(before.as_deref(), after.resource_version().as_deref());
        if changed {
            info!(kind = %kind, name = %name, "Applied registry resource");
        } else {
            debug!(kind = %kind, name = %name, "Registry resource unchanged");
        }
        Ok(changed)
    }

    async fn delete_object<K>(&self, name: &str) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + Debug + DeserializeOwned,
    {
        let kind = K::kind(&()).to_string();
        match self.api::<K>().delete(name, &DeleteParams::background()).await {
            Ok(_) => {
                info!(kind = %kind, name = %name, "Deleted registry resource");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(kind = %kind, name = %name, "Registry resource already gone");
                Ok(())
            }
            Err(e) => Err(Error::from_kube(&kind, name, e)),
        }
    }
}

#[async_trait]
impl ManifestGenerator for KubeGenerator {
    async fn apply(&self, registry: &ImageRegistry, driver: &dyn Driver) -> Result<bool> {
        let params = self.params.as_ref();

        // every object is built before any is applied
        let service_account = build_service_account(registry, params);
        let secret = build_secret(registry, params, driver.secrets()?);
        let service = build_service(registry, params);
        let deployment = build_deployment(registry, params, driver)?;

        let mut changed = self.apply_object(&service_account).await?;
        changed |= self.apply_object(&secret).await?;
        changed |= self.apply_object(&service).await?;
        changed |= self.apply_object(&deployment).await?;
        Ok(changed)
    }

    async fn remove(&self, _registry: &ImageRegistry) -> Result<()> {
        let params = self.params.as_ref();
        self.delete_object::<Deployment>(&params.resource_name).await?;
        self.delete_object::<Service>(&params.service_name).await?;
        self.delete_object::<Secret>(&params.secret_name).await?;
        self.delete_object::<ServiceAccount>(&params.service_account).await?;
        Ok(())
    }
}
