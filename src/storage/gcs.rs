//! GCS storage driver
//!
//! Google Cloud Storage buckets. The service account keyfile is carried in
//! the storage Secret and mounted into the registry pod.

use super::{
    ensure_location, env, generate_name, is_valid_bucket_name, is_valid_region, remove_location,
    Driver, DriverContext, CRED_GCS_KEYFILE,
};
use crate::crd::{GcsStorage, ImageRegistry, StorageConfig, StorageKind};
use crate::domain::ports::StorageLocation;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    EnvVar, KeyToPath, SecretVolumeSource, Volume, VolumeMount,
};
use std::collections::BTreeMap;

const KEYFILE_SECRET_KEY: &str = "REGISTRY_STORAGE_GCS_KEYFILE";
const KEYFILE_VOLUME: &str = "registry-gcs-keyfile";
const KEYFILE_DIR: &str = "/gcs";
const KEYFILE_NAME: &str = "keyfile";

pub struct GcsDriver {
    config: GcsStorage,
    ctx: DriverContext,
}

impl GcsDriver {
    pub fn new(config: GcsStorage, ctx: DriverContext) -> Self {
        Self { config, ctx }
    }

    fn location(&self) -> StorageLocation {
        StorageLocation::new(StorageKind::Gcs, self.config.bucket.clone())
            .with_region(self.config.region.clone())
    }
}

#[async_trait]
impl Driver for GcsDriver {
    fn kind(&self) -> StorageKind {
        StorageKind::Gcs
    }

    fn applied_config(&self) -> StorageConfig {
        StorageConfig {
            gcs: Some(self.config.clone()),
            ..Default::default()
        }
    }

    fn config_env(&self) -> Result<Vec<EnvVar>> {
        Ok(vec![
            env("REGISTRY_STORAGE", "gcs"),
            env("REGISTRY_STORAGE_GCS_BUCKET", self.config.bucket.as_str()),
            env(
                "REGISTRY_STORAGE_GCS_KEYFILE",
                format!("{}/{}", KEYFILE_DIR, KEYFILE_NAME),
            ),
        ])
    }

    fn volumes(&self) -> Result<(Vec<Volume>, Vec<VolumeMount>)> {
        let volume = Volume {
            name: KEYFILE_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(self.ctx.params.secret_name.clone()),
                items: Some(vec![KeyToPath {
                    key: KEYFILE_SECRET_KEY.to_string(),
                    path: KEYFILE_NAME.to_string(),
                    mode: None,
                }]),
                optional: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mount = VolumeMount {
            name: KEYFILE_VOLUME.to_string(),
            mount_path: KEYFILE_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        };
        Ok((vec![volume], vec![mount]))
    }

    fn secrets(&self) -> Result<BTreeMap<String, String>> {
        let mut data = BTreeMap::new();
        if let Some(keyfile) = self.ctx.credential(CRED_GCS_KEYFILE) {
            data.insert(KEYFILE_SECRET_KEY.to_string(), keyfile.to_string());
        }
        Ok(data)
    }

    fn validate_configuration(&mut self, registry: &mut ImageRegistry) -> Result<bool> {
        if let Some(region) = self.config.region.as_deref().filter(|r| !r.is_empty()) {
            if !is_valid_region(region) {
                return Err(Error::invalid(
                    StorageKind::Gcs,
                    format!("invalid region {:?}", region),
                ));
            }
        }

        let mut changed = false;
        if self.config.bucket.is_empty() {
            self.config.bucket = generate_name(registry, self.config.region.as_deref());
            changed = true;
        }

        if !is_valid_bucket_name(&self.config.bucket) {
            return Err(Error::invalid(
                StorageKind::Gcs,
                format!("invalid bucket name {:?}", self.config.bucket),
            ));
        }

        if changed {
            registry.spec.storage.gcs = Some(self.config.clone());
        }
        Ok(changed)
    }

    async fn create_storage(&self, registry: &mut ImageRegistry) -> Result<bool> {
        let location = self.location();
        ensure_location(
            self.ctx.object_store.as_ref(),
            registry,
            &location,
            self.applied_config(),
        )
        .await
    }

    async fn storage_exists(&self, _registry: &ImageRegistry) -> Result<bool> {
        self.ctx.object_store.exists(&self.location()).await
    }

    async fn remove_storage(&self, registry: &mut ImageRegistry) -> Result<bool> {
        let location = self.location();
        remove_location(self.ctx.object_store.as_ref(), registry, &location).await
    }
}
