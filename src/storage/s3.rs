//! S3 storage driver
//!
//! Amazon S3 or any S3-compatible store reachable through `regionEndpoint`.

use super::{
    ensure_location, env, generate_name, is_valid_bucket_name, is_valid_region, remove_location,
    secret_env,
    Driver, DriverContext, CRED_AWS_ACCESS_KEY_ID, CRED_AWS_SECRET_ACCESS_KEY,
};
use crate::crd::{ImageRegistry, S3Storage, StorageConfig, StorageKind};
use crate::domain::ports::StorageLocation;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};
use std::collections::BTreeMap;

const ENV_ACCESS_KEY: &str = "REGISTRY_STORAGE_S3_ACCESSKEY";
const ENV_SECRET_KEY: &str = "REGISTRY_STORAGE_S3_SECRETKEY";

pub struct S3Driver {
    config: S3Storage,
    ctx: DriverContext,
}

impl S3Driver {
    pub fn new(config: S3Storage, ctx: DriverContext) -> Self {
        Self { config, ctx }
    }

    fn location(&self) -> StorageLocation {
        let region = Some(self.config.region.clone()).filter(|r| !r.is_empty());
        StorageLocation::new(StorageKind::S3, self.config.bucket.clone()).with_region(region)
    }
}

#[async_trait]
impl Driver for S3Driver {
    fn kind(&self) -> StorageKind {
        StorageKind::S3
    }

    fn applied_config(&self) -> StorageConfig {
        StorageConfig {
            s3: Some(self.config.clone()),
            ..Default::default()
        }
    }

    fn config_env(&self) -> Result<Vec<EnvVar>> {
        let secret = &self.ctx.params.secret_name;
        let mut vars = vec![
            env("REGISTRY_STORAGE", "s3"),
            env("REGISTRY_STORAGE_S3_BUCKET", self.config.bucket.as_str()),
            env("REGISTRY_STORAGE_S3_REGION", self.config.region.as_str()),
            env("REGISTRY_STORAGE_S3_ENCRYPT", self.config.encrypt.to_string()),
        ];
        if let Some(endpoint) = self.config.region_endpoint.as_deref().filter(|e| !e.is_empty()) {
            vars.push(env("REGISTRY_STORAGE_S3_REGIONENDPOINT", endpoint));
        }
        vars.push(secret_env(ENV_ACCESS_KEY, secret));
        vars.push(secret_env(ENV_SECRET_KEY, secret));
        Ok(vars)
    }

    fn volumes(&self) -> Result<(Vec<Volume>, Vec<VolumeMount>)> {
        Ok((Vec::new(), Vec::new()))
    }

    fn secrets(&self) -> Result<BTreeMap<String, String>> {
        let mut data = BTreeMap::new();
        if let Some(key) = self.ctx.credential(CRED_AWS_ACCESS_KEY_ID) {
            data.insert(ENV_ACCESS_KEY.to_string(), key.to_string());
        }
        if let Some(key) = self.ctx.credential(CRED_AWS_SECRET_ACCESS_KEY) {
            data.insert(ENV_SECRET_KEY.to_string(), key.to_string());
        }
        Ok(data)
    }

    fn validate_configuration(&mut self, registry: &mut ImageRegistry) -> Result<bool> {
        let has_endpoint = self
            .config
            .region_endpoint
            .as_deref()
            .map_or(false, |e| !e.is_empty());
        if self.config.region.is_empty() && !has_endpoint {
            return Err(Error::invalid(StorageKind::S3, "region or regionEndpoint is required"));
        }

        if !self.config.region.is_empty() && !is_valid_region(&self.config.region) {
            return Err(Error::invalid(
                StorageKind::S3,
                format!("invalid region {:?}", self.config.region),
            ));
        }

        let mut changed = false;
        if self.config.bucket.is_empty() {
            self.config.bucket = generate_name(registry, Some(&self.config.region));
            changed = true;
        }

        if !is_valid_bucket_name(&self.config.bucket) {
            return Err(Error::invalid(
                StorageKind::S3,
                format!("invalid bucket name {:?}", self.config.bucket),
            ));
        }

        let status = registry.status_or_default();
        if let Some(previous) = status.storage.and_then(|s| s.s3) {
            if status.storage_managed
                && previous.bucket == self.config.bucket
                && previous.region != self.config.region
            {
                return Err(Error::invalid(
                    StorageKind::S3,
                    format!(
                        "bucket {} was created in region {:?} and can not move to region {:?}",
                        previous.bucket, previous.region, self.config.region
                    ),
                ));
            }
        }

        if changed {
            registry.spec.storage.s3 = Some(self.config.clone());
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
