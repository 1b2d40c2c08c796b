//! PVC storage driver
//!
//! Filesystem storage on a PersistentVolumeClaim. The claim is created by
//! the operator when it does not exist yet.

use super::{
    ensure_location, env, is_dns1123_label, remove_location, Driver, DriverContext,
    FILESYSTEM_ROOT, STORAGE_VOLUME,
};
use crate::crd::{ImageRegistry, PvcStorage, StorageConfig, StorageKind};
use crate::domain::ports::StorageLocation;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    EnvVar, PersistentVolumeClaimVolumeSource, Volume, VolumeMount,
};
use std::collections::BTreeMap;

/// Claim name used when none is configured
pub const DEFAULT_CLAIM_NAME: &str = "image-registry-storage";

pub struct PvcDriver {
    config: PvcStorage,
    ctx: DriverContext,
}

impl PvcDriver {
    pub fn new(config: PvcStorage, ctx: DriverContext) -> Self {
        Self { config, ctx }
    }

    fn location(&self) -> StorageLocation {
        StorageLocation::new(StorageKind::Pvc, self.config.claim.clone())
            .with_size(self.config.size.clone())
    }
}

#[async_trait]
impl Driver for PvcDriver {
    fn kind(&self) -> StorageKind {
        StorageKind::Pvc
    }

    fn applied_config(&self) -> StorageConfig {
        StorageConfig {
            pvc: Some(self.config.clone()),
            ..Default::default()
        }
    }

    fn config_env(&self) -> Result<Vec<EnvVar>> {
        Ok(vec![
            env("REGISTRY_STORAGE", "filesystem"),
            env("REGISTRY_STORAGE_FILESYSTEM_ROOTDIRECTORY", FILESYSTEM_ROOT),
        ])
    }

    fn volumes(&self) -> Result<(Vec<Volume>, Vec<VolumeMount>)> {
        let volume = Volume {
            name: STORAGE_VOLUME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: self.config.claim.clone(),
                read_only: None,
            }),
            ..Default::default()
        };
        let mount = VolumeMount {
            name: STORAGE_VOLUME.to_string(),
            mount_path: FILESYSTEM_ROOT.to_string(),
            ..Default::default()
        };
        Ok((vec![volume], vec![mount]))
    }

    fn secrets(&self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    fn validate_configuration(&mut self, registry: &mut ImageRegistry) -> Result<bool> {
        let mut changed = false;
        if self.config.claim.is_empty() {
            self.config.claim = DEFAULT_CLAIM_NAME.to_string();
            changed = true;
        }
        if self.config.size.is_empty() {
            self.config.size = PvcStorage::default().size;
            changed = true;
        }

        if !is_dns1123_label(&self.config.claim) {
            return Err(Error::invalid(
                StorageKind::Pvc,
                format!("claim name {:?} is not a valid DNS-1123 label", self.config.claim),
            ));
        }

        if changed {
            registry.spec.storage.pvc = Some(self.config.clone());
        }
        Ok(changed)
    }

    async fn create_storage(&self, registry: &mut ImageRegistry) -> Result<bool> {
        let location = self.location();
        ensure_location(
            self.ctx.volume_claims.as_ref(),
            registry,
            &location,
            self.applied_config(),
        )
        .await
    }

    async fn storage_exists(&self, _registry: &ImageRegistry) -> Result<bool> {
        self.ctx.volume_claims.exists(&self.location()).await
    }

    async fn remove_storage(&self, registry: &mut ImageRegistry) -> Result<bool> {
        let location = self.location();
        remove_location(self.ctx.volume_claims.as_ref(), registry, &location).await
    }
}
