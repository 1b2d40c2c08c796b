//! EmptyDir storage driver
//!
//! Pod-local scratch storage. Nothing is provisioned; images are lost when
//! the registry pod restarts.

use super::{env, Driver, FILESYSTEM_ROOT, STORAGE_VOLUME};
use crate::crd::{EmptyDirStorage, ImageRegistry, StorageConfig, StorageKind};
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, EnvVar, Volume, VolumeMount};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Default)]
pub struct EmptyDirDriver;

impl EmptyDirDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for EmptyDirDriver {
    fn kind(&self) -> StorageKind {
        StorageKind::EmptyDir
    }

    fn applied_config(&self) -> StorageConfig {
        StorageConfig {
            empty_dir: Some(EmptyDirStorage {}),
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
            empty_dir: Some(EmptyDirVolumeSource::default()),
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

    fn validate_configuration(&mut self, _registry: &mut ImageRegistry) -> Result<bool> {
        Ok(false)
    }

    async fn create_storage(&self, registry: &mut ImageRegistry) -> Result<bool> {
        warn!("Registry uses EmptyDir storage; images will not survive pod restarts");
        let applied = self.applied_config();
        let status = registry.status_mut();
        let changed = status.storage.as_ref() != Some(&applied) || status.storage_managed;
        status.storage = Some(applied);
        status.storage_managed = false;
        Ok(changed)
    }

    async fn storage_exists(&self, _registry: &ImageRegistry) -> Result<bool> {
        Ok(false)
    }

    async fn remove_storage(&self, _registry: &mut ImageRegistry) -> Result<bool> {
        Ok(false)
    }
}
