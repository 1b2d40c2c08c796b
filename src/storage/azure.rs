//! Azure storage driver
//!
//! Azure blob containers in a storage account.

use super::{
    ensure_location, env, generate_name, identity_hash, remove_location, secret_env, Driver,
    DriverContext, CRED_AZURE_ACCOUNT_KEY,
};
use crate::crd::{AzureStorage, ImageRegistry, StorageConfig, StorageKind};
use crate::domain::ports::StorageLocation;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};
use std::collections::BTreeMap;

const ENV_ACCOUNT_KEY: &str = "REGISTRY_STORAGE_AZURE_ACCOUNTKEY";

/// Blob endpoint suffix for an Azure cloud
fn realm(cloud_name: Option<&str>) -> Result<&'static str> {
    match cloud_name.unwrap_or("AzurePublicCloud") {
        "" | "AzurePublicCloud" => Ok("core.windows.net"),
        "AzureUSGovernmentCloud" => Ok("core.usgovcloudapi.net"),
        "AzureChinaCloud" => Ok("core.chinacloudapi.cn"),
        "AzureGermanCloud" => Ok("core.cloudapi.de"),
        other => Err(Error::invalid(
            StorageKind::Azure,
            format!("unknown cloud name {:?}", other),
        )),
    }
}

fn is_valid_account_name(name: &str) -> bool {
    (3..=24).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

fn is_valid_container_name(name: &str) -> bool {
    if !(3..=63).contains(&name.len()) || name.contains("--") {
        return false;
    }
    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    alnum(bytes[0])
        && alnum(bytes[bytes.len() - 1])
        && bytes.iter().all(|&b| alnum(b) || b == b'-')
}

pub struct AzureDriver {
    config: AzureStorage,
    ctx: DriverContext,
}

impl AzureDriver {
    pub fn new(config: AzureStorage, ctx: DriverContext) -> Self {
        Self { config, ctx }
    }

    fn location(&self) -> StorageLocation {
        StorageLocation::new(
            StorageKind::Azure,
            format!("{}/{}", self.config.account_name, self.config.container),
        )
    }
}

#[async_trait]
impl Driver for AzureDriver {
    fn kind(&self) -> StorageKind {
        StorageKind::Azure
    }

    fn applied_config(&self) -> StorageConfig {
        StorageConfig {
            azure: Some(self.config.clone()),
            ..Default::default()
        }
    }

    fn config_env(&self) -> Result<Vec<EnvVar>> {
        Ok(vec![
            env("REGISTRY_STORAGE", "azure"),
            env("REGISTRY_STORAGE_AZURE_ACCOUNTNAME", self.config.account_name.as_str()),
            env("REGISTRY_STORAGE_AZURE_CONTAINER", self.config.container.as_str()),
            env(
                "REGISTRY_STORAGE_AZURE_REALM",
                realm(self.config.cloud_name.as_deref())?,
            ),
            secret_env(ENV_ACCOUNT_KEY, &self.ctx.params.secret_name),
        ])
    }

    fn volumes(&self) -> Result<(Vec<Volume>, Vec<VolumeMount>)> {
        Ok((Vec::new(), Vec::new()))
    }

    fn secrets(&self) -> Result<BTreeMap<String, String>> {
        let mut data = BTreeMap::new();
        if let Some(key) = self.ctx.credential(CRED_AZURE_ACCOUNT_KEY) {
            data.insert(ENV_ACCOUNT_KEY.to_string(), key.to_string());
        }
        Ok(data)
    }

    fn validate_configuration(&mut self, registry: &mut ImageRegistry) -> Result<bool> {
        let mut changed = false;
        if self.config.account_name.is_empty() {
            self.config.account_name = format!("imageregistry{}", identity_hash(registry, 11));
            changed = true;
        }
        if self.config.container.is_empty() {
            self.config.container = generate_name(registry, None);
            changed = true;
        }

        if !is_valid_account_name(&self.config.account_name) {
            return Err(Error::invalid(
                StorageKind::Azure,
                format!(
                    "account name {:?} must be 3-24 lowercase letters and digits",
                    self.config.account_name
                ),
            ));
        }
        if !is_valid_container_name(&self.config.container) {
            return Err(Error::invalid(
                StorageKind::Azure,
                format!("invalid container name {:?}", self.config.container),
            ));
        }
        realm(self.config.cloud_name.as_deref())?;

        if changed {
            registry.spec.storage.azure = Some(self.config.clone());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{driver_context, registry};

    #[test]
    fn test_account_and_container_rules() {
        assert!(is_valid_account_name("registrystore01"));
        assert!(!is_valid_account_name("ab"));
        assert!(!is_valid_account_name("Registry"));
        assert!(!is_valid_account_name("registry-store"));

        assert!(is_valid_container_name("image-registry"));
        assert!(!is_valid_container_name("image--registry"));
        assert!(!is_valid_container_name("-registry"));
        assert!(!is_valid_container_name("ab"));
    }

    #[test]
    fn test_defaults_are_generated_and_valid() {
        let mut cr = registry("image-registry");
        let mut driver = AzureDriver::new(AzureStorage::default(), driver_context());

        assert!(driver.validate_configuration(&mut cr).unwrap());
        let azure = cr.spec.storage.azure.unwrap();
        assert_eq!(azure.account_name.len(), 24);
        assert!(is_valid_container_name(&azure.container));
    }

    #[test]
    fn test_bad_account_is_permanent() {
        let mut cr = registry("image-registry");
        let mut driver = AzureDriver::new(
            AzureStorage {
                account_name: "Bad_Account".into(),
                container: "registry".into(),
                cloud_name: None,
            },
            driver_context(),
        );
        assert!(driver.validate_configuration(&mut cr).unwrap_err().is_permanent());
    }

    #[test]
    fn test_realm_per_cloud() {
        assert_eq!(realm(None).unwrap(), "core.windows.net");
        assert_eq!(realm(Some("AzureChinaCloud")).unwrap(), "core.chinacloudapi.cn");
        assert!(realm(Some("Mars")).is_err());
    }
}
