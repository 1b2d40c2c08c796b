//! Swift storage driver
//!
//! OpenStack Swift containers authenticated through Keystone.

use super::{
    ensure_location, env, generate_name, is_http_url, remove_location, secret_env, Driver,
    DriverContext, CRED_SWIFT_AUTH_URL, CRED_SWIFT_PASSWORD, CRED_SWIFT_USERNAME,
};
use crate::crd::{ImageRegistry, StorageConfig, StorageKind, SwiftStorage};
use crate::domain::ports::StorageLocation;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EnvVar, Volume, VolumeMount};
use std::collections::BTreeMap;

const ENV_USERNAME: &str = "REGISTRY_STORAGE_SWIFT_USERNAME";
const ENV_PASSWORD: &str = "REGISTRY_STORAGE_SWIFT_PASSWORD";

/// Longest container name Swift accepts, in bytes
const MAX_CONTAINER_LEN: usize = 256;

pub struct SwiftDriver {
    config: SwiftStorage,
    ctx: DriverContext,
}

impl SwiftDriver {
    pub fn new(config: SwiftStorage, ctx: DriverContext) -> Self {
        Self { config, ctx }
    }

    fn location(&self) -> StorageLocation {
        StorageLocation::new(StorageKind::Swift, self.config.container.clone())
            .with_region(self.config.region_name.clone())
    }
}

#[async_trait]
impl Driver for SwiftDriver {
    fn kind(&self) -> StorageKind {
        StorageKind::Swift
    }

    fn applied_config(&self) -> StorageConfig {
        StorageConfig {
            swift: Some(self.config.clone()),
            ..Default::default()
        }
    }

    fn config_env(&self) -> Result<Vec<EnvVar>> {
        let secret = &self.ctx.params.secret_name;
        let mut vars = vec![
            env("REGISTRY_STORAGE", "swift"),
            env("REGISTRY_STORAGE_SWIFT_CONTAINER", self.config.container.as_str()),
            env(
                "REGISTRY_STORAGE_SWIFT_AUTHURL",
                self.config.auth_url.clone().unwrap_or_default(),
            ),
        ];
        let optional = [
            ("REGISTRY_STORAGE_SWIFT_AUTHVERSION", &self.config.auth_version),
            ("REGISTRY_STORAGE_SWIFT_DOMAIN", &self.config.domain),
            ("REGISTRY_STORAGE_SWIFT_TENANT", &self.config.tenant),
            ("REGISTRY_STORAGE_SWIFT_REGION", &self.config.region_name),
        ];
        for (name, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                vars.push(env(name, value));
            }
        }
        vars.push(secret_env(ENV_USERNAME, secret));
        vars.push(secret_env(ENV_PASSWORD, secret));
        Ok(vars)
    }

    fn volumes(&self) -> Result<(Vec<Volume>, Vec<VolumeMount>)> {
        Ok((Vec::new(), Vec::new()))
    }

    fn secrets(&self) -> Result<BTreeMap<String, String>> {
        let mut data = BTreeMap::new();
        if let Some(user) = self.ctx.credential(CRED_SWIFT_USERNAME) {
            data.insert(ENV_USERNAME.to_string(), user.to_string());
        }
        if let Some(password) = self.ctx.credential(CRED_SWIFT_PASSWORD) {
            data.insert(ENV_PASSWORD.to_string(), password.to_string());
        }
        Ok(data)
    }

    fn validate_configuration(&mut self, registry: &mut ImageRegistry) -> Result<bool> {
        let mut changed = false;

        if self.config.auth_url.as_deref().map_or(true, str::is_empty) {
            if let Some(url) = self.ctx.credential(CRED_SWIFT_AUTH_URL) {
                self.config.auth_url = Some(url.to_string());
                changed = true;
            }
        }

        let auth_url = match self.config.auth_url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => return Err(Error::invalid(StorageKind::Swift, "authURL is required")),
        };
        if !is_http_url(auth_url) {
            return Err(Error::invalid(
                StorageKind::Swift,
                format!("authURL {:?} is not an http(s) URL", auth_url),
            ));
        }

        if self.config.container.is_empty() {
            self.config.container = generate_name(registry, None);
            changed = true;
        }
        if self.config.container.contains('/') {
            return Err(Error::invalid(
                StorageKind::Swift,
                format!("container name {:?} must not contain '/'", self.config.container),
            ));
        }
        if self.config.container.len() > MAX_CONTAINER_LEN {
            return Err(Error::invalid(
                StorageKind::Swift,
                format!("container name is longer than {} bytes", MAX_CONTAINER_LEN),
            ));
        }

        if changed {
            registry.spec.storage.swift = Some(self.config.clone());
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
    use std::sync::Arc;

    fn swift(container: &str, auth_url: Option<&str>) -> SwiftStorage {
        SwiftStorage {
            container: container.into(),
            auth_url: auth_url.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_auth_url_required() {
        let mut driver = SwiftDriver::new(swift("registry", None), driver_context());
        let mut cr = registry("image-registry");
        let err = driver.validate_configuration(&mut cr).unwrap_err();
        assert!(err.is_permanent());
        assert!(err.to_string().contains("authURL"));
    }

    #[test]
    fn test_auth_url_must_be_http() {
        let mut driver = SwiftDriver::new(swift("registry", Some("keystone:5000")), driver_context());
        let mut cr = registry("image-registry");
        assert!(driver.validate_configuration(&mut cr).unwrap_err().is_permanent());
    }

    #[test]
    fn test_auth_url_from_credentials() {
        let mut ctx = driver_context();
        ctx.credentials = Arc::new(BTreeMap::from([(
            CRED_SWIFT_AUTH_URL.to_string(),
            "https://keystone.example.com/v3".to_string(),
        )]));
        let mut driver = SwiftDriver::new(swift("registry", None), ctx);
        let mut cr = registry("image-registry");

        assert!(driver.validate_configuration(&mut cr).unwrap());
        assert_eq!(
            cr.spec.storage.swift.unwrap().auth_url.as_deref(),
            Some("https://keystone.example.com/v3")
        );
    }

    #[test]
    fn test_container_rules() {
        let mut cr = registry("image-registry");

        let mut driver = SwiftDriver::new(swift("a/b", Some("https://keystone")), driver_context());
        assert!(driver.validate_configuration(&mut cr).is_err());

        let long = "c".repeat(MAX_CONTAINER_LEN + 1);
        let mut driver = SwiftDriver::new(swift(&long, Some("https://keystone")), driver_context());
        assert!(driver.validate_configuration(&mut cr).is_err());

        let mut driver = SwiftDriver::new(swift("", Some("https://keystone")), driver_context());
        assert!(driver.validate_configuration(&mut cr).unwrap());
        assert!(!cr.spec.storage.swift.unwrap().container.is_empty());
    }
}
