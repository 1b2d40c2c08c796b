//! Storage Drivers
//!
//! One driver per storage configuration variant, all behind the [`Driver`]
//! contract. The resolver turns the configuration union into exactly one
//! driver, inferring a configuration from the platform when none is set.
//!
//! - EmptyDir: pod-local scratch storage
//! - S3, GCS, Swift, Azure: object stores behind the object-store backend
//! - PVC: a PersistentVolumeClaim behind the volume-claim backend

pub mod azure;
pub mod claims;
pub mod emptydir;
pub mod gcs;
pub mod memory;
pub mod pvc;
pub mod s3;
pub mod swift;

pub use azure::AzureDriver;
pub use claims::KubeVolumeClaims;
pub use emptydir::EmptyDirDriver;
pub use gcs::GcsDriver;
pub use memory::InMemoryBackend;
pub use pvc::PvcDriver;
pub use s3::S3Driver;
pub use swift::SwiftDriver;

use crate::crd::{ImageRegistry, StorageConfig, StorageKind};
use crate::domain::ports::{PlatformMetadata, StorageBackend, StorageBackendRef, StorageLocation};
use crate::error::{Error, Result};
use crate::parameters::OperatorParams;
use crate::platform::storage_for_platform;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, SecretKeySelector, Volume, VolumeMount};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Credential Keys
// =============================================================================

pub const CRED_AWS_ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const CRED_AWS_SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub const CRED_GCS_KEYFILE: &str = "gcs_keyfile";
pub const CRED_SWIFT_USERNAME: &str = "swift_username";
pub const CRED_SWIFT_PASSWORD: &str = "swift_password";
pub const CRED_SWIFT_AUTH_URL: &str = "auth_url";
pub const CRED_AZURE_ACCOUNT_KEY: &str = "azure_account_key";

/// Registry root directory for filesystem-backed storage
pub const FILESYSTEM_ROOT: &str = "/registry";

/// Name of the volume backing filesystem storage
pub const STORAGE_VOLUME: &str = "registry-storage";

// =============================================================================
// Driver Contract
// =============================================================================

/// Uniform contract over every storage backend
#[async_trait]
pub trait Driver: Send + Sync {
    /// Backend kind
    fn kind(&self) -> StorageKind;

    /// Union with only this driver's variant populated, as currently configured
    fn applied_config(&self) -> StorageConfig;

    /// Environment variables configuring the registry for this backend
    fn config_env(&self) -> Result<Vec<EnvVar>>;

    /// Volumes and mounts the registry container needs
    fn volumes(&self) -> Result<(Vec<Volume>, Vec<VolumeMount>)>;

    /// Secret key to content mapping for the storage Secret
    fn secrets(&self) -> Result<BTreeMap<String, String>>;

    /// Fill defaults and reject impossible configurations.
    /// Returns true if the object was modified.
    fn validate_configuration(&mut self, registry: &mut ImageRegistry) -> Result<bool>;

    /// Ensure backend storage exists and record it in status.
    /// Returns true if the object was modified.
    async fn create_storage(&self, registry: &mut ImageRegistry) -> Result<bool>;

    /// Check whether the backend storage exists
    async fn storage_exists(&self, registry: &ImageRegistry) -> Result<bool>;

    /// Remove backend storage the operator created.
    /// Returns true if the object was modified.
    async fn remove_storage(&self, registry: &mut ImageRegistry) -> Result<bool>;

    /// Whether the configuration differs from the last applied one
    fn storage_changed(&self, registry: &ImageRegistry) -> bool {
        let applied = registry.status.as_ref().and_then(|s| s.storage.as_ref());
        applied != Some(&self.applied_config())
    }
}

/// Shared collaborators handed to every driver
#[derive(Clone)]
pub struct DriverContext {
    pub params: Arc<OperatorParams>,
    /// Backend for buckets and containers
    pub object_store: StorageBackendRef,
    /// Backend for persistent volume claims
    pub volume_claims: StorageBackendRef,
    /// Cloud credentials, keyed by the `CRED_*` constants
    pub credentials: Arc<BTreeMap<String, String>>,
}

impl DriverContext {
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// One driver per populated variant, in resolution order
pub fn configured_drivers(config: &StorageConfig, ctx: &DriverContext) -> Vec<Box<dyn Driver>> {
    let mut drivers: Vec<Box<dyn Driver>> = Vec::new();
    if config.empty_dir.is_some() {
        drivers.push(Box::new(EmptyDirDriver::new()));
    }
    if let Some(s3) = &config.s3 {
        drivers.push(Box::new(S3Driver::new(s3.clone(), ctx.clone())));
    }
    if let Some(swift) = &config.swift {
        drivers.push(Box::new(SwiftDriver::new(swift.clone(), ctx.clone())));
    }
    if let Some(gcs) = &config.gcs {
        drivers.push(Box::new(GcsDriver::new(gcs.clone(), ctx.clone())));
    }
    if let Some(pvc) = &config.pvc {
        drivers.push(Box::new(PvcDriver::new(pvc.clone(), ctx.clone())));
    }
    if let Some(azure) = &config.azure {
        drivers.push(Box::new(AzureDriver::new(azure.clone(), ctx.clone())));
    }
    drivers
}

/// The single driver for a configuration
pub fn new_driver(config: &StorageConfig, ctx: &DriverContext) -> Result<Box<dyn Driver>> {
    let mut drivers = configured_drivers(config, ctx);
    match drivers.len() {
        0 => Err(Error::StorageNotConfigured),
        1 => Ok(drivers.remove(0)),
        _ => Err(Error::AmbiguousStorage {
            backends: drivers.iter().map(|d| d.kind()).collect(),
        }),
    }
}

/// Resolve the driver for the object's storage configuration, inferring one
/// from the platform when none is set. The flag reports whether an inferred
/// configuration was written into the spec.
pub async fn resolve(
    registry: &mut ImageRegistry,
    ctx: &DriverContext,
    platform: &dyn PlatformMetadata,
) -> Result<(Box<dyn Driver>, bool)> {
    match new_driver(&registry.spec.storage, ctx) {
        Err(Error::StorageNotConfigured) => {}
        other => return other.map(|driver| (driver, false)),
    }

    let install_config = platform
        .install_config()
        .await
        .map_err(|e| Error::PlatformDetection(e.to_string()))?;

    let Some(inferred) = storage_for_platform(&install_config.platform) else {
        debug!(platform = %install_config.platform, "Platform has no default storage");
        return Err(Error::StorageNotConfigured);
    };

    info!(
        platform = %install_config.platform,
        backends = ?inferred.configured(),
        "Inferred storage configuration from platform"
    );
    registry.spec.storage = inferred;
    let driver = new_driver(&registry.spec.storage, ctx)?;
    Ok((driver, true))
}

// =============================================================================
// Shared Driver Helpers
// =============================================================================

/// Ensure a location exists and record the applied configuration
pub(crate) async fn ensure_location(
    backend: &dyn StorageBackend,
    registry: &mut ImageRegistry,
    location: &StorageLocation,
    applied: StorageConfig,
) -> Result<bool> {
    let created = backend.create(location).await?;
    if created {
        info!(location = %location, backend = backend.backend_name(), "Created registry storage");
    }

    let status = registry.status_mut();
    let same_location = status
        .storage
        .as_ref()
        .and_then(location_name)
        .map(|(kind, name)| kind == location.kind && name == location.name)
        .unwrap_or(false);
    let managed = created || (status.storage_managed && same_location);

    let changed = status.storage.as_ref() != Some(&applied) || status.storage_managed != managed;
    status.storage = Some(applied);
    status.storage_managed = managed;
    Ok(changed)
}

/// Delete a location if the operator created it
pub(crate) async fn remove_location(
    backend: &dyn StorageBackend,
    registry: &mut ImageRegistry,
    location: &StorageLocation,
) -> Result<bool> {
    if !registry.status_or_default().storage_managed {
        info!(location = %location, "Storage was not created by the operator, leaving it in place");
        return Ok(false);
    }

    backend.delete(location).await?;
    info!(location = %location, backend = backend.backend_name(), "Removed registry storage");

    let status = registry.status_mut();
    status.storage = None;
    status.storage_managed = false;
    Ok(true)
}

/// Kind and name of the single location a configuration points at
fn location_name(config: &StorageConfig) -> Option<(StorageKind, String)> {
    if let Some(s3) = &config.s3 {
        return Some((StorageKind::S3, s3.bucket.clone()));
    }
    if let Some(swift) = &config.swift {
        return Some((StorageKind::Swift, swift.container.clone()));
    }
    if let Some(gcs) = &config.gcs {
        return Some((StorageKind::Gcs, gcs.bucket.clone()));
    }
    if let Some(pvc) = &config.pvc {
        return Some((StorageKind::Pvc, pvc.claim.clone()));
    }
    if let Some(azure) = &config.azure {
        return Some((
            StorageKind::Azure,
            format!("{}/{}", azure.account_name, azure.container),
        ));
    }
    None
}

/// Deterministic name derived from the object's identity
pub(crate) fn generate_name(registry: &ImageRegistry, region: Option<&str>) -> String {
    let region: String = region
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let mut name = if region.is_empty() {
        format!("image-registry-{}", identity_hash(registry, 12))
    } else {
        format!("image-registry-{}-{}", region, identity_hash(registry, 12))
    };
    // ascii only, so byte truncation stays on a char boundary
    name.truncate(63);
    name.trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Lowercase hex digest prefix of the object's uid (or namespace/name)
pub(crate) fn identity_hash(registry: &ImageRegistry, len: usize) -> String {
    let seed = registry.metadata.uid.clone().unwrap_or_else(|| {
        format!(
            "{}/{}",
            registry.metadata.namespace.as_deref().unwrap_or_default(),
            registry.metadata.name.as_deref().unwrap_or_default()
        )
    });
    let mut digest = format!("{:x}", Sha256::digest(seed.as_bytes()));
    digest.truncate(len);
    digest
}

pub(crate) fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

/// Env var sourced from a key of the storage Secret
pub(crate) fn secret_env(name: &str, secret_name: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret_name.to_string()),
                key: name.to_string(),
                optional: Some(true),
            }),
            ..Default::default()
        }),
    }
}

// =============================================================================
// Name Validation
// =============================================================================

/// S3 bucket naming rules (also applied to GCS)
pub fn is_valid_bucket_name(name: &str) -> bool {
    if name.len() < 3 || name.len() > 63 {
        return false;
    }

    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return false;
    }

    if !bytes.iter().all(|&b| alnum(b) || b == b'-' || b == b'.') {
        return false;
    }

    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return false;
    }

    // Cannot be formatted as IP address
    !(name.split('.').count() == 4 && name.split('.').all(|p| p.parse::<u8>().is_ok()))
}

/// RFC 1123 DNS label
pub fn is_dns1123_label(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }
    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    alnum(bytes[0])
        && alnum(bytes[bytes.len() - 1])
        && bytes.iter().all(|&b| alnum(b) || b == b'-')
}

/// Region names are DNS labels, case-insensitively
pub fn is_valid_region(region: &str) -> bool {
    is_dns1123_label(&region.to_ascii_lowercase())
}

/// Absolute http or https URL with a host
pub fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}
