//! Domain Ports - Core trait definitions for the registry operator
//!
//! These traits define the boundaries between the reconciliation core and
//! the cluster. Adapters implement these traits to provide concrete
//! functionality; tests substitute in-memory doubles.

use crate::crd::{ConditionStatus, ConditionType, ImageRegistry, StorageKind};
use crate::error::Result;
use crate::platform::InstallConfig;
use crate::storage::Driver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Storage Backend Port
// =============================================================================

/// Address of one unit of backend storage (bucket, container or claim)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    /// Backend the location lives in
    pub kind: StorageKind,
    /// Bucket, container or claim name
    pub name: String,
    /// Region, when the backend is regional
    pub region: Option<String>,
    /// Requested size, when the backend provisions capacity
    pub size: Option<String>,
}

impl StorageLocation {
    pub fn new(kind: StorageKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            region: None,
            size: None,
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}:{}/{}", self.kind, region, self.name),
            None => write!(f, "{}:{}", self.kind, self.name),
        }
    }
}

/// Port for backend storage operations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Check whether the location exists
    async fn exists(&self, location: &StorageLocation) -> Result<bool>;

    /// Create the location; returns false if it already existed
    async fn create(&self, location: &StorageLocation) -> Result<bool>;

    /// Delete the location; absence is success
    async fn delete(&self, location: &StorageLocation) -> Result<()>;

    /// Get backend name
    fn backend_name(&self) -> &str;
}

// =============================================================================
// Manifest Generator Port
// =============================================================================

/// Port producing and applying the registry child resources
#[async_trait]
pub trait ManifestGenerator: Send + Sync {
    /// Apply every child resource; returns true if anything changed
    async fn apply(&self, registry: &ImageRegistry, driver: &dyn Driver) -> Result<bool>;

    /// Delete every child resource; absence is success
    async fn remove(&self, registry: &ImageRegistry) -> Result<()>;
}

// =============================================================================
// Cluster Status Port
// =============================================================================

/// Port for cluster-wide operator status reporting
#[async_trait]
pub trait ClusterStatusHandler: Send + Sync {
    /// Ensure the operator status object exists
    async fn create(&self) -> Result<()>;

    /// Set one coarse health condition
    async fn update(
        &self,
        condition: ConditionType,
        status: ConditionStatus,
        message: &str,
    ) -> Result<()>;
}

// =============================================================================
// Platform Metadata Port
// =============================================================================

/// Port for reading the cluster install configuration
#[async_trait]
pub trait PlatformMetadata: Send + Sync {
    async fn install_config(&self) -> Result<InstallConfig>;
}

// =============================================================================
// Managed Object API Port
// =============================================================================

/// Port for reading and writing the managed ImageRegistry
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Fetch the object fresh from the API; None if absent
    async fn get(&self, name: &str) -> Result<Option<ImageRegistry>>;

    /// Create the object
    async fn create(&self, registry: &ImageRegistry) -> Result<ImageRegistry>;

    /// Write metadata, spec and status.
    /// A stale resourceVersion surfaces as `Error::Conflict`.
    async fn update(&self, registry: &ImageRegistry) -> Result<ImageRegistry>;
}

// =============================================================================
// Cache Lister Port
// =============================================================================

/// Synchronous read of a watcher cache
pub trait Lister<K>: Send + Sync {
    /// Cached object, or `ResourceNotFound` if absent
    fn get(&self, name: &str, namespace: &str) -> Result<Arc<K>>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type StorageBackendRef = Arc<dyn StorageBackend>;
pub type ManifestGeneratorRef = Arc<dyn ManifestGenerator>;
pub type ClusterStatusHandlerRef = Arc<dyn ClusterStatusHandler>;
pub type PlatformMetadataRef = Arc<dyn PlatformMetadata>;
pub type RegistryApiRef = Arc<dyn RegistryApi>;
