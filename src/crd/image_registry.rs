//! ImageRegistry CRD
//!
//! The singleton custom resource describing the desired state of the
//! image registry in a namespace, including the storage configuration
//! union the registry runs against.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// ImageRegistry CRD
// =============================================================================

/// ImageRegistry declares how the image registry in its namespace should run
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "registry.billyronks.io",
    version = "v1",
    kind = "ImageRegistry",
    plural = "imageregistries",
    shortname = "ir",
    status = "ImageRegistryStatus",
    printcolumn = r#"{"name": "State", "type": "string", "jsonPath": ".spec.managementState"}"#,
    printcolumn = r#"{"name": "Hostname", "type": "string", "jsonPath": ".status.internalRegistryHostname"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ImageRegistrySpec {
    /// Whether the operator manages, ignores, or removes the registry
    #[serde(default)]
    pub management_state: ManagementState,

    /// Storage backend; leave empty to infer one from the platform
    #[serde(default)]
    pub storage: StorageConfig,

    /// Number of registry replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Registry container image
    #[serde(default = "default_image")]
    pub image: String,

    /// Registry log level (error, warn, info, debug)
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Operator-level kill switch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ManagementState {
    #[default]
    Managed,
    Unmanaged,
    Removed,
    Force,
}

impl std::fmt::Display for ManagementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagementState::Managed => write!(f, "Managed"),
            ManagementState::Unmanaged => write!(f, "Unmanaged"),
            ManagementState::Removed => write!(f, "Removed"),
            ManagementState::Force => write!(f, "Force"),
        }
    }
}

// =============================================================================
// Storage Configuration Union
// =============================================================================

/// Storage backend kinds, in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    EmptyDir,
    S3,
    Swift,
    Gcs,
    Pvc,
    Azure,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::EmptyDir => write!(f, "EmptyDir"),
            StorageKind::S3 => write!(f, "S3"),
            StorageKind::Swift => write!(f, "Swift"),
            StorageKind::Gcs => write!(f, "GCS"),
            StorageKind::Pvc => write!(f, "PVC"),
            StorageKind::Azure => write!(f, "Azure"),
        }
    }
}

/// Storage configuration union. At most one field may be populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirStorage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Storage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift: Option<SwiftStorage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsStorage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc: Option<PvcStorage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureStorage>,
}

/// Ephemeral pod-local storage; data is lost when the pod restarts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EmptyDirStorage {}

/// Amazon S3 (or S3-compatible) bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Storage {
    /// Bucket name; generated when empty
    #[serde(default)]
    pub bucket: String,
    /// Bucket region
    #[serde(default)]
    pub region: String,
    /// Endpoint for S3-compatible services
    #[serde(default)]
    pub region_endpoint: Option<String>,
    /// Server-side encryption
    #[serde(default)]
    pub encrypt: bool,
}

/// OpenStack Swift container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SwiftStorage {
    /// Container name; generated when empty
    #[serde(default)]
    pub container: String,
    /// Keystone authentication URL
    #[serde(default, rename = "authURL")]
    pub auth_url: Option<String>,
    /// Keystone API version
    #[serde(default)]
    pub auth_version: Option<String>,
    /// Keystone domain
    #[serde(default)]
    pub domain: Option<String>,
    /// Keystone tenant
    #[serde(default)]
    pub tenant: Option<String>,
    /// Swift region
    #[serde(default)]
    pub region_name: Option<String>,
}

/// Google Cloud Storage bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GcsStorage {
    /// Bucket name; generated when empty
    #[serde(default)]
    pub bucket: String,
    /// Bucket location
    #[serde(default)]
    pub region: Option<String>,
    /// Project owning the bucket
    #[serde(default, rename = "projectID")]
    pub project_id: Option<String>,
}

/// PersistentVolumeClaim mounted into the registry pods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PvcStorage {
    /// Claim name; defaulted when empty
    #[serde(default)]
    pub claim: String,
    /// Requested size when the operator creates the claim
    #[serde(default = "default_claim_size")]
    pub size: String,
}

impl Default for PvcStorage {
    fn default() -> Self {
        Self {
            claim: String::new(),
            size: default_claim_size(),
        }
    }
}

/// Azure blob storage container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureStorage {
    /// Storage account name
    #[serde(default)]
    pub account_name: String,
    /// Container name; generated when empty
    #[serde(default)]
    pub container: String,
    /// Azure cloud (AzurePublicCloud, AzureUSGovernmentCloud, ...)
    #[serde(default)]
    pub cloud_name: Option<String>,
}

impl StorageConfig {
    /// Kinds of every populated variant, in resolution order
    pub fn configured(&self) -> Vec<StorageKind> {
        let mut kinds = Vec::new();
        if self.empty_dir.is_some() {
            kinds.push(StorageKind::EmptyDir);
        }
        if self.s3.is_some() {
            kinds.push(StorageKind::S3);
        }
        if self.swift.is_some() {
            kinds.push(StorageKind::Swift);
        }
        if self.gcs.is_some() {
            kinds.push(StorageKind::Gcs);
        }
        if self.pvc.is_some() {
            kinds.push(StorageKind::Pvc);
        }
        if self.azure.is_some() {
            kinds.push(StorageKind::Azure);
        }
        kinds
    }

    /// True when no variant is populated
    pub fn is_empty(&self) -> bool {
        self.configured().is_empty()
    }
}

// =============================================================================
// Status
// =============================================================================

/// Observed state of the image registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageRegistryStatus {
    /// Conditions
    #[serde(default)]
    pub conditions: Vec<RegistryCondition>,

    /// Generation of the spec last acted upon
    #[serde(default)]
    pub observed_generation: Option<i64>,

    /// In-cluster address of the registry service
    #[serde(default)]
    pub internal_registry_hostname: Option<String>,

    /// Storage configuration last applied to a backend
    #[serde(default)]
    pub storage: Option<StorageConfig>,

    /// Whether the operator created the backend storage
    #[serde(default)]
    pub storage_managed: bool,
}

/// Condition types reported on the managed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    Available,
    Progressing,
    Removed,
    Failing,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionType::Available => write!(f, "Available"),
            ConditionType::Progressing => write!(f, "Progressing"),
            ConditionType::Removed => write!(f, "Removed"),
            ConditionType::Failing => write!(f, "Failing"),
        }
    }
}

/// Condition status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Condition for registry status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCondition {
    /// Type of condition
    pub r#type: ConditionType,
    /// Status: True, False, Unknown
    pub status: ConditionStatus,
    /// Last time the status value flipped
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
    /// Machine-readable reason
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_replicas() -> i32 {
    1
}

fn default_image() -> String {
    "docker.io/library/registry:2.8".to_string()
}

fn default_claim_size() -> String {
    "100Gi".to_string()
}

// =============================================================================
// Implementations
// =============================================================================

impl Default for ImageRegistrySpec {
    fn default() -> Self {
        Self {
            management_state: ManagementState::default(),
            storage: StorageConfig::default(),
            replicas: default_replicas(),
            image: default_image(),
            log_level: None,
        }
    }
}

impl ImageRegistry {
    /// Status, or the empty default when none has been written yet
    pub fn status_or_default(&self) -> ImageRegistryStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Mutable status, created on first access
    pub fn status_mut(&mut self) -> &mut ImageRegistryStatus {
        self.status.get_or_insert_with(ImageRegistryStatus::default)
    }

    /// Whether deletion has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

impl ImageRegistryStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: ConditionType) -> Option<&RegistryCondition> {
        self.conditions.iter().find(|c| c.r#type == type_)
    }

    /// Check if a condition is true
    pub fn is_condition_true(&self, type_: ConditionType) -> bool {
        self.condition(type_)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_kind_display() {
        assert_eq!(format!("{}", StorageKind::Gcs), "GCS");
        assert_eq!(format!("{}", StorageKind::Pvc), "PVC");
        assert_eq!(format!("{}", StorageKind::EmptyDir), "EmptyDir");
    }

    #[test]
    fn test_configured_lists_every_variant() {
        let cfg = StorageConfig {
            s3: Some(S3Storage::default()),
            azure: Some(AzureStorage::default()),
            ..Default::default()
        };
        assert_eq!(cfg.configured(), vec![StorageKind::S3, StorageKind::Azure]);
        assert!(!cfg.is_empty());
        assert!(StorageConfig::default().is_empty());
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: ImageRegistrySpec = serde_json::from_value(serde_json::json!({
            "storage": { "pvc": { "claim": "registry" } }
        }))
        .unwrap();

        assert_eq!(spec.management_state, ManagementState::Managed);
        assert_eq!(spec.replicas, 1);
        let pvc = spec.storage.pvc.unwrap();
        assert_eq!(pvc.claim, "registry");
        assert_eq!(pvc.size, "100Gi");
    }

    #[test]
    fn test_default_spec_matches_serde_defaults() {
        let spec = ImageRegistrySpec::default();
        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.image, "docker.io/library/registry:2.8");

        let parsed: ImageRegistrySpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_swift_field_names() {
        let swift: SwiftStorage = serde_json::from_value(serde_json::json!({
            "container": "registry",
            "authURL": "https://keystone:5000/v3"
        }))
        .unwrap();
        assert_eq!(swift.auth_url.as_deref(), Some("https://keystone:5000/v3"));
    }
}
