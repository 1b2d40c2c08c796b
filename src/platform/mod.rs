//! Cluster Platform Detection
//!
//! Describes the infrastructure the cluster was installed on and the
//! storage backend each platform implies when the user configured none.

pub mod install_config;

pub use install_config::*;

use crate::crd::{
    AzureStorage, EmptyDirStorage, GcsStorage, PvcStorage, S3Storage, StorageConfig,
    SwiftStorage,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// Platform Descriptor
// =============================================================================

/// Infrastructure platform the cluster runs on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformDescriptor {
    Aws { region: String },
    Azure { cloud_name: Option<String> },
    Gcp { region: String, project_id: String },
    OpenStack { region: Option<String> },
    Libvirt,
    BareMetal,
    Harvester,
    /// Explicitly no platform integration
    None,
    /// Platform section missing or not recognised
    Unknown,
}

impl std::fmt::Display for PlatformDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformDescriptor::Aws { .. } => write!(f, "aws"),
            PlatformDescriptor::Azure { .. } => write!(f, "azure"),
            PlatformDescriptor::Gcp { .. } => write!(f, "gcp"),
            PlatformDescriptor::OpenStack { .. } => write!(f, "openstack"),
            PlatformDescriptor::Libvirt => write!(f, "libvirt"),
            PlatformDescriptor::BareMetal => write!(f, "baremetal"),
            PlatformDescriptor::Harvester => write!(f, "harvester"),
            PlatformDescriptor::None => write!(f, "none"),
            PlatformDescriptor::Unknown => write!(f, "unknown"),
        }
    }
}

/// Cluster install configuration relevant to storage inference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// Cluster name from the install config metadata
    pub cluster_name: Option<String>,
    /// Detected platform
    pub platform: PlatformDescriptor,
}

impl InstallConfig {
    pub fn new(platform: PlatformDescriptor) -> Self {
        Self {
            cluster_name: None,
            platform,
        }
    }
}

// =============================================================================
// Storage Inference
// =============================================================================

/// Storage configuration implied by a platform, with a single variant
/// populated. None when the platform has no default backend.
pub fn storage_for_platform(platform: &PlatformDescriptor) -> Option<StorageConfig> {
    let config = match platform {
        PlatformDescriptor::Libvirt | PlatformDescriptor::BareMetal => StorageConfig {
            empty_dir: Some(EmptyDirStorage {}),
            ..Default::default()
        },
        PlatformDescriptor::Aws { region } => StorageConfig {
            s3: Some(S3Storage {
                region: region.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        PlatformDescriptor::Azure { cloud_name } => StorageConfig {
            azure: Some(AzureStorage {
                cloud_name: cloud_name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        PlatformDescriptor::Gcp { region, project_id } => StorageConfig {
            gcs: Some(GcsStorage {
                region: Some(region.clone()),
                project_id: Some(project_id.clone()),
                ..Default::default()
            }),
            ..Default::default()
        },
        PlatformDescriptor::OpenStack { region } => StorageConfig {
            swift: Some(SwiftStorage {
                region_name: region.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        PlatformDescriptor::Harvester => StorageConfig {
            pvc: Some(PvcStorage::default()),
            ..Default::default()
        },
        PlatformDescriptor::None | PlatformDescriptor::Unknown => return None,
    };
    Some(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::StorageKind;

    #[test]
    fn test_every_inferring_platform_populates_exactly_one_variant() {
        let cases = [
            (PlatformDescriptor::Libvirt, StorageKind::EmptyDir),
            (PlatformDescriptor::BareMetal, StorageKind::EmptyDir),
            (
                PlatformDescriptor::Aws {
                    region: "us-east-1".into(),
                },
                StorageKind::S3,
            ),
            (PlatformDescriptor::Azure { cloud_name: None }, StorageKind::Azure),
            (
                PlatformDescriptor::Gcp {
                    region: "europe-west1".into(),
                    project_id: "registry-project".into(),
                },
                StorageKind::Gcs,
            ),
            (
                PlatformDescriptor::OpenStack {
                    region: Some("regionOne".into()),
                },
                StorageKind::Swift,
            ),
            (PlatformDescriptor::Harvester, StorageKind::Pvc),
        ];

        for (platform, kind) in cases {
            let config = storage_for_platform(&platform).unwrap();
            assert_eq!(config.configured(), vec![kind], "platform {}", platform);
        }
    }

    #[test]
    fn test_region_and_project_are_copied() {
        let config = storage_for_platform(&PlatformDescriptor::Gcp {
            region: "europe-west1".into(),
            project_id: "registry-project".into(),
        })
        .unwrap();
        let gcs = config.gcs.unwrap();
        assert_eq!(gcs.region.as_deref(), Some("europe-west1"));
        assert_eq!(gcs.project_id.as_deref(), Some("registry-project"));

        let config = storage_for_platform(&PlatformDescriptor::Aws {
            region: "eu-central-1".into(),
        })
        .unwrap();
        assert_eq!(config.s3.unwrap().region, "eu-central-1");
    }

    #[test]
    fn test_no_inference_without_platform() {
        assert!(storage_for_platform(&PlatformDescriptor::None).is_none());
        assert!(storage_for_platform(&PlatformDescriptor::Unknown).is_none());
    }
}
