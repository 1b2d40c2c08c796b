//! Install config reader
//!
//! Reads the cluster install configuration from the `cluster-config-v1`
//! ConfigMap in `kube-system`.

use super::{InstallConfig, PlatformDescriptor};
use crate::domain::ports::PlatformMetadata;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use serde::Deserialize;
use tracing::debug;

pub const INSTALL_CONFIG_NAMESPACE: &str = "kube-system";
pub const INSTALL_CONFIG_NAME: &str = "cluster-config-v1";
pub const INSTALL_CONFIG_KEY: &str = "install-config";

// =============================================================================
// Document Shape
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct InstallConfigDocument {
    #[serde(default)]
    metadata: DocumentMetadata,
    #[serde(default)]
    platform: PlatformSection,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentMetadata {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PlatformSection {
    aws: Option<AwsPlatform>,
    azure: Option<AzurePlatform>,
    gcp: Option<GcpPlatform>,
    openstack: Option<OpenStackPlatform>,
    libvirt: Option<serde_yaml::Value>,
    baremetal: Option<serde_yaml::Value>,
    harvester: Option<serde_yaml::Value>,
    none: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct AwsPlatform {
    region: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzurePlatform {
    #[serde(default)]
    cloud_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcpPlatform {
    region: String,
    #[serde(rename = "projectID")]
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct OpenStackPlatform {
    #[serde(default)]
    region: Option<String>,
}

impl PlatformSection {
    fn descriptor(self) -> PlatformDescriptor {
        if let Some(aws) = self.aws {
            PlatformDescriptor::Aws { region: aws.region }
        } else if let Some(azure) = self.azure {
            PlatformDescriptor::Azure {
                cloud_name: azure.cloud_name,
            }
        } else if let Some(gcp) = self.gcp {
            PlatformDescriptor::Gcp {
                region: gcp.region,
                project_id: gcp.project_id,
            }
        } else if let Some(openstack) = self.openstack {
            PlatformDescriptor::OpenStack {
                region: openstack.region,
            }
        } else if self.libvirt.is_some() {
            PlatformDescriptor::Libvirt
        } else if self.baremetal.is_some() {
            PlatformDescriptor::BareMetal
        } else if self.harvester.is_some() {
            PlatformDescriptor::Harvester
        } else if self.none.is_some() {
            PlatformDescriptor::None
        } else {
            PlatformDescriptor::Unknown
        }
    }
}

/// Parse the install-config YAML document
pub fn parse_install_config(document: &str) -> Result<InstallConfig> {
    let doc: InstallConfigDocument = serde_yaml::from_str(document)?;
    Ok(InstallConfig {
        cluster_name: doc.metadata.name,
        platform: doc.platform.descriptor(),
    })
}

// =============================================================================
// Kubernetes Adapter
// =============================================================================

/// Reads the install config from the cluster
pub struct KubeInstallConfig {
    api: Api<ConfigMap>,
}

impl KubeInstallConfig {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::namespaced(client, INSTALL_CONFIG_NAMESPACE),
        }
    }
}

#[async_trait]
impl PlatformMetadata for KubeInstallConfig {
    async fn install_config(&self) -> Result<InstallConfig> {
        let cm = self
            .api
            .get(INSTALL_CONFIG_NAME)
            .await
            .map_err(|e| Error::from_kube("ConfigMap", INSTALL_CONFIG_NAME, e))?;

        let document = cm
            .data
            .as_ref()
            .and_then(|data| data.get(INSTALL_CONFIG_KEY))
            .ok_or_else(|| {
                Error::PlatformDetection(format!(
                    "configmap {}/{} has no {} key",
                    INSTALL_CONFIG_NAMESPACE, INSTALL_CONFIG_NAME, INSTALL_CONFIG_KEY
                ))
            })?;

        let config = parse_install_config(document)?;
        debug!(platform = %config.platform, "Read cluster install config");
        Ok(config)
    }
}
