//! Operator runtime parameters
//!
//! Names, labels and ports shared by the controller, the manifest
//! generator and the storage drivers.

use std::collections::BTreeMap;

/// Annotation carrying the fingerprint of the last written spec+status
pub const CHECKSUM_ANNOTATION: &str = "registry.billyronks.io/checksum";

/// Finalizer token blocking removal until teardown completes
pub const FINALIZER: &str = "registry.billyronks.io/finalizer";

/// The only key ever placed on the work queue
pub const WORKQUEUE_KEY: &str = "changes";

/// Runtime parameters for one operator instance
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorParams {
    /// Namespace the operator watches and deploys into
    pub namespace: String,
    /// Name of the singleton ImageRegistry and its Deployment
    pub resource_name: String,
    /// Labels applied to every child resource and used as the pod selector
    pub labels: BTreeMap<String, String>,
    /// ServiceAccount the registry pods run as
    pub service_account: String,
    /// Registry container port
    pub container_port: i32,
    /// Health check route served by the registry
    pub healthz_route: String,
    /// Health probe timeout in seconds
    pub healthz_timeout_secs: i32,
    /// Name of the registry Service
    pub service_name: String,
    /// Name of the Secret holding storage credentials
    pub secret_name: String,
    /// Name of the ClusterOperator this operator reports on
    pub operator_name: String,
}

impl Default for OperatorParams {
    fn default() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("docker-registry".to_string(), "default".to_string());

        Self {
            namespace: "image-registry".to_string(),
            resource_name: "image-registry".to_string(),
            labels,
            service_account: "registry".to_string(),
            container_port: 5000,
            healthz_route: "/healthz".to_string(),
            healthz_timeout_secs: 5,
            service_name: "image-registry".to_string(),
            secret_name: "image-registry-private-configuration".to_string(),
            operator_name: "image-registry".to_string(),
        }
    }
}

impl OperatorParams {
    /// Parameters for a namespace and operator identity, defaults elsewhere
    pub fn new(namespace: impl Into<String>, operator_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            operator_name: operator_name.into(),
            ..Default::default()
        }
    }

    /// In-cluster hostname of the registry service
    pub fn internal_hostname(&self) -> String {
        format!(
            "{}.{}.svc.cluster.local:{}",
            self.service_name, self.namespace, self.container_port
        )
    }

    /// Label selector string matching the registry pods
    pub fn label_selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_hostname() {
        let params = OperatorParams::new("openshift-image-registry", "image-registry");
        assert_eq!(
            params.internal_hostname(),
            "image-registry.openshift-image-registry.svc.cluster.local:5000"
        );
    }

    #[test]
    fn test_label_selector() {
        let params = OperatorParams::default();
        assert_eq!(params.label_selector(), "docker-registry=default");
    }
}
