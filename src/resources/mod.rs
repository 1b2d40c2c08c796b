//! Registry child resources
//!
//! Pure builders for every object the operator owns, plus the
//! [`KubeGenerator`] that server-side-applies them.

pub mod deployment;
pub mod generator;

pub use deployment::build_deployment;
pub use generator::KubeGenerator;

use crate::crd::ImageRegistry;
use crate::parameters::OperatorParams;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Field manager for server-side apply
pub const FIELD_MANAGER: &str = "image-registry-operator";

/// Controller owner reference to the ImageRegistry
pub fn owner_reference(registry: &ImageRegistry) -> OwnerReference {
    OwnerReference {
        api_version: ImageRegistry::api_version(&()).to_string(),
        kind: ImageRegistry::kind(&()).to_string(),
        name: registry.name_any(),
        uid: registry.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Labels on every child resource
pub fn standard_labels(params: &OperatorParams) -> BTreeMap<String, String> {
    let mut labels = params.labels.clone();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        params.operator_name.clone(),
    );
    labels
}

pub(crate) fn child_meta(registry: &ImageRegistry, params: &OperatorParams, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(params.namespace.clone()),
        labels: Some(standard_labels(params)),
        owner_references: Some(vec![owner_reference(registry)]),
        ..Default::default()
    }
}

pub fn build_service_account(registry: &ImageRegistry, params: &OperatorParams) -> ServiceAccount {
    ServiceAccount {
        metadata: child_meta(registry, params, &params.service_account),
        ..Default::default()
    }
}

/// Storage credentials Secret from the driver's key mapping
pub fn build_secret(
    registry: &ImageRegistry,
    params: &OperatorParams,
    data: BTreeMap<String, String>,
) -> Secret {
    Secret {
        metadata: child_meta(registry, params, &params.secret_name),
        type_: Some("Opaque".to_string()),
        data: Some(
            data.into_iter()
                .map(|(k, v)| (k, ByteString(v.into_bytes())))
                .collect(),
        ),
        ..Default::default()
    }
}

pub fn build_service(registry: &ImageRegistry, params: &OperatorParams) -> Service {
    Service {
        metadata: child_meta(registry, params, &params.service_name),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(params.labels.clone()),
            ports: Some(vec![ServicePort {
                name: Some(format!("{}-tcp", params.container_port)),
                port: params.container_port,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(params.container_port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
