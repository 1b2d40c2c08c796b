//! Registry Deployment builder

use super::{child_meta, standard_labels};
use crate::crd::ImageRegistry;
use crate::error::Result;
use crate::parameters::OperatorParams;
use crate::storage::Driver;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

const CONTAINER_NAME: &str = "registry";

fn probe(params: &OperatorParams, initial_delay: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(params.healthz_route.clone()),
            port: IntOrString::Int(params.container_port),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        timeout_seconds: Some(params.healthz_timeout_secs),
        ..Default::default()
    }
}

fn base_env(registry: &ImageRegistry, params: &OperatorParams) -> Vec<EnvVar> {
    let mut vars = vec![
        EnvVar {
            name: "REGISTRY_HTTP_ADDR".to_string(),
            value: Some(format!(":{}", params.container_port)),
            value_from: None,
        },
        EnvVar {
            name: "REGISTRY_HTTP_NET".to_string(),
            value: Some("tcp".to_string()),
            value_from: None,
        },
    ];
    if let Some(level) = registry.spec.log_level.as_deref().filter(|l| !l.is_empty()) {
        vars.push(EnvVar {
            name: "REGISTRY_LOG_LEVEL".to_string(),
            value: Some(level.to_string()),
            value_from: None,
        });
    }
    vars
}

/// Deployment running the registry against the driver's storage
pub fn build_deployment(
    registry: &ImageRegistry,
    params: &OperatorParams,
    driver: &dyn Driver,
) -> Result<Deployment> {
    let mut env = base_env(registry, params);
    env.extend(driver.config_env()?);
    let (volumes, volume_mounts) = driver.volumes()?;

    let requests = BTreeMap::from([
        ("cpu".to_string(), Quantity("100m".to_string())),
        ("memory".to_string(), Quantity("256Mi".to_string())),
    ]);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(registry.spec.image.clone()),
        ports: Some(vec![ContainerPort {
            container_port: params.container_port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env),
        volume_mounts: Some(volume_mounts).filter(|m| !m.is_empty()),
        liveness_probe: Some(probe(params, 10)),
        readiness_probe: Some(probe(params, 15)),
        resources: Some(ResourceRequirements {
            requests: Some(requests),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: child_meta(registry, params, &params.resource_name),
        spec: Some(DeploymentSpec {
            replicas: Some(registry.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(params.labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(standard_labels(params)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(params.service_account.clone()),
                    containers: vec![container],
                    volumes: Some(volumes).filter(|v| !v.is_empty()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PvcStorage, S3Storage};
    use crate::storage::{PvcDriver, S3Driver};
    use crate::testing::{driver_context, registry};

    fn container(deployment: &Deployment) -> &Container {
        &deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
    }

    #[test]
    fn test_deployment_carries_driver_env_and_probes() {
        let params = OperatorParams::default();
        let mut cr = registry("image-registry");
        cr.spec.replicas = 2;
        cr.spec.log_level = Some("debug".into());
        let driver = S3Driver::new(
            S3Storage {
                bucket: "registry-bucket".into(),
                region: "us-east-1".into(),
                ..Default::default()
            },
            driver_context(),
        );

        let deployment = build_deployment(&cr, &params, &driver).unwrap();
        assert_eq!(deployment.spec.as_ref().unwrap().replicas, Some(2));

        let c = container(&deployment);
        assert_eq!(c.image.as_deref(), Some("docker.io/library/registry:2.8"));
        let env = c.env.as_ref().unwrap();
        let value = |name: &str| env.iter().find(|e| e.name == name).and_then(|e| e.value.clone());
        assert_eq!(value("REGISTRY_STORAGE").as_deref(), Some("s3"));
        assert_eq!(value("REGISTRY_HTTP_ADDR").as_deref(), Some(":5000"));
        assert_eq!(value("REGISTRY_LOG_LEVEL").as_deref(), Some("debug"));

        let probe = c.readiness_probe.as_ref().unwrap();
        let http = probe.http_get.as_ref().unwrap();
        assert_eq!(http.path.as_deref(), Some("/healthz"));
        assert_eq!(http.port, IntOrString::Int(5000));
        assert_eq!(probe.timeout_seconds, Some(5));
        assert!(c.volume_mounts.is_none());
    }

    #[test]
    fn test_pvc_driver_mounts_claim() {
        let params = OperatorParams::default();
        let driver = PvcDriver::new(
            PvcStorage {
                claim: "registry".into(),
                ..Default::default()
            },
            driver_context(),
        );

        let deployment = build_deployment(&registry("image-registry"), &params, &driver).unwrap();
        let pod = deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some("registry"));
        assert_eq!(pod.volumes.as_ref().unwrap().len(), 1);
        assert_eq!(container(&deployment).volume_mounts.as_ref().unwrap()[0].mount_path, "/registry");
    }
}
