//! ImageRegistry reconciler
//!
//! One pass fetches the object fresh, drives it toward its management state
//! and writes it back only when the fingerprint moved:
//! 1. Deletion in progress: tear down, then drop the finalizer
//! 2. Managed/Force: resolve storage, validate, provision, apply children
//! 3. Unmanaged: nothing
//! 4. Removed: tear down and report Removed

use super::checksum::{checksum, set_checksum, stored_checksum};
use super::conditions::{condition_message, condition_status, set_condition};
use super::finalizers::{add_finalizer, remove_finalizer};
use crate::crd::{ConditionStatus, ConditionType, ImageRegistry, ImageRegistrySpec, ManagementState};
use crate::domain::ports::{
    ClusterStatusHandlerRef, Lister, ManifestGeneratorRef, PlatformMetadataRef, RegistryApiRef,
};
use crate::error::{Error, Result};
use crate::metrics::{ControllerMetrics, WRITE_CONFLICT, WRITE_SKIPPED, WRITE_WRITTEN};
use crate::parameters::OperatorParams;
use crate::storage::{self, configured_drivers, DriverContext};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Collaborators a reconciler drives
#[derive(Clone)]
pub struct Collaborators {
    pub api: RegistryApiRef,
    pub generator: ManifestGeneratorRef,
    pub cluster_status: ClusterStatusHandlerRef,
    pub platform: PlatformMetadataRef,
    pub drivers: DriverContext,
    pub deployments: Arc<dyn Lister<Deployment>>,
    pub services: Arc<dyn Lister<Service>>,
}

/// Rollout state of the registry deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rollout {
    desired: i32,
    updated: i32,
    available: i32,
    observed: bool,
}

impl Rollout {
    fn of(deployment: &Deployment) -> Self {
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let status = deployment.status.clone().unwrap_or_default();
        let observed = match (status.observed_generation, deployment.metadata.generation) {
            (Some(seen), Some(current)) => seen >= current,
            (_, None) => true,
            (None, Some(_)) => false,
        };
        Self {
            desired,
            updated: status.updated_replicas.unwrap_or(0),
            available: status.available_replicas.unwrap_or(0),
            observed,
        }
    }

    fn complete(&self) -> bool {
        self.observed && self.updated >= self.desired && self.available >= self.desired
    }
}

pub struct Reconciler {
    params: Arc<OperatorParams>,
    deps: Collaborators,
    metrics: Arc<ControllerMetrics>,
}

impl Reconciler {
    pub fn new(params: Arc<OperatorParams>, deps: Collaborators, metrics: Arc<ControllerMetrics>) -> Self {
        Self {
            params,
            deps,
            metrics,
        }
    }

    // =========================================================================
    // Reconcile Pass
    // =========================================================================

    /// Run one reconcile pass
    pub async fn sync(&self) -> Result<()> {
        let name = &self.params.resource_name;
        let Some(mut cr) = self.deps.api.get(name).await? else {
            info!(name = %name, "ImageRegistry not found, ignoring");
            return Ok(());
        };

        if cr.is_deleting() {
            return self.finalize(cr).await;
        }

        let original_finalizers = cr.finalizers().to_vec();
        let (changed, result) = match cr.spec.management_state {
            ManagementState::Managed | ManagementState::Force => {
                let applied = self.create_or_update(&mut cr).await;
                // a failed step may already have mutated the object; the
                // checksum gate decides whether that is worth a write
                let step_changed = applied.as_ref().map_or(true, |changed| *changed);
                let applied = applied.map(|_| ());
                let status_changed = self.sync_status(&mut cr, applied.as_ref().err());
                (step_changed || status_changed, applied)
            }
            ManagementState::Unmanaged => {
                debug!(name = %name, "ImageRegistry is unmanaged, nothing to do");
                return Ok(());
            }
            ManagementState::Removed => self.remove_state(&mut cr).await,
        };

        let written = if changed {
            self.write(&mut cr, &original_finalizers).await?
        } else {
            self.metrics.observe_write(WRITE_SKIPPED);
            false
        };

        if written {
            self.report(&cr).await;
        }

        result
    }

    /// Bring the managed state in line with the spec. Returns true if the
    /// object was modified.
    pub async fn create_or_update(&self, cr: &mut ImageRegistry) -> Result<bool> {
        let mut changed = set_condition(cr, ConditionType::Removed, ConditionStatus::False, "Managed", "");
        changed |= add_finalizer(cr);

        let name = cr.name_any();
        if name != self.params.resource_name {
            return Err(Error::Configuration(format!(
                "ImageRegistry must be named {:?}, got {:?}",
                self.params.resource_name, name
            )));
        }

        let (mut driver, inferred) =
            storage::resolve(cr, &self.deps.drivers, self.deps.platform.as_ref()).await?;
        changed |= inferred;

        changed |= driver.validate_configuration(cr)?;

        if driver.storage_changed(cr) {
            info!(backend = %driver.kind(), "Storage configuration changed, ensuring backend storage");
            changed |= driver.create_storage(cr).await?;
        }

        changed |= self.deps.generator.apply(cr, driver.as_ref()).await?;
        Ok(changed)
    }

    /// Derive status from the apply result and the live children.
    /// Returns true if the status changed.
    pub fn sync_status(&self, cr: &mut ImageRegistry, apply_error: Option<&Error>) -> bool {
        let namespace = &self.params.namespace;
        let mut changed = false;

        if apply_error.is_none() {
            if let Ok(service) = self.deps.services.get(&self.params.service_name, namespace) {
                let port = service
                    .spec
                    .as_ref()
                    .and_then(|s| s.ports.as_ref())
                    .and_then(|ports| ports.first())
                    .map(|p| p.port)
                    .unwrap_or(self.params.container_port);
                let hostname = format!("{}.{}.svc.cluster.local:{}", service.name_any(), namespace, port);
                let status = cr.status_mut();
                if status.internal_registry_hostname.as_deref() != Some(hostname.as_str()) {
                    status.internal_registry_hostname = Some(hostname);
                    changed = true;
                }
            }
        }

        let rollout = self
            .deps
            .deployments
            .get(&self.params.resource_name, namespace)
            .ok()
            .map(|d| Rollout::of(&d));

        match (apply_error, rollout) {
            (Some(err), rollout) => {
                let message = err.to_string();
                let (reason, progressing) = if err.is_permanent() {
                    ("InvalidConfiguration", ConditionStatus::False)
                } else {
                    ("Error", ConditionStatus::True)
                };
                changed |= set_condition(cr, ConditionType::Failing, ConditionStatus::True, reason, &message);
                changed |= set_condition(cr, ConditionType::Progressing, progressing, reason, &message);

                let available = rollout.map_or(false, |r| r.available > 0);
                changed |= if available {
                    set_condition(cr, ConditionType::Available, ConditionStatus::True, "Ready", "the registry is serving")
                } else {
                    set_condition(cr, ConditionType::Available, ConditionStatus::False, "Unavailable", &message)
                };
            }
            (None, None) => {
                changed |= set_condition(cr, ConditionType::Failing, ConditionStatus::False, "AsExpected", "");
                changed |= set_condition(
                    cr,
                    ConditionType::Available,
                    ConditionStatus::False,
                    "DeploymentNotFound",
                    "the deployment does not exist",
                );
                changed |= set_condition(
                    cr,
                    ConditionType::Progressing,
                    ConditionStatus::True,
                    "Creating",
                    "the deployment is being created",
                );
            }
            (None, Some(rollout)) if rollout.complete() => {
                changed |= set_condition(cr, ConditionType::Failing, ConditionStatus::False, "AsExpected", "");
                changed |= set_condition(cr, ConditionType::Available, ConditionStatus::True, "Ready", "the registry is ready");
                changed |= set_condition(cr, ConditionType::Progressing, ConditionStatus::False, "Ready", "the registry is ready");
            }
            (None, Some(rollout)) => {
                let message = format!(
                    "{} of {} replicas updated, {} available",
                    rollout.updated, rollout.desired, rollout.available
                );
                changed |= set_condition(cr, ConditionType::Failing, ConditionStatus::False, "AsExpected", "");
                changed |= if rollout.available > 0 {
                    set_condition(cr, ConditionType::Available, ConditionStatus::True, "MinimumAvailability", &message)
                } else {
                    set_condition(cr, ConditionType::Available, ConditionStatus::False, "NoReplicasAvailable", &message)
                };
                changed |= set_condition(cr, ConditionType::Progressing, ConditionStatus::True, "RollingOut", &message);
            }
        }

        let generation = cr.metadata.generation;
        let status = cr.status_mut();
        if generation.is_some() && status.observed_generation != generation {
            status.observed_generation = generation;
            changed = true;
        }

        changed
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Remove operator-created storage and every child resource.
    /// Returns true if the object was modified.
    pub async fn remove_resources(&self, cr: &mut ImageRegistry) -> Result<bool> {
        let source = cr
            .status
            .as_ref()
            .and_then(|s| s.storage.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| cr.spec.storage.clone());

        let mut changed = false;
        for driver in configured_drivers(&source, &self.deps.drivers) {
            if driver.storage_exists(cr).await? {
                changed |= driver.remove_storage(cr).await?;
            }
        }

        self.deps.generator.remove(cr).await?;
        Ok(changed)
    }

    async fn remove_state(&self, cr: &mut ImageRegistry) -> (bool, Result<()>) {
        match self.remove_resources(cr).await {
            Ok(storage_changed) => {
                let mut changed = storage_changed;
                changed |= set_condition(cr, ConditionType::Removed, ConditionStatus::True, "Removed", "the registry is removed");
                changed |= set_condition(cr, ConditionType::Available, ConditionStatus::False, "Removed", "the registry is removed");
                changed |= set_condition(cr, ConditionType::Progressing, ConditionStatus::False, "Removed", "the registry is removed");
                changed |= set_condition(cr, ConditionType::Failing, ConditionStatus::False, "Removed", "");
                (changed, Ok(()))
            }
            Err(e) => {
                error!(error = %e, "Unable to remove registry resources");
                let message = format!("unable to remove registry: {}", e);
                if let Err(status_err) = self
                    .deps
                    .cluster_status
                    .update(ConditionType::Failing, ConditionStatus::True, &message)
                    .await
                {
                    warn!(error = %status_err, "Unable to update cluster operator status");
                }
                let mut changed = set_condition(cr, ConditionType::Failing, ConditionStatus::True, "Error", &message);
                changed |= set_condition(cr, ConditionType::Progressing, ConditionStatus::True, "Removing", &message);
                (changed, Err(e))
            }
        }
    }

    /// Deletion path: tear down, then release the object
    pub async fn finalize(&self, mut cr: ImageRegistry) -> Result<()> {
        info!(name = %cr.name_any(), "ImageRegistry is being deleted, removing resources");
        self.remove_resources(&mut cr).await?;

        if !remove_finalizer(&mut cr) {
            return Ok(());
        }

        match self.deps.api.update(&cr).await {
            Ok(_) => {
                info!(name = %cr.name_any(), "Finalizer removed");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                warn!(name = %cr.name_any(), "Conflicting update while removing finalizer");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Write-back
    // =========================================================================

    /// Write the object if its fingerprint or finalizers moved.
    /// Returns true if a write happened.
    async fn write(&self, cr: &mut ImageRegistry, original_finalizers: &[String]) -> Result<bool> {
        let digest = checksum(cr)?;
        let finalizers_changed = cr.finalizers() != original_finalizers;
        if !finalizers_changed && stored_checksum(cr) == Some(digest.as_str()) {
            debug!("ImageRegistry fingerprint unchanged, skipping write");
            self.metrics.observe_write(WRITE_SKIPPED);
            return Ok(false);
        }

        set_checksum(cr, digest);
        match self.deps.api.update(cr).await {
            Ok(_) => {
                debug!(name = %cr.name_any(), "ImageRegistry updated");
                self.metrics.observe_write(WRITE_WRITTEN);
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                warn!(name = %cr.name_any(), "Conflicting ImageRegistry update, dropping it");
                self.metrics.observe_write(WRITE_CONFLICT);
                Ok(false)
            }
            Err(e) => {
                error!(error = %e, "Unable to update ImageRegistry");
                Err(e)
            }
        }
    }

    /// Mirror coarse health to the cluster operator status
    async fn report(&self, cr: &ImageRegistry) {
        for type_ in [ConditionType::Available, ConditionType::Progressing, ConditionType::Failing] {
            let status = condition_status(cr, type_);
            let message = condition_message(cr, type_);
            if let Err(e) = self.deps.cluster_status.update(type_, status, &message).await {
                warn!(condition = %type_, error = %e, "Unable to update cluster operator status");
            }
        }
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Ensure the cluster operator status object exists
    pub async fn create_cluster_status(&self) -> Result<()> {
        self.deps.cluster_status.create().await
    }

    /// Create the default ImageRegistry when none exists
    pub async fn bootstrap(&self) -> Result<()> {
        let name = &self.params.resource_name;
        if self.deps.api.get(name).await?.is_some() {
            return Ok(());
        }

        let mut cr = ImageRegistry::new(name, ImageRegistrySpec::default());
        cr.metadata.namespace = Some(self.params.namespace.clone());

        info!(name = %name, "Bootstrapping default ImageRegistry");
        match self.deps.api.create(&cr).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
