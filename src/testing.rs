//! In-memory doubles for the domain ports

use crate::controller::reconciler::{Collaborators, Reconciler};
use crate::crd::{ConditionStatus, ConditionType, ImageRegistry, ImageRegistrySpec, StorageKind};
use crate::domain::ports::{
    ClusterStatusHandler, Lister, ManifestGenerator, PlatformMetadata, RegistryApi, StorageBackend,
    StorageLocation,
};
use crate::error::{Error, Result};
use crate::metrics::ControllerMetrics;
use crate::parameters::OperatorParams;
use crate::platform::{InstallConfig, PlatformDescriptor};
use crate::storage::{Driver, DriverContext};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

pub fn registry(name: &str) -> ImageRegistry {
    let mut cr = ImageRegistry::new(name, ImageRegistrySpec::default());
    cr.metadata.namespace = Some(OperatorParams::default().namespace);
    cr.metadata.uid = Some("3f2a9c1e-7b41-4d2e-9a65-0c1d2e3f4a5b".into());
    cr.metadata.generation = Some(1);
    cr.metadata.resource_version = Some("1".into());
    cr
}

pub fn driver_context() -> DriverContext {
    driver_context_with(Arc::new(RecordingBackend::default()))
}

pub fn driver_context_with(backend: Arc<RecordingBackend>) -> DriverContext {
    DriverContext {
        params: Arc::new(OperatorParams::default()),
        object_store: backend.clone(),
        volume_claims: backend,
        credentials: Arc::new(BTreeMap::new()),
    }
}

/// Registry Deployment with the given rollout counters
pub fn deployment(desired: i32, updated: i32, available: i32) -> Deployment {
    let params = OperatorParams::default();
    Deployment {
        metadata: ObjectMeta {
            name: Some(params.resource_name.clone()),
            namespace: Some(params.namespace.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(desired),
            ..Default::default()
        }),
        status: Some(DeploymentStatus {
            replicas: Some(desired),
            updated_replicas: Some(updated),
            available_replicas: Some(available),
            ..Default::default()
        }),
    }
}

pub fn registry_service() -> Service {
    let params = OperatorParams::default();
    Service {
        metadata: ObjectMeta {
            name: Some(params.service_name.clone()),
            namespace: Some(params.namespace.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port: params.container_port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

// =============================================================================
// Storage Backend
// =============================================================================

/// Set-backed storage backend counting mutations
#[derive(Default)]
pub struct RecordingBackend {
    locations: Mutex<HashSet<StorageLocation>>,
    creates: AtomicUsize,
    deletes: AtomicUsize,
    fail_deletes: AtomicBool,
}

impl RecordingBackend {
    /// Pre-existing location the operator did not create
    pub fn seed(&self, location: StorageLocation) {
        self.locations.lock().insert(location);
    }

    pub fn contains(&self, location: &StorageLocation) -> bool {
        self.locations.lock().contains(location)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    async fn exists(&self, location: &StorageLocation) -> Result<bool> {
        Ok(self.contains(location))
    }

    async fn create(&self, location: &StorageLocation) -> Result<bool> {
        let created = self.locations.lock().insert(location.clone());
        if created {
            self.creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(created)
    }

    async fn delete(&self, location: &StorageLocation) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::BackendOperationFailed {
                backend: "recording".into(),
                operation: "delete".into(),
                reason: "backend unavailable".into(),
            });
        }
        if self.locations.lock().remove(location) {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "recording"
    }
}

// =============================================================================
// Platform
// =============================================================================

pub struct StaticPlatform {
    platform: Option<PlatformDescriptor>,
}

impl StaticPlatform {
    pub fn new(platform: PlatformDescriptor) -> Self {
        Self {
            platform: Some(platform),
        }
    }

    /// Platform whose install config can not be read
    pub fn failing() -> Self {
        Self { platform: None }
    }
}

#[async_trait]
impl PlatformMetadata for StaticPlatform {
    async fn install_config(&self) -> Result<InstallConfig> {
        match &self.platform {
            Some(platform) => Ok(InstallConfig::new(platform.clone())),
            None => Err(Error::ResourceNotFound {
                kind: "ConfigMap".into(),
                name: "cluster-config-v1".into(),
            }),
        }
    }
}

// =============================================================================
// Registry API
// =============================================================================

/// Single-object API server double
#[derive(Default)]
pub struct MockRegistryApi {
    stored: Mutex<Option<(String, ImageRegistry)>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
    conflict_next: AtomicBool,
}

impl MockRegistryApi {
    pub fn put(&self, cr: ImageRegistry) {
        let key = cr.name_any();
        self.put_as(&key, cr);
    }

    /// Store an object under a key other than its name
    pub fn put_as(&self, key: &str, cr: ImageRegistry) {
        *self.stored.lock() = Some((key.to_string(), cr));
    }

    pub fn stored(&self) -> Option<ImageRegistry> {
        self.stored.lock().as_ref().map(|(_, cr)| cr.clone())
    }

    /// Request deletion of the stored object
    pub fn mark_deleted(&self) {
        if let Some((_, cr)) = self.stored.lock().as_mut() {
            cr.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        }
    }

    pub fn conflict_next_update(&self) {
        self.conflict_next.store(true, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryApi for MockRegistryApi {
    async fn get(&self, name: &str) -> Result<Option<ImageRegistry>> {
        Ok(self
            .stored
            .lock()
            .as_ref()
            .filter(|(key, _)| key == name)
            .map(|(_, cr)| cr.clone()))
    }

    async fn create(&self, registry: &ImageRegistry) -> Result<ImageRegistry> {
        let mut stored = self.stored.lock();
        if stored.is_some() {
            return Err(Error::Conflict {
                kind: "ImageRegistry".into(),
                name: registry.name_any(),
            });
        }
        let mut cr = registry.clone();
        cr.metadata.resource_version = Some("1".into());
        *stored = Some((cr.name_any(), cr.clone()));
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(cr)
    }

    async fn update(&self, registry: &ImageRegistry) -> Result<ImageRegistry> {
        if self.conflict_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Conflict {
                kind: "ImageRegistry".into(),
                name: registry.name_any(),
            });
        }

        let mut stored = self.stored.lock();
        let Some((key, _)) = stored.as_ref() else {
            return Err(Error::ResourceNotFound {
                kind: "ImageRegistry".into(),
                name: registry.name_any(),
            });
        };
        let key = key.clone();

        let mut cr = registry.clone();
        let version = cr
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        cr.metadata.resource_version = Some((version + 1).to_string());
        self.updates.fetch_add(1, Ordering::SeqCst);

        if cr.metadata.deletion_timestamp.is_some() && cr.finalizers().is_empty() {
            *stored = None;
        } else {
            *stored = Some((key, cr.clone()));
        }
        Ok(cr)
    }
}

// =============================================================================
// Manifest Generator
// =============================================================================

/// Generator double reporting a change on the first apply only
#[derive(Default)]
pub struct MockGenerator {
    applies: AtomicUsize,
    removes: AtomicUsize,
    last_kind: Mutex<Option<StorageKind>>,
    fail_remove: AtomicBool,
}

impl MockGenerator {
    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn last_kind(&self) -> Option<StorageKind> {
        *self.last_kind.lock()
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ManifestGenerator for MockGenerator {
    async fn apply(&self, _registry: &ImageRegistry, driver: &dyn Driver) -> Result<bool> {
        driver.config_env()?;
        driver.volumes()?;
        *self.last_kind.lock() = Some(driver.kind());
        Ok(self.applies.fetch_add(1, Ordering::SeqCst) == 0)
    }

    async fn remove(&self, _registry: &ImageRegistry) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Error::Internal("remove failed".into()));
        }
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Cluster Status
// =============================================================================

#[derive(Default)]
pub struct MockStatus {
    created: AtomicBool,
    fail_create: AtomicBool,
    updates: Mutex<Vec<(ConditionType, ConditionStatus, String)>>,
}

impl MockStatus {
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> bool {
        self.created.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<(ConditionType, ConditionStatus, String)> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl ClusterStatusHandler for MockStatus {
    async fn create(&self) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Internal("create failed".into()));
        }
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, condition: ConditionType, status: ConditionStatus, message: &str) -> Result<()> {
        self.updates.lock().push((condition, status, message.to_string()));
        Ok(())
    }
}

// =============================================================================
// Cache Lister
// =============================================================================

pub struct StaticLister<K> {
    objects: Mutex<HashMap<(String, String), Arc<K>>>,
}

impl<K> Default for StaticLister<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: kube::Resource> StaticLister<K> {
    pub fn insert(&self, obj: K) {
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        self.objects.lock().insert(key, Arc::new(obj));
    }
}

impl<K: Send + Sync> Lister<K> for StaticLister<K> {
    fn get(&self, name: &str, namespace: &str) -> Result<Arc<K>> {
        self.objects
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: std::any::type_name::<K>().to_string(),
                name: name.to_string(),
            })
    }
}

// =============================================================================
// Reconciler Harness
// =============================================================================

/// Reconciler wired to in-memory doubles
pub struct Harness {
    pub params: Arc<OperatorParams>,
    pub api: Arc<MockRegistryApi>,
    pub generator: Arc<MockGenerator>,
    pub cluster_status: Arc<MockStatus>,
    pub backend: Arc<RecordingBackend>,
    pub deployments: Arc<StaticLister<Deployment>>,
    pub services: Arc<StaticLister<Service>>,
    pub metrics: Arc<ControllerMetrics>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_platform(PlatformDescriptor::None)
    }

    pub fn with_platform(platform: PlatformDescriptor) -> Self {
        let params = Arc::new(OperatorParams::default());
        let api = Arc::new(MockRegistryApi::default());
        let generator = Arc::new(MockGenerator::default());
        let cluster_status = Arc::new(MockStatus::default());
        let backend = Arc::new(RecordingBackend::default());
        let deployments = Arc::new(StaticLister::default());
        let services = Arc::new(StaticLister::default());
        let metrics = Arc::new(
            ControllerMetrics::new(&prometheus::Registry::new()).expect("metrics register"),
        );

        let mut drivers = driver_context_with(backend.clone());
        drivers.params = params.clone();

        let deps = Collaborators {
            api: api.clone(),
            generator: generator.clone(),
            cluster_status: cluster_status.clone(),
            platform: Arc::new(StaticPlatform::new(platform)),
            drivers,
            deployments: deployments.clone(),
            services: services.clone(),
        };
        let reconciler = Arc::new(Reconciler::new(params.clone(), deps, metrics.clone()));

        Self {
            params,
            api,
            generator,
            cluster_status,
            backend,
            deployments,
            services,
            metrics,
            reconciler,
        }
    }

    /// Seed a fully rolled out Deployment and the registry Service
    pub fn with_ready_children(self) -> Self {
        self.deployments.insert(deployment(1, 1, 1));
        self.services.insert(registry_service());
        self
    }
}
