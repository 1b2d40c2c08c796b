//! Image Registry Operator
//!
//! A Kubernetes operator that reconciles a singleton `ImageRegistry`
//! resource into a running registry Deployment backed by exactly one
//! storage backend, inferring the backend from the cluster platform when
//! none is configured.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             Watchers                                 │
//! │  ImageRegistry · Deployment · Service · Secret · ConfigMap · SA      │
//! └───────────────────────────────┬─────────────────────────────────────┘
//!                                 │ typed WatchEvent
//!                     ┌───────────┴───────────┐
//!                     │  Filter + Work Queue  │
//!                     │  (single key, backoff)│
//!                     └───────────┬───────────┘
//!                                 │
//! ┌───────────────────────────────┴─────────────────────────────────────┐
//! │                            Reconciler                                │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐ │
//! │  │ Storage Driver │  │   Manifest     │  │  Status + Cluster      │ │
//! │  │   Resolution   │  │   Generator    │  │  Operator Reporting    │ │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘ │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │   EmptyDir │ S3 │ Swift │ GCS │ PVC │ Azure                          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controller`]: watchers, work queue, controller loop and reconciler
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: Core domain traits (ports)
//! - [`platform`]: install config reading and platform storage defaults
//! - [`resources`]: child resource builders and server-side apply
//! - [`storage`]: storage drivers and backends
//! - [`error`]: Error types and handling

pub mod controller;
pub mod crd;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod parameters;
pub mod platform;
pub mod resources;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use controller::{
    BackoffConfig, Collaborators, Controller, KubeRegistryApi, KubeStatusHandler, Reconciler,
    Watchers, WorkQueue,
};

pub use crd::{
    ClusterOperator, ConditionStatus, ConditionType, ImageRegistry, ImageRegistrySpec,
    ImageRegistryStatus, ManagementState, StorageConfig, StorageKind,
};

pub use domain::ports::{
    ClusterStatusHandler, Lister, ManifestGenerator, PlatformMetadata, RegistryApi,
    StorageBackend, StorageLocation,
};

pub use error::{Error, ErrorClass, Result};

pub use metrics::ControllerMetrics;

pub use parameters::OperatorParams;

pub use platform::{InstallConfig, KubeInstallConfig, PlatformDescriptor};

pub use resources::KubeGenerator;

pub use storage::{Driver, DriverContext, InMemoryBackend, KubeVolumeClaims};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
