//! ImageRegistry controller
//!
//! - [`watchers`]: typed watch streams and their caches
//! - [`queue`]: single-key work queue with backoff
//! - [`operator`]: event filter and worker loop
//! - [`reconciler`]: one reconcile pass over the managed object
//! - [`client`], [`status`]: API server adapters

pub mod checksum;
pub mod client;
pub mod conditions;
pub mod events;
pub mod finalizers;
pub mod operator;
pub mod queue;
pub mod reconciler;
pub mod status;
pub mod watchers;

pub use client::KubeRegistryApi;
pub use events::{ControllerOwner, EventSubject, ResourceKind, WatchAction, WatchEvent};
pub use operator::Controller;
pub use queue::{BackoffConfig, WorkQueue};
pub use reconciler::{Collaborators, Reconciler};
pub use status::KubeStatusHandler;
pub use watchers::{EventCallback, KindWatcher, Watchers};
