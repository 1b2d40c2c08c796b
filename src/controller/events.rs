//! Typed watch events
//!
//! Watchers translate raw cluster notifications into [`WatchEvent`]s at the
//! boundary, so the controller's filter never inspects untyped objects.

use crate::crd::ImageRegistry;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::Serialize;

// =============================================================================
// Event Types
// =============================================================================

/// Kinds the operator watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    ImageRegistry,
    Deployment,
    Service,
    Secret,
    ConfigMap,
    ServiceAccount,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ImageRegistry => "ImageRegistry",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Secret => "Secret",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::ServiceAccount => "ServiceAccount",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened to the object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatchAction {
    Added,
    Updated,
    Deleted,
}

impl std::fmt::Display for WatchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchAction::Added => write!(f, "add"),
            WatchAction::Updated => write!(f, "update"),
            WatchAction::Deleted => write!(f, "delete"),
        }
    }
}

/// Controller owner reference of a child object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerOwner {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

impl ControllerOwner {
    /// Whether the owner is an ImageRegistry of this operator's API group
    pub fn is_registry(&self) -> bool {
        self.kind == ImageRegistry::kind(&()) && self.api_version == ImageRegistry::api_version(&())
    }
}

/// Event payload relevant to filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventSubject {
    /// The managed ImageRegistry itself
    Managed {
        /// Fingerprint of the observed spec+status
        computed: Option<String>,
        /// Fingerprint recorded by the last write
        stored: Option<String>,
        /// Deletion has been requested
        deleting: bool,
    },
    /// A child resource
    Owned { owner: Option<ControllerOwner> },
}

/// One watcher notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchEvent {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
    pub action: WatchAction,
    pub subject: EventSubject,
}

impl WatchEvent {
    /// Event for any watched object
    pub fn new<K: Resource>(kind: ResourceKind, action: WatchAction, obj: &K, subject: EventSubject) -> Self {
        Self {
            kind,
            name: obj.name_any(),
            namespace: obj.namespace(),
            action,
            subject,
        }
    }
}

impl std::fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {} {}/{}", self.action, self.kind, ns, self.name),
            None => write!(f, "{} {} {}", self.action, self.kind, self.name),
        }
    }
}

/// Controller owner of an object, if any
pub fn controller_owner(meta: &ObjectMeta) -> Option<ControllerOwner> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
        .map(|r| ControllerOwner {
            api_version: r.api_version.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
        })
}
