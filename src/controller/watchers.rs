//! Kubernetes resource watchers
//!
//! One [`KindWatcher`] per watched kind, each backed by a reflector store
//! that doubles as the controller's read cache. Every add, update and delete
//! is translated into a typed [`WatchEvent`] and handed to a shared callback.

use super::checksum::{checksum, stored_checksum};
use super::events::{controller_owner, EventSubject, ResourceKind, WatchAction, WatchEvent};
use crate::crd::ImageRegistry;
use crate::domain::ports::Lister;
use crate::error::{Error, Result};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Callback shared by every watcher. Must not block.
pub type EventCallback = Arc<dyn Fn(WatchEvent) + Send + Sync>;

// =============================================================================
// Watched Kinds
// =============================================================================

/// A kind the operator watches, with its event subject
pub trait WatchedKind:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
    const KIND: ResourceKind;

    fn subject(&self) -> EventSubject {
        EventSubject::Owned {
            owner: controller_owner(self.meta()),
        }
    }
}

impl WatchedKind for ImageRegistry {
    const KIND: ResourceKind = ResourceKind::ImageRegistry;

    fn subject(&self) -> EventSubject {
        let computed = match checksum(self) {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!(error = %e, "Unable to fingerprint ImageRegistry");
                None
            }
        };
        EventSubject::Managed {
            computed,
            stored: stored_checksum(self).map(String::from),
            deleting: self.is_deleting(),
        }
    }
}

impl WatchedKind for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;
}

impl WatchedKind for Service {
    const KIND: ResourceKind = ResourceKind::Service;
}

impl WatchedKind for Secret {
    const KIND: ResourceKind = ResourceKind::Secret;
}

impl WatchedKind for ConfigMap {
    const KIND: ResourceKind = ResourceKind::ConfigMap;
}

impl WatchedKind for ServiceAccount {
    const KIND: ResourceKind = ResourceKind::ServiceAccount;
}

// =============================================================================
// Kind Watcher
// =============================================================================

/// Watcher and cache for one kind in the operator namespace
pub struct KindWatcher<K: WatchedKind> {
    api: Api<K>,
    store: Store<K>,
    writer: Mutex<Option<Writer<K>>>,
    synced: Arc<AtomicBool>,
}

impl<K: WatchedKind> KindWatcher<K> {
    pub fn new(api: Api<K>) -> Self {
        let (store, writer) = reflector::store();
        Self {
            api,
            store,
            writer: Mutex::new(Some(writer)),
            synced: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start watching. Events are delivered to `callback` until `token` is
    /// cancelled. A watcher can only be started once.
    pub fn start(&self, callback: EventCallback, token: CancellationToken) -> Result<JoinHandle<()>> {
        let mut writer = self
            .writer
            .lock()
            .take()
            .ok_or_else(|| Error::Internal(format!("{} watcher already started", K::KIND)))?;

        let store = self.store.clone();
        let synced = Arc::clone(&self.synced);
        let mut stream = watcher(self.api.clone(), watcher::Config::default())
            .default_backoff()
            .boxed();

        Ok(tokio::spawn(async move {
            info!(kind = %K::KIND, "Starting watcher");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = stream.next() => match next {
                        Some(Ok(event)) => {
                            if matches!(event, watcher::Event::Restarted(_)) {
                                synced.store(true, Ordering::Release);
                            }
                            for ev in translate_event(&store, &mut writer, &event) {
                                debug!(event = %ev, "Watch event");
                                callback(ev);
                            }
                        }
                        Some(Err(e)) => warn!(kind = %K::KIND, error = %e, "Watch stream error"),
                        None => break,
                    }
                }
            }
            info!(kind = %K::KIND, "Watcher stopped");
        }))
    }

    /// Whether the initial list has been received
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

impl<K: WatchedKind> Lister<K> for KindWatcher<K> {
    fn get(&self, name: &str, namespace: &str) -> Result<Arc<K>> {
        self.store
            .get(&ObjectRef::new(name).within(namespace))
            .ok_or_else(|| Error::ResourceNotFound {
                kind: K::KIND.to_string(),
                name: name.to_string(),
            })
    }
}

/// Apply a raw watcher event to the cache and translate it.
/// Add and update are told apart by cache presence; objects missing from a
/// relist are reported as deleted.
fn translate_event<K: WatchedKind>(
    store: &Store<K>,
    writer: &mut Writer<K>,
    event: &watcher::Event<K>,
) -> Vec<WatchEvent> {
    match event {
        watcher::Event::Applied(obj) => {
            let existed = store.get(&ObjectRef::from_obj(obj)).is_some();
            writer.apply_watcher_event(event);
            let action = if existed {
                WatchAction::Updated
            } else {
                WatchAction::Added
            };
            vec![WatchEvent::new(K::KIND, action, obj, obj.subject())]
        }
        watcher::Event::Deleted(obj) => {
            writer.apply_watcher_event(event);
            vec![WatchEvent::new(K::KIND, WatchAction::Deleted, obj, obj.subject())]
        }
        watcher::Event::Restarted(objs) => {
            let before = store.state();
            let known: HashSet<ObjectRef<K>> =
                before.iter().map(|o| ObjectRef::from_obj(o.as_ref())).collect();
            let listed: HashSet<ObjectRef<K>> = objs.iter().map(ObjectRef::from_obj).collect();
            writer.apply_watcher_event(event);

            let mut events: Vec<WatchEvent> = objs
                .iter()
                .map(|obj| {
                    let action = if known.contains(&ObjectRef::from_obj(obj)) {
                        WatchAction::Updated
                    } else {
                        WatchAction::Added
                    };
                    WatchEvent::new(K::KIND, action, obj, obj.subject())
                })
                .collect();

            events.extend(
                before
                    .iter()
                    .filter(|o| !listed.contains(&ObjectRef::from_obj(o.as_ref())))
                    .map(|o| {
                        WatchEvent::new(K::KIND, WatchAction::Deleted, o.as_ref(), o.subject())
                    }),
            );
            events
        }
    }
}

// =============================================================================
// Watcher Registry
// =============================================================================

/// Every watcher the controller needs, constructed once
pub struct Watchers {
    pub registries: Arc<KindWatcher<ImageRegistry>>,
    pub deployments: Arc<KindWatcher<Deployment>>,
    pub services: Arc<KindWatcher<Service>>,
    pub secrets: Arc<KindWatcher<Secret>>,
    pub config_maps: Arc<KindWatcher<ConfigMap>>,
    pub service_accounts: Arc<KindWatcher<ServiceAccount>>,
}

impl Watchers {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            registries: Arc::new(KindWatcher::new(Api::namespaced(client.clone(), namespace))),
            deployments: Arc::new(KindWatcher::new(Api::namespaced(client.clone(), namespace))),
            services: Arc::new(KindWatcher::new(Api::namespaced(client.clone(), namespace))),
            secrets: Arc::new(KindWatcher::new(Api::namespaced(client.clone(), namespace))),
            config_maps: Arc::new(KindWatcher::new(Api::namespaced(client.clone(), namespace))),
            service_accounts: Arc::new(KindWatcher::new(Api::namespaced(client, namespace))),
        }
    }

    /// Start every watcher against the same callback
    pub fn start(&self, callback: EventCallback, token: CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        Ok(vec![
            self.registries.start(Arc::clone(&callback), token.clone())?,
            self.deployments.start(Arc::clone(&callback), token.clone())?,
            self.services.start(Arc::clone(&callback), token.clone())?,
            self.secrets.start(Arc::clone(&callback), token.clone())?,
            self.config_maps.start(Arc::clone(&callback), token.clone())?,
            self.service_accounts.start(callback, token)?,
        ])
    }

    pub fn has_synced(&self) -> bool {
        self.registries.has_synced()
            && self.deployments.has_synced()
            && self.services.has_synced()
            && self.secrets.has_synced()
            && self.config_maps.has_synced()
            && self.service_accounts.has_synced()
    }
}
