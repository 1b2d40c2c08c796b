//! Controller loop
//!
//! Watch callbacks filter events and mark the single queue key; one worker
//! drains the queue and runs reconcile passes until shutdown.

use super::events::{EventSubject, WatchAction, WatchEvent};
use super::queue::WorkQueue;
use super::reconciler::Reconciler;
use super::watchers::{EventCallback, Watchers};
use crate::error::Result;
use crate::metrics::{ControllerMetrics, EVENT_ENQUEUED, EVENT_FILTERED};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why an event does not warrant a pass, if it does not
fn filter_reason(event: &WatchEvent) -> Option<&'static str> {
    match &event.subject {
        EventSubject::Managed {
            computed,
            stored,
            deleting,
        } => {
            if *deleting || event.action == WatchAction::Deleted {
                return None;
            }
            match (computed, stored) {
                (Some(computed), Some(stored)) if computed == stored => Some("own write"),
                _ => None,
            }
        }
        EventSubject::Owned { owner } => match owner {
            Some(owner) if owner.is_registry() => None,
            Some(_) => Some("foreign controller owner"),
            None => Some("no controller owner"),
        },
    }
}

pub struct Controller {
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    metrics: Arc<ControllerMetrics>,
}

impl Controller {
    pub fn new(reconciler: Arc<Reconciler>, queue: Arc<WorkQueue>, metrics: Arc<ControllerMetrics>) -> Arc<Self> {
        Arc::new(Self {
            reconciler,
            queue,
            metrics,
        })
    }

    /// Filter a watch event and enqueue a pass if it warrants one
    pub fn handle(&self, event: WatchEvent) {
        if let Some(reason) = filter_reason(&event) {
            debug!(event = %event, reason, "Ignoring event");
            self.metrics.observe_event(event.kind.as_str(), EVENT_FILTERED);
            return;
        }

        debug!(event = %event, "Add event to work queue");
        self.metrics.observe_event(event.kind.as_str(), EVENT_ENQUEUED);
        self.queue.add_rate_limited();
    }

    /// Callback handed to every watcher
    pub fn callback(self: &Arc<Self>) -> EventCallback {
        let controller = Arc::clone(self);
        Arc::new(move |event| controller.handle(event))
    }

    /// Run one pass off the queue. Returns false once the queue is shut down.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let started = Instant::now();
        let result = self.reconciler.sync().await;
        let seconds = started.elapsed().as_secs_f64();

        match result {
            Ok(()) => {
                debug!(key, seconds, "Reconcile pass finished");
                self.metrics.observe_reconcile(None, seconds);
                self.queue.forget();
            }
            Err(e) => {
                let class = e.class();
                error!(key, class = ?class, error = %e, "Reconcile pass failed, requeueing");
                self.metrics.observe_reconcile(Some(class), seconds);
                self.queue.add_rate_limited();
            }
        }

        self.queue.done();
        true
    }

    /// Run until `token` is cancelled
    pub async fn run(self: Arc<Self>, watchers: &Watchers, token: CancellationToken) -> Result<()> {
        self.initialize().await;

        let handles = watchers.start(self.callback(), token.clone())?;

        info!("Waiting for caches to sync");
        while !watchers.has_synced() {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(SYNC_POLL_INTERVAL) => {}
            }
        }

        self.work(handles, token).await;
        Ok(())
    }

    /// Startup steps that must not stop the operator when they fail
    async fn initialize(&self) {
        if let Err(e) = self.reconciler.create_cluster_status().await {
            error!(error = %e, "Unable to create cluster operator resource");
        }

        if let Err(e) = self.reconciler.bootstrap().await {
            warn!(error = %e, "Unable to bootstrap ImageRegistry");
        }
    }

    /// Queue the initial pass and drain passes until `token` is cancelled
    async fn work(self: Arc<Self>, handles: Vec<JoinHandle<()>>, token: CancellationToken) {
        self.queue.add();

        let worker = {
            let controller = Arc::clone(&self);
            tokio::spawn(async move { while controller.process_next().await {} })
        };
        info!("Controller started");

        token.cancelled().await;
        info!("Shutting down controller");
        self.queue.shut_down();

        if let Err(e) = worker.await {
            error!(error = %e, "Worker task failed");
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Watcher task failed");
            }
        }
    }
}
