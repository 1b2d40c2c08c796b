//! Single-key work queue
//!
//! The controller only ever reconciles one object, so the queue holds at
//! most one pending item. Any number of adds between two passes collapse
//! into a single pass; an add arriving while a pass is processing is held
//! until that pass calls [`WorkQueue::done`].

use crate::parameters::WORKQUEUE_KEY;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

/// Backoff tuning for rate-limited adds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

impl BackoffConfig {
    fn build(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.max)
            .with_max_elapsed_time(None)
            .build()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: bool,
    processing: bool,
    timer_armed: bool,
    shutting_down: bool,
}

/// Deduplicating single-slot queue with a rate-limit timer
pub struct WorkQueue {
    state: Mutex<QueueState>,
    backoff: Mutex<ExponentialBackoff>,
    config: BackoffConfig,
    notify: Notify,
}

impl WorkQueue {
    pub fn new(config: BackoffConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            backoff: Mutex::new(config.build()),
            config,
            notify: Notify::new(),
        })
    }

    /// Mark the key pending. Never blocks.
    pub fn add(&self) {
        let mut state = self.state.lock();
        if state.shutting_down || state.pending {
            return;
        }
        state.pending = true;
        if !state.processing {
            self.notify.notify_one();
        }
    }

    /// Add the key after the next backoff delay. While the timer is armed
    /// further rate-limited adds are absorbed.
    pub fn add_rate_limited(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.shutting_down || state.timer_armed {
                return;
            }
            state.timer_armed = true;
        }

        let delay = self.next_delay();
        trace!(delay_ms = delay.as_millis() as u64, "Arming work queue timer");

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.state.lock().timer_armed = false;
            queue.add();
        });
    }

    /// Reset the backoff after a successful pass
    pub fn forget(&self) {
        self.backoff.lock().reset();
    }

    /// Wait for the key. Returns None once the queue is shut down and no
    /// item is left pending.
    pub async fn get(&self) -> Option<&'static str> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if state.pending && !state.processing {
                    state.pending = false;
                    state.processing = true;
                    return Some(WORKQUEUE_KEY);
                }
                if state.shutting_down && !state.pending {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Finish the current pass, releasing a key held during processing
    pub fn done(&self) {
        let mut state = self.state.lock();
        state.processing = false;
        if state.pending {
            self.notify.notify_one();
        }
    }

    /// Ignore further adds and wake the worker so it can drain and exit
    pub fn shut_down(&self) {
        self.state.lock().shutting_down = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Number of pending items (0 or 1)
    pub fn len(&self) -> usize {
        usize::from(self.state.lock().pending)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_delay(&self) -> Duration {
        self.backoff
            .lock()
            .next_backoff()
            .unwrap_or(self.config.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn queue() -> Arc<WorkQueue> {
        WorkQueue::new(BackoffConfig::default())
    }

    #[tokio::test]
    async fn test_adds_collapse_into_one_item() {
        let q = queue();
        q.add();
        q.add();
        q.add();
        assert_eq!(q.len(), 1);

        assert_eq!(q.get().await, Some(WORKQUEUE_KEY));
        q.done();
        assert!(timeout(Duration::from_millis(50), q.get()).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_adds_during_pass_yield_one_more_pass() {
        let q = queue();
        q.add();
        assert!(q.get().await.is_some());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        q.add();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // held while processing
        assert!(timeout(Duration::from_millis(20), q.get()).await.is_err());
        q.done();

        assert!(timeout(Duration::from_millis(50), q.get()).await.unwrap().is_some());
        q.done();
        assert!(timeout(Duration::from_millis(50), q.get()).await.is_err());
    }

    #[tokio::test]
    async fn test_rate_limited_add_fires_once() {
        let q = queue();
        for _ in 0..10 {
            q.add_rate_limited();
        }

        assert!(timeout(Duration::from_millis(500), q.get()).await.unwrap().is_some());
        q.done();
        assert!(timeout(Duration::from_millis(50), q.get()).await.is_err());
    }

    #[tokio::test]
    async fn test_backoff_grows_and_resets() {
        let q = queue();
        assert_eq!(q.next_delay(), Duration::from_millis(5));
        assert_eq!(q.next_delay(), Duration::from_millis(10));
        assert_eq!(q.next_delay(), Duration::from_millis(20));
        q.forget();
        assert_eq!(q.next_delay(), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_backoff_is_capped() {
        let q = WorkQueue::new(BackoffConfig {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(40),
        });
        for _ in 0..10 {
            q.next_delay();
        }
        assert_eq!(q.next_delay(), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_then_stops() {
        let q = queue();
        q.add();
        q.shut_down();
        q.add();

        assert!(q.get().await.is_some());
        q.done();
        assert_eq!(q.get().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_idle_worker() {
        let q = queue();
        let worker = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.shut_down();
        assert_eq!(timeout(Duration::from_millis(200), worker).await.unwrap().unwrap(), None);
    }
}
