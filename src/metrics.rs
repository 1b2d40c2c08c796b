//! Controller Metrics
//!
//! Prometheus collectors for reconcile passes, watch events and status
//! writes, registered on a caller-supplied registry.

use crate::error::{ErrorClass, Result};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

/// Outcome label for a reconcile pass
pub const RESULT_SUCCESS: &str = "success";

/// Outcome labels for watch events
pub const EVENT_ENQUEUED: &str = "enqueued";
pub const EVENT_FILTERED: &str = "filtered";

/// Outcome labels for status writes
pub const WRITE_WRITTEN: &str = "written";
pub const WRITE_SKIPPED: &str = "skipped";
pub const WRITE_CONFLICT: &str = "conflict";

#[derive(Clone)]
pub struct ControllerMetrics {
    pub reconcile_total: IntCounterVec,
    pub reconcile_duration: HistogramVec,
    pub events_total: IntCounterVec,
    pub status_writes_total: IntCounterVec,
}

impl ControllerMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let reconcile_total = IntCounterVec::new(
            Opts::new(
                "image_registry_reconcile_total",
                "Reconcile passes by result",
            ),
            &["result"],
        )?;
        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                "image_registry_reconcile_duration_seconds",
                "Duration of reconcile passes",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["result"],
        )?;
        let events_total = IntCounterVec::new(
            Opts::new(
                "image_registry_watch_events_total",
                "Watch events by kind and outcome",
            ),
            &["kind", "outcome"],
        )?;
        let status_writes_total = IntCounterVec::new(
            Opts::new(
                "image_registry_status_writes_total",
                "ImageRegistry writes by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(status_writes_total.clone()))?;

        Ok(Self {
            reconcile_total,
            reconcile_duration,
            events_total,
            status_writes_total,
        })
    }

    /// Record a finished pass; `class` is None on success
    pub fn observe_reconcile(&self, class: Option<ErrorClass>, seconds: f64) {
        let result = match class {
            None => RESULT_SUCCESS.to_string(),
            Some(class) => class.to_string(),
        };
        self.reconcile_total.with_label_values(&[&result]).inc();
        self.reconcile_duration
            .with_label_values(&[&result])
            .observe(seconds);
    }

    pub fn observe_event(&self, kind: &str, outcome: &str) {
        self.events_total.with_label_values(&[kind, outcome]).inc();
    }

    pub fn observe_write(&self, outcome: &str) {
        self.status_writes_total.with_label_values(&[outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_count() {
        let registry = Registry::new();
        let metrics = ControllerMetrics::new(&registry).unwrap();

        metrics.observe_reconcile(None, 0.2);
        metrics.observe_reconcile(Some(ErrorClass::Permanent), 0.1);
        metrics.observe_event("Service", EVENT_FILTERED);
        metrics.observe_write(WRITE_SKIPPED);

        assert_eq!(metrics.reconcile_total.with_label_values(&["success"]).get(), 1);
        assert_eq!(metrics.reconcile_total.with_label_values(&["permanent"]).get(), 1);
        assert_eq!(
            metrics.events_total.with_label_values(&["Service", "filtered"]).get(),
            1
        );
        assert_eq!(registry.gather().len(), 4);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        ControllerMetrics::new(&registry).unwrap();
        assert!(ControllerMetrics::new(&registry).is_err());
    }
}
