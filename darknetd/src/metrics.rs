//! Service metrics.
//!
//! [`Metrics`] is a cheap-to-clone recording surface over a Prometheus
//! registry. Components call the typed methods and never deal with the
//! underlying counter types; the API layer calls [`Metrics::render`] to
//! produce the `/metrics` exposition.
//!
//! The signal set is fixed (namespace `darknetd`):
//!
//! | signal | type | labels |
//! |---|---|---|
//! | `detections` | counter | - |
//! | `detection_errors` | counter | - |
//! | `cleanup_files` | counter | - |
//! | `cleanup_errors` | counter | `error` |
//! | `api_requests` | counter | `handler` |
//! | `api_errors` | counter | `handler`, `error` |
//! | `prediction_sec` | histogram | - |
//! | `total_sec` | histogram | - |

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

const NAMESPACE: &str = "darknetd";

/// Shared histogram buckets for job timings, in seconds.
const TIME_BUCKETS: &[f64] = &[
    0.001, 0.025, 0.05, 0.1, 0.25, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0, 1.5, 2.0,
];

/// Metrics recording handle.
///
/// Clone freely: all clones share one registry.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    detections: IntCounter,
    detection_errors: IntCounter,
    cleanup_files: IntCounter,
    cleanup_errors: IntCounterVec,
    api_requests: IntCounterVec,
    api_errors: IntCounterVec,
    prediction_sec: Histogram,
    total_sec: Histogram,
}

impl Metrics {
    /// Creates the registry and registers the full signal set.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let detections = IntCounter::with_opts(
            Opts::new("detections", "Successful detection jobs.").namespace(NAMESPACE),
        )?;
        let detection_errors = IntCounter::with_opts(
            Opts::new("detection_errors", "Failed detection jobs.").namespace(NAMESPACE),
        )?;
        let cleanup_files = IntCounter::with_opts(
            Opts::new("cleanup_files", "Image files cleaned up.").namespace(NAMESPACE),
        )?;
        let cleanup_errors = IntCounterVec::new(
            Opts::new("cleanup_errors", "Image cleanup errors.").namespace(NAMESPACE),
            &["error"],
        )?;
        let api_requests = IntCounterVec::new(
            Opts::new("api_requests", "API requests.").namespace(NAMESPACE),
            &["handler"],
        )?;
        let api_errors = IntCounterVec::new(
            Opts::new("api_errors", "API errors.").namespace(NAMESPACE),
            &["handler", "error"],
        )?;
        let prediction_sec = Histogram::with_opts(
            HistogramOpts::new("prediction_sec", "Detector-reported prediction time in seconds.")
                .namespace(NAMESPACE)
                .buckets(TIME_BUCKETS.to_vec()),
        )?;
        let total_sec = Histogram::with_opts(
            HistogramOpts::new("total_sec", "Total job time in seconds.")
                .namespace(NAMESPACE)
                .buckets(TIME_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(detections.clone()))?;
        registry.register(Box::new(detection_errors.clone()))?;
        registry.register(Box::new(cleanup_files.clone()))?;
        registry.register(Box::new(cleanup_errors.clone()))?;
        registry.register(Box::new(api_requests.clone()))?;
        registry.register(Box::new(api_errors.clone()))?;
        registry.register(Box::new(prediction_sec.clone()))?;
        registry.register(Box::new(total_sec.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                detections,
                detection_errors,
                cleanup_files,
                cleanup_errors,
                api_requests,
                api_errors,
                prediction_sec,
                total_sec,
            }),
        })
    }

    /// Records a completed detection job with its timings.
    pub fn job_completed(&self, time_detect: f64, time_total: f64) {
        self.inner.detections.inc();
        self.inner.prediction_sec.observe(time_detect);
        self.inner.total_sec.observe(time_total);
    }

    /// Records a failed detection tick.
    pub fn job_failed(&self) {
        self.inner.detection_errors.inc();
    }

    /// Records files deleted by a retention pass.
    pub fn files_cleaned(&self, count: u64) {
        self.inner.cleanup_files.inc_by(count);
    }

    /// Records retention failures of the given kind (`read_dir`,
    /// `remove`).
    pub fn cleanup_errors(&self, error: &str, count: u64) {
        self.inner
            .cleanup_errors
            .with_label_values(&[error])
            .inc_by(count);
    }

    /// Records a handled API request.
    pub fn api_request(&self, handler: &str) {
        self.inner.api_requests.with_label_values(&[handler]).inc();
    }

    /// Records a failed API request with its failure kind.
    pub fn api_error(&self, handler: &str, error: &str) {
        self.inner
            .api_errors
            .with_label_values(&[handler, error])
            .inc();
    }

    /// Renders the registry in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
