//! Daemon configuration.
//!
//! [`DaemonConfig`] gathers everything the service needs: the file-system
//! contract (capture directory, archive directory, well-known file names),
//! the detector installation, and the timing knobs. The CLI builds one
//! from its flags; defaults match a Raspberry Pi camera setup feeding
//! `/tmp` and a darknet install under `/usr/local/darknet`.

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// File name of the detection-target symlink in the capture directory.
///
/// The pipeline points this link at the newest capture before each job,
/// so the path submitted to the detector is always the same.
pub const DETECT_FILENAME: &str = "detect.jpg";

/// File name the detector writes its annotated output to, relative to
/// the detector installation directory.
pub const PREDICTIONS_FILENAME: &str = "predictions.jpg";

/// Default number of results retained in the ring buffer.
pub const DEFAULT_RING_CAPACITY: usize = 10;

/// Default number of files retained in the archive directory.
pub const DEFAULT_ARCHIVE_MAX_FILES: usize = 240;

/// Default interval between archive retention passes.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

/// Default backoff between detector restart attempts.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Service configuration.
///
/// All fields are plain data; [`DaemonConfig::validate`] checks the
/// values that would otherwise produce a silently broken service.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Directory holding the current captured image and the detection
    /// target symlink.
    pub capture_dir: PathBuf,
    /// File name of the current capture inside `capture_dir` (served by
    /// the API as `/latest.jpg`).
    pub capture_file: String,
    /// Directory new captures are archived into; also receives the
    /// `predictions_`-prefixed annotated copies.
    pub archive_dir: PathBuf,
    /// Maximum number of files retained in `archive_dir`.
    pub archive_max_files: usize,
    /// Detector installation directory; the process runs with this as
    /// its working directory since its arguments are relative paths.
    pub darknet_dir: PathBuf,
    /// Data file argument, relative to `darknet_dir`.
    pub darknet_data: String,
    /// Model config file argument, relative to `darknet_dir`.
    pub model_config: String,
    /// Model weights file argument, relative to `darknet_dir`.
    pub model_weights: String,
    /// How long to wait for the readiness token at startup.
    pub start_timeout: Duration,
    /// Per-job timeout covering the submit write and the read until the
    /// end-of-response token.
    pub detect_timeout: Duration,
    /// Delay between detection ticks, applied after success and failure
    /// alike.
    pub detect_delay: Duration,
    /// Interval between archive retention passes.
    pub gc_interval: Duration,
    /// Backoff between detector restart attempts.
    pub restart_delay: Duration,
    /// Capacity of the detection result ring buffer.
    pub ring_capacity: usize,
    /// API listen address.
    pub listen_addr: SocketAddr,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            capture_dir: PathBuf::from("/tmp/"),
            capture_file: "cap.jpg".to_string(),
            archive_dir: PathBuf::from("/tmp/cap"),
            archive_max_files: DEFAULT_ARCHIVE_MAX_FILES,
            darknet_dir: PathBuf::from("/usr/local/darknet"),
            darknet_data: "cfg/coco.data".to_string(),
            model_config: "cfg/yolov3-tiny.cfg".to_string(),
            model_weights: "yolov3-tiny.weights".to_string(),
            start_timeout: Duration::from_secs(30),
            detect_timeout: Duration::from_secs(10),
            detect_delay: Duration::from_millis(500),
            gc_interval: DEFAULT_GC_INTERVAL,
            restart_delay: DEFAULT_RESTART_DELAY,
            ring_capacity: DEFAULT_RING_CAPACITY,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
        }
    }
}

impl DaemonConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_capacity == 0 {
            return Err(ConfigError::ZeroRingCapacity);
        }
        if self.archive_max_files == 0 {
            return Err(ConfigError::ZeroArchiveCap);
        }
        if self.start_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("start timeout"));
        }
        if self.detect_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("detect timeout"));
        }
        if self.gc_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("cleanup interval"));
        }
        if self.restart_delay.is_zero() {
            return Err(ConfigError::ZeroDuration("restart delay"));
        }
        Ok(())
    }

    /// Path of the detection-target symlink.
    pub fn detect_target(&self) -> PathBuf {
        self.capture_dir.join(DETECT_FILENAME)
    }

    /// Path of the current raw capture, served as `/latest.jpg`.
    pub fn latest_capture(&self) -> PathBuf {
        self.capture_dir.join(&self.capture_file)
    }

    /// Path the detector writes its annotated output image to.
    pub fn predictions_source(&self) -> PathBuf {
        self.darknet_dir.join(PREDICTIONS_FILENAME)
    }
}
