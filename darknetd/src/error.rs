//! Error types for the detection service.
//!
//! Errors are grouped by failure domain so each layer can apply its own
//! recovery policy:
//!
//! - [`StartupError`] - detector startup failures, fatal to the attempt
//!   and retried with a fixed backoff (by the CLI for the initial start,
//!   by the supervisor's restart task afterwards)
//! - [`SubmitError`] - per-job transport failures against the detector
//!   process; these tear the session down for restart
//! - [`JobError`] - detection tick failures; logged, counted, and the
//!   tick is skipped
//! - [`ConfigError`] - invalid configuration, reported before startup

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while starting the detector process.
///
/// Any of these fails the whole startup attempt. The readiness handshake
/// races four outcomes (ready token, stdout close, early exit, timeout);
/// exactly one wins.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Spawning the detector binary failed
    #[error("failed to spawn detector process: {0}")]
    Spawn(#[source] io::Error),

    /// A stdio pipe was not available on the spawned child
    #[error("detector {0} pipe was not captured")]
    Pipe(&'static str),

    /// stdout ended before the readiness token was observed
    #[error("detector stdout closed before ready")]
    StdoutClosed,

    /// stdout failed before the readiness token was observed
    #[error("detector stdout read error during startup: {0}")]
    Read(#[source] io::Error),

    /// The process exited before signalling readiness
    #[error("detector exited during startup: {0}")]
    ExitedEarly(ExitStatus),

    /// Waiting on the process handle failed
    #[error("failed waiting on detector process: {0}")]
    Wait(#[source] io::Error),

    /// The readiness token did not arrive in time
    #[error("timed out starting detector after {0:?}")]
    Timeout(Duration),
}

/// Errors that can occur while submitting one image to the detector.
///
/// The transport variants carry the tokens read so far - partial output
/// is the only diagnostic available when the stream dies mid-response.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The detector is not in the `Ready` state (starting up, failed,
    /// or restarting); the caller should skip this job
    #[error("detector not ready")]
    NotReady,

    /// Writing the image path to detector stdin failed
    #[error("failed writing image path to detector stdin: {0}")]
    Write(#[source] io::Error),

    /// stdout ended before the end-of-response token
    #[error("detector stdout closed mid-response ({} tokens read)", .partial.len())]
    StdoutClosed {
        /// Tokens accumulated before the stream ended.
        partial: Vec<String>,
    },

    /// Reading from stdout failed mid-response
    #[error("detector stdout read error: {source} ({} tokens read)", .partial.len())]
    Read {
        #[source]
        source: io::Error,
        /// Tokens accumulated before the failure.
        partial: Vec<String>,
    },

    /// The response did not complete within the configured detect timeout
    #[error("detection timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors that can fail a single detection tick.
///
/// None of these are fatal to the service: the pipeline logs the error,
/// bumps the error counter, and tries again after the inter-tick delay.
#[derive(Debug, Error)]
pub enum JobError {
    /// Listing the capture directory failed
    #[error("failed listing capture directory {}: {source}", .path.display())]
    ListCaptures {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No eligible image file found in the capture directory
    #[error("no image file found in {}", .0.display())]
    NoImageFound(PathBuf),

    /// Creating the detection-target symlink failed
    #[error("failed linking {} to {}: {source}", .source_image.display(), .link.display())]
    Link {
        source_image: PathBuf,
        link: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Submitting the image to the detector failed
    #[error("detector submit failed: {0}")]
    Submit(#[from] SubmitError),

    /// Copying the annotated output image into the archive failed
    #[error("failed archiving annotated image {}: {source}", .path.display())]
    ArchiveAnnotated {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ring capacity must be greater than zero")]
    ZeroRingCapacity,

    #[error("archive file cap must be greater than zero")]
    ZeroArchiveCap,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_error_display() {
        let err = StartupError::Timeout(Duration::from_secs(30));
        assert_eq!(format!("{}", err), "timed out starting detector after 30s");

        let err = StartupError::StdoutClosed;
        assert!(err.to_string().contains("before ready"));
    }

    #[test]
    fn submit_error_carries_partial_tokens() {
        let err = SubmitError::StdoutClosed {
            partial: vec!["Predicted".to_string(), "in".to_string()],
        };
        assert!(err.to_string().contains("2 tokens read"));
    }

    #[test]
    fn job_error_from_submit_error() {
        let err: JobError = SubmitError::NotReady.into();
        assert!(matches!(err, JobError::Submit(SubmitError::NotReady)));
        assert!(err.to_string().contains("detector not ready"));
    }

    #[test]
    fn job_error_display_includes_path() {
        let err = JobError::NoImageFound(PathBuf::from("/tmp/cap"));
        assert_eq!(format!("{}", err), "no image file found in /tmp/cap");
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::ZeroDuration("detect timeout");
        assert_eq!(format!("{}", err), "detect timeout must be greater than zero");
    }
}
