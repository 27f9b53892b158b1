//! The detection job: one inference cycle per tick.
//!
//! Each tick:
//!
//! 1. Select the newest eligible capture from the archive directory.
//! 2. Point the well-known detection-target symlink at it.
//! 3. Submit the symlink path to the detector and parse the response.
//! 4. Archive the annotated output image under its `predictions_` name.
//! 5. Stamp timings, push the result into the ring, record metrics.
//!
//! A failed tick is logged and counted, never fatal: the loop sleeps
//! the configured inter-tick delay and tries again. That delay is the
//! only pacing mechanism - there is no queue and ticks never overlap.

use crate::archive::{self, PREDICTIONS_PREFIX};
use crate::config::DaemonConfig;
use crate::detector::{parse_output, DetectionResult, DetectorSupervisor};
use crate::error::JobError;
use crate::metrics::Metrics;
use crate::ring::DetectionRing;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Periodic detection pipeline.
pub struct DetectionJob {
    config: Arc<DaemonConfig>,
    supervisor: Arc<DetectorSupervisor>,
    ring: Arc<DetectionRing>,
    metrics: Metrics,
}

impl DetectionJob {
    /// Creates the job.
    pub fn new(
        config: Arc<DaemonConfig>,
        supervisor: Arc<DetectorSupervisor>,
        ring: Arc<DetectionRing>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            supervisor,
            ring,
            metrics,
        }
    }

    /// Runs detection ticks until shutdown is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            delay = ?self.config.detect_delay,
            "detection job starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_tick().await {
                Ok(result) => {
                    info!(
                        image = %result.image,
                        objects = result.objects.len(),
                        time_detect = result.time_detect,
                        time_total = result.time_total,
                        "detection completed"
                    );
                }
                Err(err) => {
                    warn!(error = %err, "detection tick failed");
                    self.metrics.job_failed();
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.detect_delay) => {}
            }
        }

        info!("detection job stopped");
    }

    /// Runs one detection cycle.
    pub async fn run_tick(&self) -> Result<DetectionResult, JobError> {
        let started = Instant::now();

        let capture = archive::find_newest_capture(&self.config.archive_dir)
            .map_err(|source| JobError::ListCaptures {
                path: self.config.archive_dir.clone(),
                source,
            })?
            .ok_or_else(|| JobError::NoImageFound(self.config.archive_dir.clone()))?;

        let target = self.config.detect_target();
        let _link = DetectLink::create(&self.config.archive_dir.join(&capture.name), &target)?;

        let words = self.supervisor.submit(&target).await?;
        let parsed = parse_output(&target.to_string_lossy(), &words);

        // The detector wrote its annotated image to a fixed path in its
        // own directory; keep a copy under the capture's name.
        let pred_image = format!("{PREDICTIONS_PREFIX}{}", capture.name);
        let annotated = self.config.predictions_source();
        let destination = self.config.archive_dir.join(&pred_image);
        tokio::fs::copy(&annotated, &destination)
            .await
            .map_err(|err| JobError::ArchiveAnnotated {
                path: annotated.clone(),
                source: err,
            })?;

        let result = DetectionResult {
            image: capture.name,
            pred_image,
            image_time: capture.modified.into(),
            pred_time: Utc::now(),
            time_detect: parsed.time_detect,
            time_total: started.elapsed().as_secs_f64(),
            objects: parsed.objects,
        };

        self.ring.push(result.clone());
        self.metrics
            .job_completed(result.time_detect, result.time_total);

        Ok(result)
    }
}

/// The detection-target symlink, removed again on drop.
///
/// Removal runs on every exit path of a tick - success, submit failure,
/// archive failure - so a stale link never outlives its job.
#[derive(Debug)]
struct DetectLink {
    path: PathBuf,
}

impl DetectLink {
    fn create(source_image: &Path, link: &Path) -> Result<Self, JobError> {
        // A previous crash can leave a stale link behind.
        let _ = std::fs::remove_file(link);
        std::os::unix::fs::symlink(source_image, link).map_err(|source| JobError::Link {
            source_image: source_image.to_path_buf(),
            link: link.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: link.to_path_buf(),
        })
    }
}

impl Drop for DetectLink {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn detect_link_created_and_removed() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("cap.jpg");
        fs::write(&image, b"img").unwrap();
        let link = dir.path().join("detect.jpg");

        {
            let _guard = DetectLink::create(&image, &link).unwrap();
            assert_eq!(fs::read_link(&link).unwrap(), image);
        }

        assert!(!link.exists(), "link must be removed on drop");
    }

    #[test]
    fn detect_link_replaces_stale_link() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.jpg");
        let new = dir.path().join("new.jpg");
        fs::write(&old, b"old").unwrap();
        fs::write(&new, b"new").unwrap();
        let link = dir.path().join("detect.jpg");

        let first = DetectLink::create(&old, &link).unwrap();
        // Simulate a crashed tick: forget the guard so the link stays.
        std::mem::forget(first);
        assert_eq!(fs::read_link(&link).unwrap(), old);

        let _second = DetectLink::create(&new, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), new);
    }

    #[test]
    fn detect_link_fails_in_missing_directory() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("cap.jpg");
        fs::write(&image, b"img").unwrap();
        let link = dir.path().join("missing").join("detect.jpg");

        let err = DetectLink::create(&image, &link).unwrap_err();
        assert!(matches!(err, JobError::Link { .. }));
    }
}
