//! Archive retention job.
//!
//! Keeps the archive directory under its configured file cap by
//! deleting the oldest entries on a fixed interval, independent of the
//! detection cadence.
//!
//! # Error Policy
//!
//! Partial cleanup is better than no cleanup: a file that cannot be
//! deleted is counted and skipped, and a failed pass never stops the
//! next one.

use crate::archive;
use crate::metrics::Metrics;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic archive retention pass.
pub struct ArchiveGcJob {
    archive_dir: PathBuf,
    max_files: usize,
    interval: Duration,
    metrics: Metrics,
}

impl ArchiveGcJob {
    /// Creates the job.
    pub fn new(
        archive_dir: PathBuf,
        max_files: usize,
        interval: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            archive_dir,
            max_files,
            interval,
            metrics,
        }
    }

    /// Runs retention passes until shutdown is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            dir = %self.archive_dir.display(),
            max_files = self.max_files,
            interval = ?self.interval,
            "archive retention job starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.sweep(),
            }
        }

        info!("archive retention job stopped");
    }

    /// Runs one retention pass.
    pub fn sweep(&self) {
        match archive::enforce_file_cap(&self.archive_dir, self.max_files) {
            Ok(outcome) => {
                if outcome.deleted > 0 {
                    debug!(deleted = outcome.deleted, "archive cleanup pass");
                    self.metrics.files_cleaned(outcome.deleted);
                }
                if outcome.failed > 0 {
                    self.metrics.cleanup_errors("remove", outcome.failed);
                }
            }
            Err(err) => {
                warn!(
                    dir = %self.archive_dir.display(),
                    error = %err,
                    "archive cleanup listing failed"
                );
                self.metrics.cleanup_errors("read_dir", 1);
            }
        }
    }
}
