//! Archive directory helpers.
//!
//! The archive directory holds two kinds of files: raw captures written
//! by the camera service, and `predictions_`-prefixed annotated copies
//! written by the detection job. Two operations live here:
//!
//! - [`find_newest_capture`] - selects the next job's input: the most
//!   recently modified raw capture
//! - [`enforce_file_cap`] - the retention pass: deletes oldest-first
//!   until the directory is back under its file cap
//!
//! Both walk the directory fresh on every call; the archive is small
//! (a few hundred files) and this keeps them robust against concurrent
//! writes by the camera service and the detection job.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Prefix of annotated output images in the archive directory.
pub const PREDICTIONS_PREFIX: &str = "predictions_";

/// Suffix of eligible capture images.
pub const IMAGE_SUFFIX: &str = ".jpg";

/// A capture image eligible for detection.
#[derive(Debug, Clone)]
pub struct CaptureImage {
    /// File name within the capture directory.
    pub name: String,
    /// File modification time, taken as the capture time.
    pub modified: SystemTime,
}

/// Outcome of one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Files successfully deleted.
    pub deleted: u64,
    /// Files that could not be deleted; the pass continued past them.
    pub failed: u64,
}

/// Returns the newest eligible capture in `dir`, or `None` if the
/// directory holds no eligible image.
///
/// Eligible means: name ends in `.jpg` and does not carry the annotated
/// output prefix. Newest is by file modification time.
pub fn find_newest_capture(dir: &Path) -> io::Result<Option<CaptureImage>> {
    let mut newest: Option<CaptureImage> = None;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(IMAGE_SUFFIX) || name.starts_with(PREDICTIONS_PREFIX) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let is_newer = newest
            .as_ref()
            .map(|current| modified > current.modified)
            .unwrap_or(true);
        if is_newer {
            newest = Some(CaptureImage { name, modified });
        }
    }

    Ok(newest)
}

/// Deletes oldest-first until `dir` holds at most `max_files` entries.
///
/// Ties on modification time are broken arbitrarily. A file that cannot
/// be deleted is counted in [`CleanupOutcome::failed`] and skipped so
/// the rest of the pass still runs. Returns an error only when the
/// directory itself cannot be listed.
pub fn enforce_file_cap(dir: &Path, max_files: usize) -> io::Result<CleanupOutcome> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push((entry.path(), modified));
    }

    let mut outcome = CleanupOutcome::default();
    while entries.len() > max_files {
        let oldest = entries
            .iter()
            .enumerate()
            .min_by_key(|(_, (_, modified))| *modified)
            .map(|(index, _)| index);
        let Some(index) = oldest else { break };
        let (path, _) = entries.swap_remove(index);

        match fs::remove_file(&path) {
            Ok(()) => outcome.deleted += 1,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "failed deleting archived file"
                );
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}
