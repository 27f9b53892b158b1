//! Shared fixtures for integration tests.
//!
//! The detector is faked with a small `sh` script installed as the
//! `darknet` binary in a temporary install directory. The scripts speak
//! the real protocol: a prompt whose last word is the readiness token,
//! one image path per input line, and a token response terminated by
//! the same prompt.
#![allow(dead_code)]

use darknetd::config::DaemonConfig;
use std::fs;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// A fake detector that acknowledges each request with one prediction,
/// echoing the request path the way the real detector does.
pub const ECHO_DETECTOR: &str = "#!/bin/sh\n\
printf 'loading weights\\nEnter Image Path: '\n\
while read line; do\n\
  printf '%s: Predicted in 0.023 seconds. CLASS person 87 BBOX 10 50 5 40 Enter Image Path: ' \"$line\"\n\
done\n";

/// Like [`ECHO_DETECTOR`], but writes the annotated output image before
/// responding, as the real detector does after each job.
pub const ANNOTATING_DETECTOR: &str = "#!/bin/sh\n\
printf 'loading weights\\nEnter Image Path: '\n\
while read line; do\n\
  printf 'annotated-image-bytes' > predictions.jpg\n\
  printf '%s: Predicted in 0.023 seconds. CLASS person 87 BBOX 10 50 5 40 Enter Image Path: ' \"$line\"\n\
done\n";

/// Installs `script` as the `darknet` executable in `dir`.
pub fn install_fake_detector(dir: &Path, script: &str) {
    let path = dir.join("darknet");
    fs::write(&path, script).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
}

/// Builds a config pointing at temp directories, with short timeouts
/// suitable for tests.
pub fn test_config(darknet: &TempDir, capture: &TempDir, archive: &TempDir) -> DaemonConfig {
    DaemonConfig {
        capture_dir: capture.path().to_path_buf(),
        capture_file: "cap.jpg".to_string(),
        archive_dir: archive.path().to_path_buf(),
        darknet_dir: darknet.path().to_path_buf(),
        start_timeout: Duration::from_secs(5),
        detect_timeout: Duration::from_secs(5),
        detect_delay: Duration::from_millis(10),
        restart_delay: Duration::from_millis(100),
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..DaemonConfig::default()
    }
}
