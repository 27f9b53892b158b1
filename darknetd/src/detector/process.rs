//! Detector process launch and readiness handshake.
//!
//! The detector is started once in `detector test` batch mode and then
//! fed image paths over stdin for its whole lifetime. Model loading
//! takes tens of seconds; the process signals it is ready for its first
//! job by printing its input prompt, whose [`READY_TOKEN`] word is the
//! protocol's readiness marker.
//!
//! [`launch`] races four startup outcomes and exactly one wins:
//! readiness token observed, stdout closed, process exited early, or
//! the startup timeout elapsed.

use super::token_reader::TokenReader;
use super::READY_TOKEN;
use crate::config::DaemonConfig;
use crate::error::{StartupError, SubmitError};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Detector binary, relative to the installation directory.
const DETECTOR_PROGRAM: &str = "./darknet";

/// A detector process that has completed its readiness handshake.
pub(crate) struct LaunchedDetector {
    pub(crate) session: DetectorSession,
    pub(crate) child: Child,
}

/// The live request/response channel to the detector.
///
/// Exactly one job may use the session at a time; the supervisor
/// enforces this with a mutex held across [`DetectorSession::exchange`].
pub(crate) struct DetectorSession {
    stdin: ChildStdin,
    tokens: TokenReader<ChildStdout>,
    /// Cancelled on teardown; the exit monitor kills the process in
    /// response.
    pub(crate) teardown: CancellationToken,
}

impl DetectorSession {
    /// Runs one request/response cycle: writes the image path, then
    /// reads tokens until the end-of-response sentinel.
    ///
    /// Transport failures return the tokens accumulated so far for
    /// diagnostics.
    pub(crate) async fn exchange(&mut self, image_path: &Path) -> Result<Vec<String>, SubmitError> {
        let line = format!("{}\n", image_path.display());
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(SubmitError::Write)?;
        self.stdin.flush().await.map_err(SubmitError::Write)?;

        let mut words = Vec::new();
        loop {
            match self.tokens.next_token().await {
                Ok(Some(word)) => {
                    let done = word == READY_TOKEN;
                    words.push(word);
                    if done {
                        return Ok(words);
                    }
                }
                Ok(None) => return Err(SubmitError::StdoutClosed { partial: words }),
                Err(source) => return Err(SubmitError::Read { source, partial: words }),
            }
        }
    }
}

/// Spawns the detector and waits for it to become ready.
///
/// The process runs with the installation directory as its working
/// directory since the data/config/weights arguments are relative to
/// it. stderr is drained and logged for the process lifetime; it never
/// affects the handshake.
pub(crate) async fn launch(config: &DaemonConfig) -> Result<LaunchedDetector, StartupError> {
    let mut child = Command::new(DETECTOR_PROGRAM)
        .arg("detector")
        .arg("test")
        .arg(&config.darknet_data)
        .arg(&config.model_config)
        .arg(&config.model_weights)
        .current_dir(&config.darknet_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(StartupError::Spawn)?;

    info!(
        dir = %config.darknet_dir.display(),
        data = %config.darknet_data,
        model = %config.model_config,
        weights = %config.model_weights,
        "detector process started, waiting for model load"
    );

    let stdin = child.stdin.take().ok_or(StartupError::Pipe("stdin"))?;
    let stdout = child.stdout.take().ok_or(StartupError::Pipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(StartupError::Pipe("stderr"))?;

    tokio::spawn(drain_stderr(stderr));

    let mut tokens = TokenReader::new(stdout);
    tokio::select! {
        ready = wait_for_ready(&mut tokens) => ready?,
        exit = child.wait() => {
            return Err(match exit {
                Ok(status) => StartupError::ExitedEarly(status),
                Err(source) => StartupError::Wait(source),
            });
        }
        _ = tokio::time::sleep(config.start_timeout) => {
            return Err(StartupError::Timeout(config.start_timeout));
        }
    }

    Ok(LaunchedDetector {
        session: DetectorSession {
            stdin,
            tokens,
            teardown: CancellationToken::new(),
        },
        child,
    })
}

/// Scans stdout until a readiness token is seen.
///
/// Startup matches by prefix; the per-job scan uses exact equality.
async fn wait_for_ready(tokens: &mut TokenReader<ChildStdout>) -> Result<(), StartupError> {
    loop {
        match tokens.next_token().await {
            Ok(Some(word)) if word.starts_with(READY_TOKEN) => return Ok(()),
            Ok(Some(_)) => continue,
            Ok(None) => return Err(StartupError::StdoutClosed),
            Err(source) => return Err(StartupError::Read(source)),
        }
    }
}

/// Drains detector stderr for the process lifetime, log-only.
async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(stderr = %line, "detector"),
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, "detector stderr read failed");
                break;
            }
        }
    }
}
