//! Detector supervision: single-flight submit and restart handling.
//!
//! [`DetectorSupervisor`] owns the detector session and exposes one
//! operation: [`submit`](DetectorSupervisor::submit), the synchronous
//! "image path in, token list out" exchange. The session's pipes are a
//! single shared resource whose request/response pairing must never be
//! broken, so the session mutex is held across both the write and the
//! read-until-sentinel - mis-pairing would silently attach one image's
//! predictions to another.
//!
//! # Lifecycle
//!
//! The supervisor is a four-state machine:
//!
//! ```text
//!  Starting ──▶ Ready ──▶ Failed ──▶ Restarting ──▶ Ready ──▶ ...
//! ```
//!
//! A transport failure during submit, a per-job timeout, or the process
//! exiting on its own all tear the session down and move the machine to
//! `Failed`; a background task then re-runs the startup handshake on a
//! fixed backoff until the detector is `Ready` again. Submits issued
//! while not `Ready` fail fast with [`SubmitError::NotReady`] so the
//! job loop skips the tick instead of blocking on a dead process.
//!
//! A timeout is treated as a transport failure on purpose: once a
//! response is abandoned mid-read, the stream position is unknown and
//! the next response could be paired with the wrong request.

use super::process::{self, DetectorSession, LaunchedDetector};
use crate::config::DaemonConfig;
use crate::error::{StartupError, SubmitError};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::process::Child;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Initial handshake in progress.
    Starting,
    /// Detector accepting jobs.
    Ready,
    /// Session torn down after a failure; restart not yet begun.
    Failed,
    /// Background task re-running the startup handshake.
    Restarting,
}

const STARTING: u8 = 0;
const READY: u8 = 1;
const FAILED: u8 = 2;
const RESTARTING: u8 = 3;

impl DetectorState {
    fn from_u8(value: u8) -> Self {
        match value {
            READY => Self::Ready,
            FAILED => Self::Failed,
            RESTARTING => Self::Restarting,
            _ => Self::Starting,
        }
    }
}

/// Owns the detector process and serializes access to it.
pub struct DetectorSupervisor {
    config: Arc<DaemonConfig>,
    session: Mutex<Option<DetectorSession>>,
    state: AtomicU8,
    shutdown: CancellationToken,
    weak: Weak<DetectorSupervisor>,
}

impl DetectorSupervisor {
    /// Starts the detector and returns a ready supervisor.
    ///
    /// Fails if the initial handshake fails; the caller decides whether
    /// to retry the whole startup. Once started, later failures are
    /// handled internally by the restart task.
    pub async fn start(
        config: Arc<DaemonConfig>,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>, StartupError> {
        let launched = process::launch(&config).await?;

        let supervisor = Arc::new_cyclic(|weak| Self {
            config,
            session: Mutex::new(None),
            state: AtomicU8::new(STARTING),
            shutdown,
            weak: weak.clone(),
        });
        supervisor.install(launched).await;
        Ok(supervisor)
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> DetectorState {
        DetectorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Submits one image and returns the response token list.
    ///
    /// Holds the session lock for the full write-and-read cycle; a
    /// concurrent caller blocks until this job's response is complete.
    /// The configured detect timeout bounds the whole cycle.
    pub async fn submit(&self, image_path: &Path) -> Result<Vec<String>, SubmitError> {
        if self.state() != DetectorState::Ready {
            return Err(SubmitError::NotReady);
        }
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return Err(SubmitError::NotReady);
        };

        let timeout = self.config.detect_timeout;
        let outcome = tokio::time::timeout(timeout, session.exchange(image_path)).await;
        match outcome {
            Ok(Ok(words)) => Ok(words),
            Ok(Err(err)) => {
                warn!(error = %err, "detector transport failure, tearing session down");
                self.teardown_locked(&mut guard);
                Err(err)
            }
            Err(_elapsed) => {
                warn!(?timeout, "detection timed out, tearing session down");
                self.teardown_locked(&mut guard);
                Err(SubmitError::Timeout(timeout))
            }
        }
    }

    /// Tears the session down on shutdown, killing the process.
    pub async fn stop(&self) {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            session.teardown.cancel();
        }
    }

    /// Installs a freshly launched session and starts watching its
    /// process.
    async fn install(&self, launched: LaunchedDetector) {
        let LaunchedDetector { session, child } = launched;
        let teardown = session.teardown.clone();
        *self.session.lock().await = Some(session);
        self.spawn_exit_monitor(child, teardown);
        self.state.store(READY, Ordering::Release);
    }

    /// Drops the session (killing the process via the monitor) and
    /// kicks off a restart. Caller must hold the session lock.
    fn teardown_locked(&self, guard: &mut MutexGuard<'_, Option<DetectorSession>>) {
        if let Some(session) = guard.take() {
            session.teardown.cancel();
        }
        self.trigger_restart();
    }

    /// Moves Ready -> Failed and spawns the restart task.
    ///
    /// The compare-exchange guarantees at most one restart task: every
    /// failure path calls this, but only the transition out of `Ready`
    /// spawns.
    fn trigger_restart(&self) {
        if self
            .state
            .compare_exchange(READY, FAILED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let Some(supervisor) = self.weak.upgrade() else {
            return;
        };
        tokio::spawn(async move { supervisor.restart_loop().await });
    }

    /// Re-runs the startup handshake on a fixed backoff until the
    /// detector is ready again or shutdown is requested.
    async fn restart_loop(self: Arc<Self>) {
        self.state.store(RESTARTING, Ordering::Release);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("shutdown requested, abandoning detector restart");
                    return;
                }
                _ = tokio::time::sleep(self.config.restart_delay) => {}
            }

            info!("restarting detector process");
            match process::launch(&self.config).await {
                Ok(launched) => {
                    self.install(launched).await;
                    info!("detector process ready");
                    return;
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        retry_in = ?self.config.restart_delay,
                        "detector restart failed"
                    );
                }
            }
        }
    }

    /// Watches the child: kills it when the session is torn down, and
    /// treats any exit on its own as a failure needing a restart.
    fn spawn_exit_monitor(&self, mut child: Child, teardown: CancellationToken) {
        let weak = self.weak.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = teardown.cancelled() => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    debug!("detector process killed on teardown");
                }
                exit = child.wait() => {
                    match exit {
                        Ok(status) => warn!(%status, "detector process exited unexpectedly"),
                        Err(err) => warn!(error = %err, "detector process wait failed"),
                    }
                    if let Some(supervisor) = weak.upgrade() {
                        supervisor.handle_process_exit().await;
                    }
                }
            }
        });
    }

    /// Tears down after the process died on its own (between jobs).
    async fn handle_process_exit(&self) {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            session.teardown.cancel();
        }
        drop(guard);
        self.trigger_restart();
    }
}

impl std::fmt::Debug for DetectorSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorSupervisor")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        assert_eq!(DetectorState::from_u8(STARTING), DetectorState::Starting);
        assert_eq!(DetectorState::from_u8(READY), DetectorState::Ready);
        assert_eq!(DetectorState::from_u8(FAILED), DetectorState::Failed);
        assert_eq!(DetectorState::from_u8(RESTARTING), DetectorState::Restarting);
    }
}
