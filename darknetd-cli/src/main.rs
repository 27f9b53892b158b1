//! darknetd CLI - the service binary.
//!
//! Parses flags into a [`DaemonConfig`], starts the detector with a
//! fixed-backoff retry loop, spawns the background jobs, and serves the
//! HTTP API until a shutdown signal arrives.

use anyhow::Context;
use clap::Parser;
use darknetd::api::{self, ApiState};
use darknetd::config::DaemonConfig;
use darknetd::detector::DetectorSupervisor;
use darknetd::jobs::{ArchiveGcJob, DetectionJob};
use darknetd::logging;
use darknetd::metrics::Metrics;
use darknetd::ring::DetectionRing;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "darknetd")]
#[command(version = darknetd::VERSION)]
#[command(about = "Run darknet as a service, with a REST API", long_about = None)]
struct Args {
    /// Directory containing the captured image
    #[arg(long = "capture-dir", default_value = "/tmp/")]
    capture_dir: PathBuf,

    /// Filename of the captured image
    #[arg(long = "capture-file", default_value = "cap.jpg")]
    capture_file: String,

    /// Directory containing the image archive
    #[arg(long = "archive-dir", default_value = "/tmp/cap")]
    archive_dir: PathBuf,

    /// Number of images to retain in the archive
    #[arg(long = "archive-files", default_value_t = 240)]
    archive_files: usize,

    /// Directory containing the darknet installation
    #[arg(long = "darknet-dir", default_value = "/usr/local/darknet")]
    darknet_dir: PathBuf,

    /// Darknet data file, relative to darknet-dir
    #[arg(long = "darknet-data", default_value = "cfg/coco.data")]
    darknet_data: String,

    /// Darknet model config file, relative to darknet-dir
    #[arg(long = "model-config", default_value = "cfg/yolov3-tiny.cfg")]
    model_config: String,

    /// Darknet model weights file, relative to darknet-dir
    #[arg(long = "model-weights", default_value = "yolov3-tiny.weights")]
    model_weights: String,

    /// Darknet startup & model load timeout in msec
    #[arg(long = "start-timeout", default_value_t = 30_000)]
    start_timeout_ms: u64,

    /// Darknet detection timeout in msec
    #[arg(long = "detect-timeout", default_value_t = 10_000)]
    detect_timeout_ms: u64,

    /// Delay between detections in msec
    #[arg(long = "detect-delay", default_value_t = 500)]
    detect_delay_ms: u64,

    /// API listen address:port
    #[arg(long = "listen-addr", default_value = "0.0.0.0:8081")]
    listen_addr: SocketAddr,

    /// Directory for log files
    #[arg(long = "log-dir", default_value = "logs")]
    log_dir: String,
}

impl Args {
    fn into_config(self) -> DaemonConfig {
        DaemonConfig {
            capture_dir: self.capture_dir,
            capture_file: self.capture_file,
            archive_dir: self.archive_dir,
            archive_max_files: self.archive_files,
            darknet_dir: self.darknet_dir,
            darknet_data: self.darknet_data,
            model_config: self.model_config,
            model_weights: self.model_weights,
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            detect_timeout: Duration::from_millis(self.detect_timeout_ms),
            detect_delay: Duration::from_millis(self.detect_delay_ms),
            listen_addr: self.listen_addr,
            ..DaemonConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_dir = args.log_dir.clone();
    let _logging_guard = logging::init_logging(&log_dir, logging::default_log_file())
        .context("failed to initialize logging")?;

    info!("darknetd v{}", darknetd::VERSION);

    let config = Arc::new(args.into_config());
    config.validate().context("invalid configuration")?;

    let shutdown = CancellationToken::new();

    // Initial startup: retry the whole handshake on a fixed backoff.
    // Once the detector is up, in-service failures are handled by the
    // supervisor's own restart task.
    let supervisor = loop {
        match DetectorSupervisor::start(Arc::clone(&config), shutdown.clone()).await {
            Ok(supervisor) => break supervisor,
            Err(err) => {
                warn!(
                    error = %err,
                    retry_in = ?config.restart_delay,
                    "detector startup failed"
                );
                tokio::time::sleep(config.restart_delay).await;
            }
        }
    };
    info!("detector process ready");

    let metrics = Metrics::new().context("failed to register metrics")?;
    let ring = Arc::new(DetectionRing::new(config.ring_capacity));

    tokio::spawn(
        ArchiveGcJob::new(
            config.archive_dir.clone(),
            config.archive_max_files,
            config.gc_interval,
            metrics.clone(),
        )
        .run(shutdown.clone()),
    );
    tokio::spawn(
        DetectionJob::new(
            Arc::clone(&config),
            Arc::clone(&supervisor),
            Arc::clone(&ring),
            metrics.clone(),
        )
        .run(shutdown.clone()),
    );

    let state = ApiState {
        ring,
        metrics,
        capture_path: config.latest_capture(),
        archive_dir: config.archive_dir.clone(),
    };
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "API listening");
    let server = tokio::spawn(api::serve(listener, state, shutdown.clone()));

    wait_for_shutdown().await;
    info!("shutting down");
    shutdown.cancel();
    supervisor.stop().await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "API server failed"),
        Err(err) => error!(error = %err, "API server task panicked"),
    }

    info!("darknetd stopped");
    Ok(())
}

/// Waits for SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
