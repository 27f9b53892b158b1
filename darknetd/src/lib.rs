//! darknetd - run a darknet detector as a service, with a REST API.
//!
//! The service supervises one long-running darknet process, feeds it
//! the newest captured image on a cadence, parses its textual output
//! into structured detection results, and exposes the recent results
//! and stored images over HTTP with Prometheus metrics.
//!
//! # Architecture
//!
//! ```text
//! capture dir ──▶ DetectionJob ──▶ DetectorSupervisor ──▶ darknet
//!                     │                                  process
//!                     ▼
//!               DetectionRing ──▶ HTTP API (/objects, /image/..)
//!                     ▲
//! archive dir ◀── ArchiveGcJob (retention)
//! ```
//!
//! The [`detector`] module owns the subprocess protocol; [`jobs`] holds
//! the periodic pipelines; [`ring`], [`archive`], [`metrics`], and
//! [`api`] are the read side.

pub mod api;
pub mod archive;
pub mod config;
pub mod detector;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod ring;

/// Version of the darknetd library and CLI.
///
/// This is synchronized across all components in the workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
