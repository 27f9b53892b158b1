//! Detector process supervision and output parsing.
//!
//! The detector is an external long-running process spoken to over a
//! line-oriented text protocol:
//!
//! - **Request**: one absolute image path per line on stdin.
//! - **Response**: an unstructured, whitespace-tokenized stream on
//!   stdout, terminated by the [`READY_TOKEN`] sentinel. The same token
//!   signals readiness after model load at startup - it is the single
//!   synchronization token of the wire protocol.
//!
//! Module layout:
//!
//! - [`token_reader`] - whitespace token scanner over the stdout pipe
//! - [`parser`] - tolerant token-list parser producing typed detections
//! - [`process`] - process spawn, stderr drain, readiness handshake
//! - [`supervisor`] - single-flight submit protocol plus the
//!   `{Starting, Ready, Failed, Restarting}` restart state machine
//! - [`result`] - the [`DetectionResult`] data model

pub mod parser;
mod process;
pub mod result;
pub mod supervisor;
pub mod token_reader;

pub use parser::{parse_output, ParsedOutput};
pub use result::{DetectedObject, DetectionResult};
pub use supervisor::{DetectorState, DetectorSupervisor};
pub use token_reader::TokenReader;

/// The detector's protocol sentinel.
///
/// Emitted as part of the `Enter Image Path:` prompt: its first
/// occurrence signals the model has loaded, every later occurrence
/// marks the end of one response and readiness for the next job.
pub const READY_TOKEN: &str = "Path:";
