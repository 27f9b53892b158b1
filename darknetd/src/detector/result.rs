//! Detection result data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bounding-box prediction.
///
/// Coordinates are pixel values as reported by the detector. The
/// expected ordering (`left <= right`, `top <= bottom`) is not enforced;
/// the values are passed through as parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Predicted class name.
    pub class: String,
    /// Confidence in percent (0-100).
    pub prob: i64,
    pub left: i64,
    pub right: i64,
    pub top: i64,
    pub bottom: i64,
}

/// One completed inference job.
///
/// Immutable after construction; built by the detection job once per
/// tick and pushed into the ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Source image file name.
    pub image: String,
    /// Name of the annotated image stored in the archive
    /// (`predictions_<image>`).
    pub pred_image: String,
    /// Capture time, taken from the source file's modification time.
    pub image_time: DateTime<Utc>,
    /// When the annotated image was archived.
    pub pred_time: DateTime<Utc>,
    /// Inference time in seconds as reported by the detector.
    pub time_detect: f64,
    /// Wall-clock seconds for the whole job.
    pub time_total: f64,
    /// Predictions in parser emission order.
    pub objects: Vec<DetectedObject>,
}
