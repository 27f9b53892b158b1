//! Tolerant parser for the detector's token stream.
//!
//! The detector's stdout is not a stable format - it interleaves its
//! prompt, progress text, and per-prediction lines, and upstream builds
//! change the details freely. The parser therefore never fails: it
//! scans left to right for the anchors it knows, logs anything
//! unexpected as a diagnostic, and returns whatever it recognized. A
//! hard parse failure would stall the whole pipeline on one malformed
//! line; a zeroed field in one result does not.
//!
//! Recognized anchors, matching the output of darknet's
//! `detector test` mode:
//!
//! ```text
//! <path>: Predicted in 0.023 seconds.
//! CLASS person 87 BBOX 10 50 5 40
//! Enter Image Path:
//! ```

use super::result::DetectedObject;
use super::READY_TOKEN;
use tracing::warn;

/// Unit word the detector emits when reporting milliseconds; durations
/// carrying it are normalized to seconds.
const MILLISECONDS_UNIT: &str = "milli-seconds.";

/// Parser output: the fields of a detection result that come from the
/// token stream. The caller fills in the file-level fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    /// Inference time in seconds; zero when no `Predicted` anchor was
    /// present or its duration was malformed.
    pub time_detect: f64,
    /// One entry per `CLASS` anchor, in emission order.
    pub objects: Vec<DetectedObject>,
}

/// Parses one response's token list.
///
/// `image_path` is the path submitted for this job; the detector echoes
/// it back suffixed with a colon, and that echo is skipped as
/// structural noise along with the prompt words.
pub fn parse_output(image_path: &str, words: &[String]) -> ParsedOutput {
    let echo = format!("{image_path}:");
    let mut output = ParsedOutput::default();

    let mut i = 0;
    while i < words.len() {
        match words[i].as_str() {
            "Predicted" => {
                // "Predicted in <duration> <unit>"
                i += 2;
                output.time_detect = parse_number(words.get(i));
                i += 1;
                if words.get(i).map(String::as_str) == Some(MILLISECONDS_UNIT) {
                    output.time_detect /= 1000.0;
                }
            }
            "CLASS" => {
                // "CLASS <name> <confidence> BBOX <left> <right> <top> <bottom>"
                let mut object = DetectedObject::default();
                i += 1;
                object.class = words.get(i).cloned().unwrap_or_default();
                i += 1;
                object.prob = parse_number(words.get(i));
                i += 2;
                object.left = parse_number(words.get(i));
                i += 1;
                object.right = parse_number(words.get(i));
                i += 1;
                object.top = parse_number(words.get(i));
                i += 1;
                object.bottom = parse_number(words.get(i));
                output.objects.push(object);
            }
            // Prompt words and the request echo.
            "Enter" | "Image" | READY_TOKEN => {}
            word if word == echo => {}
            word => {
                warn!(token = word, "unexpected detector output token");
            }
        }
        i += 1;
    }

    output
}

/// Parses one numeric token, tolerating absence and malformed text.
fn parse_number<T: std::str::FromStr + Default>(word: Option<&String>) -> T {
    let Some(word) = word else {
        warn!("detector output truncated mid-record");
        return T::default();
    };
    match word.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(token = %word, "malformed numeric token in detector output");
            T::default()
        }
    }
}
