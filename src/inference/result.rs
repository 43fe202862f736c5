//! Typed inference results and backend response validation.
//!
//! Backend responses are loosely shaped JSON. They are decoded into wire structs
//! with every field optional, then validated into `InferenceResult`. A response
//! missing a required field is a `ResponseError`, never an empty result.

use serde::Deserialize;
use std::fmt;

/// Axis-aligned box in pixel units of the rendered surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxPx {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoxPx {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A labeled, confidence-scored region returned by the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    /// Confidence in 0..=1.
    pub confidence: f32,
    pub bbox: BoxPx,
}

impl Detection {
    /// Chip caption, e.g. `cup 87%`.
    pub fn caption(&self) -> String {
        format!("{} {}%", self.label, (self.confidence * 100.0).round() as u32)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InferenceStatus {
    Success,
    Failure(String),
}

/// Extra fields only the single-image endpoint reports.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendTelemetry {
    pub mode: Option<String>,
    pub device: Option<String>,
    pub fps: Option<f64>,
    pub power_usage: Option<String>,
}

/// One completed request.
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceResult {
    pub status: InferenceStatus,
    pub reported_latency_ms: f64,
    /// Backend insertion order, not sorted.
    pub detections: Vec<Detection>,
    pub telemetry: BackendTelemetry,
    pub logs: Vec<String>,
}

impl InferenceResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: InferenceStatus::Failure(reason.into()),
            reported_latency_ms: 0.0,
            detections: Vec::new(),
            telemetry: BackendTelemetry::default(),
            logs: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, InferenceStatus::Success)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            InferenceStatus::Success => None,
            InferenceStatus::Failure(reason) => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseError {
    Malformed(String),
    MissingField(&'static str),
    BackendStatus(String),
    InvalidDetection { index: usize, reason: String },
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseError::Malformed(err) => write!(f, "malformed response: {}", err),
            ResponseError::MissingField(field) => {
                write!(f, "response missing required field '{}'", field)
            }
            ResponseError::BackendStatus(status) => {
                write!(f, "backend reported status '{}'", status)
            }
            ResponseError::InvalidDetection { index, reason } => {
                write!(f, "detection {} invalid: {}", index, reason)
            }
        }
    }
}

impl std::error::Error for ResponseError {}

#[derive(Debug, Deserialize, Default)]
struct WireResponse {
    status: Option<String>,
    latency_ms: Option<f64>,
    mode: Option<String>,
    device: Option<String>,
    metrics: Option<WireMetrics>,
    detections: Option<Vec<WireDetection>>,
    logs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct WireMetrics {
    latency_ms: Option<f64>,
    fps: Option<f64>,
    power_usage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    label: Option<String>,
    conf: Option<f64>,
    #[serde(rename = "box")]
    bbox: Option<Vec<f64>>,
}

/// Decode and validate a backend response body.
///
/// Required: `status` (must be `"success"`), `latency_ms` (top-level or under
/// `metrics`), and `detections`. Each detection needs a label, a `conf` in
/// 0..=1, and a four-element `box` with non-negative width and height.
pub fn parse_response(body: &[u8]) -> Result<InferenceResult, ResponseError> {
    let wire: WireResponse =
        serde_json::from_slice(body).map_err(|e| ResponseError::Malformed(e.to_string()))?;

    let status = wire.status.ok_or(ResponseError::MissingField("status"))?;
    if !status.eq_ignore_ascii_case("success") {
        return Err(ResponseError::BackendStatus(status));
    }

    let metrics = wire.metrics.unwrap_or_default();
    let latency = wire
        .latency_ms
        .or(metrics.latency_ms)
        .ok_or(ResponseError::MissingField("latency_ms"))?;
    if !latency.is_finite() || latency < 0.0 {
        return Err(ResponseError::Malformed(format!(
            "latency_ms must be a non-negative number, got {}",
            latency
        )));
    }

    let raw = wire
        .detections
        .ok_or(ResponseError::MissingField("detections"))?;
    let detections = raw
        .into_iter()
        .enumerate()
        .map(|(index, det)| validate_detection(index, det))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InferenceResult {
        status: InferenceStatus::Success,
        reported_latency_ms: latency,
        detections,
        telemetry: BackendTelemetry {
            mode: wire.mode,
            device: wire.device,
            fps: metrics.fps,
            power_usage: metrics.power_usage,
        },
        logs: wire.logs.unwrap_or_default(),
    })
}

fn validate_detection(index: usize, det: WireDetection) -> Result<Detection, ResponseError> {
    let invalid = |reason: &str| ResponseError::InvalidDetection {
        index,
        reason: reason.to_string(),
    };
    let label = det.label.ok_or_else(|| invalid("missing label"))?;
    let conf = det.conf.ok_or_else(|| invalid("missing conf"))?;
    if !(0.0..=1.0).contains(&conf) {
        return Err(invalid("conf outside 0..1"));
    }
    let bbox = det.bbox.ok_or_else(|| invalid("missing box"))?;
    let &[x, y, w, h] = bbox.as_slice() else {
        return Err(invalid("box must have exactly four elements"));
    };
    if [x, y, w, h].iter().any(|v| !v.is_finite()) {
        return Err(invalid("box contains a non-finite value"));
    }
    if w < 0.0 || h < 0.0 {
        return Err(invalid("box has negative size"));
    }
    Ok(Detection {
        label,
        confidence: conf as f32,
        bbox: BoxPx::new(x as f32, y as f32, w as f32, h as f32),
    })
}
