use std::time::Duration;

use super::dispatcher::{DispatchRequest, Dispatcher};
use super::result::{BackendTelemetry, BoxPx, Detection, InferenceResult, InferenceStatus};

/// Offline dispatcher selected with a `stub://` backend URL.
///
/// Returns one deterministic detection that drifts across the surface so the
/// overlay visibly moves. Every `fail_every`-th call (when non-zero) fails.
pub struct StubDispatcher {
    calls: u64,
    latency: Duration,
    fail_every: u64,
}

impl StubDispatcher {
    pub fn new() -> Self {
        Self {
            calls: 0,
            latency: Duration::from_millis(15),
            fail_every: 0,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for StubDispatcher {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn dispatch(&mut self, request: &DispatchRequest) -> InferenceResult {
        self.calls += 1;
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if self.fail_every > 0 && self.calls % self.fail_every == 0 {
            return InferenceResult::failure("stub backend dropped the frame");
        }
        if request.payload.is_empty() {
            return InferenceResult::failure("empty payload");
        }

        let drift = (self.calls % 40) as f32 * 8.0;
        InferenceResult {
            status: InferenceStatus::Success,
            reported_latency_ms: self.latency.as_secs_f64() * 1000.0,
            detections: vec![Detection {
                label: "cup".to_string(),
                confidence: 0.87,
                bbox: BoxPx::new(100.0 + drift, 50.0, 80.0, 60.0),
            }],
            telemetry: BackendTelemetry {
                mode: request.mode.map(|m| m.as_str().to_uppercase()),
                device: Some("stub".to_string()),
                fps: None,
                power_usage: None,
            },
            logs: match request.mode {
                Some(mode) => vec![format!("[Stub] {} core processed frame", mode.as_str())],
                None => Vec::new(),
            },
        }
    }
}
