use std::fmt;

use super::result::InferenceResult;

/// Header that suppresses the interstitial warning page of tunneling proxies.
pub const SKIP_TUNNEL_WARNING_HEADER: &str = "ngrok-skip-browser-warning";

/// Backend endpoint a payload is sent to. The contract is identical for both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Live stream frame.
    Frame,
    /// One-shot still image upload.
    SingleImage,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Frame => "/process-frame",
            Endpoint::SingleImage => "/process-image",
        }
    }
}

/// Processing backend selector forwarded to the single-image endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessingMode {
    Cpu,
    #[default]
    Fpga,
}

impl ProcessingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingMode::Cpu => "cpu",
            ProcessingMode::Fpga => "fpga",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" | "arm" => Some(ProcessingMode::Cpu),
            "fpga" => Some(ProcessingMode::Fpga),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded payload plus routing for one round trip.
#[derive(Clone, Debug)]
pub struct DispatchRequest {
    pub endpoint: Endpoint,
    /// Encoded image bytes (JPEG for stream frames).
    pub payload: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
    pub mode: Option<ProcessingMode>,
}

impl DispatchRequest {
    pub fn frame(payload: Vec<u8>) -> Self {
        Self {
            endpoint: Endpoint::Frame,
            payload,
            content_type: "image/jpeg",
            file_name: "frame.jpg".to_string(),
            mode: None,
        }
    }

    pub fn single_image(
        payload: Vec<u8>,
        content_type: &'static str,
        file_name: impl Into<String>,
        mode: ProcessingMode,
    ) -> Self {
        Self {
            endpoint: Endpoint::SingleImage,
            payload,
            content_type,
            file_name: file_name.into(),
            mode: Some(mode),
        }
    }
}

/// Inference dispatcher.
///
/// One call is one logical network round trip with no internal retry. Transport
/// and protocol failures resolve to `InferenceStatus::Failure`; implementations
/// must not panic or otherwise unwind into the caller.
pub trait Dispatcher: Send {
    /// Dispatcher identifier for logs.
    fn name(&self) -> &'static str;

    fn dispatch(&mut self, request: &DispatchRequest) -> InferenceResult;
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn dispatch(&mut self, request: &DispatchRequest) -> InferenceResult {
        (**self).dispatch(request)
    }
}
