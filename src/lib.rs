//! Overlay Client
//!
//! Client side of a remote object-detection service. Frames from a still image
//! or a live source are posted to an inference backend over HTTP and the
//! returned bounding boxes are painted over the frame.
//!
//! # Architecture
//!
//! The live loop is a single-writer state machine (`stream::StreamController`)
//! that guarantees, by construction:
//!
//! 1. **One request in flight**: no frame is captured while a dispatch is
//!    outstanding.
//! 2. **Self-pacing**: the next capture is scheduled a fixed interval after the
//!    previous result was handled.
//! 3. **No stale side effects**: every dispatch carries a session token; results
//!    from a stopped or replaced session never touch the surface, the metrics,
//!    or the session log.
//!
//! # Module Structure
//!
//! - `source`: Live raster sources (synthetic, still image, MJPEG camera)
//! - `sampler`: Frame capture and JPEG encoding
//! - `inference`: Backend dispatch, response validation, stub backend
//! - `metrics`: Latency and throughput snapshot
//! - `overlay`: Box and label rendering
//! - `session_log`: Bounded user-visible log
//! - `stream`: Streaming controller, event-loop runtime, overlay sinks
//! - `single_shot`: One-shot image upload
//! - `config`: File and environment configuration

pub mod config;
pub mod inference;
pub mod metrics;
pub mod overlay;
pub mod sampler;
pub mod session_log;
pub mod single_shot;
pub mod source;
pub mod stream;

pub use config::ClientConfig;
pub use inference::{
    dispatcher_for, parse_response, BoxPx, DispatchRequest, Dispatcher, Detection, Endpoint,
    HttpDispatcher, HttpDispatcherConfig, InferenceResult, InferenceStatus, ProcessingMode,
    ResponseError, StubDispatcher,
};
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use overlay::{OverlayPlan, OverlayRenderer, OverlayStyle, LABEL_HEIGHT};
pub use sampler::{FrameSampler, SampleError, SampledFrame};
pub use session_log::{LogKind, LogLine, SessionLog};
pub use single_shot::{run_single_shot, SingleShot, SingleShotReport};
pub use source::{source_for, FrameSource, StillImageSource, SyntheticConfig, SyntheticSource};
pub use stream::{
    ControllerConfig, FileSink, OverlaySink, StreamController, StreamHandle, StreamRuntime,
    StreamState, StreamStatus,
};
