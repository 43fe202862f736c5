//! Live streaming: session lifecycle, pacing, dispatch and overlay updates.

pub mod controller;
pub mod runtime;
pub mod session;
pub mod sink;
pub mod worker;

pub use controller::{
    CompletionOutcome, ControllerConfig, DispatchCompletion, DispatchJob, DispatchPort,
    StreamController, StreamState, StreamStats, StreamStatus, DEFAULT_PACING,
};
pub use runtime::{StreamHandle, StreamRuntime};
pub use session::{Generation, GenerationCounter, SessionToken, StreamSession};
pub use sink::{FileSink, OverlaySink};
pub use worker::DispatchWorker;
