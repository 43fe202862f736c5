mod dispatcher;
mod http;
pub mod multipart;
mod result;
mod stub;

pub use dispatcher::{
    DispatchRequest, Dispatcher, Endpoint, ProcessingMode, SKIP_TUNNEL_WARNING_HEADER,
};
pub use http::{HttpDispatcher, HttpDispatcherConfig};
pub use result::{
    parse_response, BackendTelemetry, BoxPx, Detection, InferenceResult, InferenceStatus,
    ResponseError,
};
pub use stub::StubDispatcher;

use anyhow::Result;
use std::time::Duration;

/// Build a dispatcher for a backend base URL. `stub://` selects the offline stub.
pub fn dispatcher_for(base_url: &str, timeout: Duration) -> Result<Box<dyn Dispatcher>> {
    if base_url.starts_with("stub://") {
        log::info!("dispatcher: using stub backend ({})", base_url);
        return Ok(Box::new(StubDispatcher::new()));
    }
    let dispatcher = HttpDispatcher::new(HttpDispatcherConfig {
        base_url: base_url.to_string(),
        timeout,
    })?;
    log::info!("dispatcher: posting frames to {}", base_url);
    Ok(Box::new(dispatcher))
}
