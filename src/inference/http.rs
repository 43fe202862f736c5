//! HTTP inference dispatcher.
//!
//! Posts one `multipart/form-data` request per call and validates the JSON
//! response. Nothing here returns `Err` to the caller: every transport,
//! status, or decoding problem becomes `InferenceStatus::Failure`.

use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::dispatcher::{DispatchRequest, Dispatcher, SKIP_TUNNEL_WARNING_HEADER};
use super::multipart::MultipartBuilder;
use super::result::{parse_response, InferenceResult};

const MAX_RESPONSE_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct HttpDispatcherConfig {
    /// Backend base URL, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl Default for HttpDispatcherConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct HttpDispatcher {
    base: Url,
    agent: ureq::Agent,
}

impl HttpDispatcher {
    pub fn new(config: HttpDispatcherConfig) -> Result<Self> {
        let base = Url::parse(config.base_url.trim()).context("parse backend url")?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported backend scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self { base, agent })
    }

    pub fn endpoint_url(&self, request: &DispatchRequest) -> String {
        format!(
            "{}{}",
            self.base.as_str().trim_end_matches('/'),
            request.endpoint.path()
        )
    }

    fn round_trip(&self, request: &DispatchRequest) -> Result<Vec<u8>> {
        let mut form = MultipartBuilder::new().file(
            "file",
            &request.file_name,
            request.content_type,
            &request.payload,
        );
        if let Some(mode) = request.mode {
            form = form.text("mode", mode.as_str());
        }
        let body = form.finish();

        let url = self.endpoint_url(request);
        let response = match self
            .agent
            .post(&url)
            .set("Content-Type", &body.content_type())
            .set(SKIP_TUNNEL_WARNING_HEADER, "true")
            .send_bytes(&body.bytes)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let reason = response.status_text().to_string();
                return Err(anyhow!("backend returned HTTP {} {}", code, reason));
            }
            Err(err) => return Err(anyhow!(err).context(format!("post to {}", url))),
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut bytes)
            .context("read backend response")?;
        Ok(bytes)
    }
}

impl Dispatcher for HttpDispatcher {
    fn name(&self) -> &'static str {
        "http"
    }

    fn dispatch(&mut self, request: &DispatchRequest) -> InferenceResult {
        let body = match self.round_trip(request) {
            Ok(body) => body,
            Err(err) => return InferenceResult::failure(format!("{:#}", err)),
        };
        match parse_response(&body) {
            Ok(result) => result,
            Err(err) => InferenceResult::failure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::dispatcher::Endpoint;

    #[test]
    fn builds_endpoint_urls_without_double_slashes() {
        let dispatcher = HttpDispatcher::new(HttpDispatcherConfig {
            base_url: "http://board.local:8000/".to_string(),
            ..HttpDispatcherConfig::default()
        })
        .unwrap();
        let request = DispatchRequest::frame(vec![1, 2, 3]);
        assert_eq!(request.endpoint, Endpoint::Frame);
        assert_eq!(
            dispatcher.endpoint_url(&request),
            "http://board.local:8000/process-frame"
        );
    }

    #[test]
    fn rejects_non_http_schemes() {
        let err = HttpDispatcher::new(HttpDispatcherConfig {
            base_url: "ftp://board".to_string(),
            ..HttpDispatcherConfig::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn unreachable_backend_resolves_to_failure() {
        let mut dispatcher = HttpDispatcher::new(HttpDispatcherConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_millis(500),
        })
        .unwrap();
        let result = dispatcher.dispatch(&DispatchRequest::frame(vec![0xFF, 0xD8]));
        assert!(!result.is_success());
        assert!(result.detections.is_empty());
    }
}
