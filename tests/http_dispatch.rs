//! HTTP dispatcher against a local stub backend.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;
use std::time::Duration;

use overlay_client::inference::{
    DispatchRequest, Dispatcher, HttpDispatcher, HttpDispatcherConfig, ProcessingMode,
};

struct CapturedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Serve exactly one request with `status` and `body`, returning what was received.
fn stub_backend(status: &'static str, body: &'static str) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub backend");
    let addr = listener.local_addr().expect("local addr");
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("header line");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        let length = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        let mut received = vec![0u8; length];
        reader.read_exact(&mut received).expect("request body");

        let mut stream = stream;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).expect("write response");
        stream.flush().ok();

        CapturedRequest {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: received,
        }
    });
    (format!("http://{}", addr), handle)
}

fn dispatcher(base_url: String) -> HttpDispatcher {
    HttpDispatcher::new(HttpDispatcherConfig {
        base_url,
        timeout: Duration::from_secs(5),
    })
    .expect("dispatcher")
}

#[test]
fn posts_frame_as_multipart_with_tunnel_header() {
    let (base, server) = stub_backend(
        "200 OK",
        r#"{"status":"success","latency_ms":42,"detections":[{"label":"cup","conf":0.87,"box":[100,50,80,60]}]}"#,
    );
    let mut dispatcher = dispatcher(base);
    let result = dispatcher.dispatch(&DispatchRequest::frame(vec![0xFF, 0xD8, 0xFF, 0xD9]));

    assert!(result.is_success(), "{:?}", result.failure_reason());
    assert_eq!(result.reported_latency_ms, 42.0);
    assert_eq!(result.detections[0].caption(), "cup 87%");

    let captured = server.join().expect("stub backend");
    assert_eq!(captured.request_line, "POST /process-frame HTTP/1.1");
    assert_eq!(captured.header("ngrok-skip-browser-warning"), Some("true"));
    let content_type = captured.header("content-type").expect("content type");
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let text = captured.body_text();
    assert!(text.contains("name=\"file\"; filename=\"frame.jpg\""));
    assert!(text.contains("Content-Type: image/jpeg"));
    assert!(!text.contains("name=\"mode\""));
}

#[test]
fn single_image_carries_mode_field() {
    let (base, server) = stub_backend(
        "200 OK",
        r#"{"status":"success","mode":"CPU","metrics":{"latency_ms":310.5,"fps":3.2},"detections":[],"logs":["[ARM] inference complete"]}"#,
    );
    let mut dispatcher = dispatcher(base);
    let request = DispatchRequest::single_image(
        vec![0x89, b'P', b'N', b'G'],
        "image/png",
        "bench.png",
        ProcessingMode::Cpu,
    );
    let result = dispatcher.dispatch(&request);

    assert!(result.is_success());
    assert_eq!(result.reported_latency_ms, 310.5);
    assert_eq!(result.telemetry.fps, Some(3.2));
    assert_eq!(result.logs, vec!["[ARM] inference complete".to_string()]);

    let captured = server.join().expect("stub backend");
    assert_eq!(captured.request_line, "POST /process-image HTTP/1.1");
    let text = captured.body_text();
    assert!(text.contains("filename=\"bench.png\""));
    assert!(text.contains("name=\"mode\"\r\n\r\ncpu\r\n"));
}

#[test]
fn http_error_status_resolves_to_failure() {
    let (base, server) = stub_backend("500 Internal Server Error", r#"{"detail":"boom"}"#);
    let mut dispatcher = dispatcher(base);
    let result = dispatcher.dispatch(&DispatchRequest::frame(vec![1, 2, 3]));

    assert!(!result.is_success());
    assert!(result.failure_reason().unwrap().contains("500"));
    server.join().expect("stub backend");
}

#[test]
fn invalid_payload_resolves_to_failure() {
    let (base, server) = stub_backend(
        "200 OK",
        r#"{"status":"success","latency_ms":5,"detections":[{"label":"cup","conf":1.7,"box":[1,2,3,4]}]}"#,
    );
    let mut dispatcher = dispatcher(base);
    let result = dispatcher.dispatch(&DispatchRequest::frame(vec![1, 2, 3]));

    assert!(!result.is_success());
    assert!(result.failure_reason().unwrap().contains("conf"));
    assert!(result.detections.is_empty());
    server.join().expect("stub backend");
}
