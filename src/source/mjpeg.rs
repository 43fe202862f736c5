//! Network camera source.
//!
//! This module provides `MjpegSource` for cameras that serve MJPEG
//! (`multipart/x-mixed-replace`) or single JPEG snapshots over HTTP.
//!
//! For MJPEG streams a reader thread decodes frames continuously and keeps only
//! the most recent one; `current_frame` never blocks on the network. Snapshot
//! cameras are fetched on demand.

use anyhow::{anyhow, Context, Result};
use image::RgbaImage;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use url::Url;

use super::FrameSource;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct MjpegConfig {
    /// Camera URL, http(s) only.
    pub url: String,
    /// Connect/read timeout for the initial request and snapshots.
    pub timeout: Duration,
}

impl Default for MjpegConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:81/stream".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct MjpegSource {
    config: MjpegConfig,
    mode: Option<CameraMode>,
    shared: Arc<ReaderShared>,
    reader: Option<JoinHandle<()>>,
}

enum CameraMode {
    Stream,
    Snapshot,
}

/// State shared with one reader thread. Every `open` gets a fresh copy so a
/// retired reader can never publish into a later connection.
#[derive(Default)]
struct ReaderShared {
    latest: Mutex<Option<RgbaImage>>,
    /// Why the reader thread exited, if it did.
    failure: Mutex<Option<String>>,
    shutdown: AtomicBool,
}

impl MjpegSource {
    pub fn new(config: MjpegConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse camera url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported camera scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        Ok(Self {
            config,
            mode: None,
            shared: Arc::new(ReaderShared::default()),
            reader: None,
        })
    }

    fn store_latest(&self, frame: RgbaImage) -> Result<()> {
        let mut guard = self
            .shared
            .latest
            .lock()
            .map_err(|_| anyhow!("camera frame lock poisoned"))?;
        *guard = Some(frame);
        Ok(())
    }

    fn reader_failure(&self) -> Option<String> {
        self.shared
            .failure
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    fn spawn_reader(&mut self, reader: Box<dyn Read + Send + Sync>) -> Result<()> {
        let shared = self.shared.clone();
        let url = self.config.url.clone();
        let handle = std::thread::Builder::new()
            .name("mjpeg-reader".to_string())
            .spawn(move || {
                let mut stream = MjpegStream::new(reader, shared.clone());
                loop {
                    let decoded = stream
                        .read_next_jpeg()
                        .and_then(|bytes| decode_jpeg(&bytes));
                    if shared.shutdown.load(Ordering::SeqCst) {
                        log::debug!("MjpegSource: {} reader closed", url);
                        break;
                    }
                    match decoded {
                        Ok(frame) => {
                            if let Ok(mut guard) = shared.latest.lock() {
                                *guard = Some(frame);
                            }
                        }
                        Err(err) => {
                            log::warn!("MjpegSource: {} stream ended: {:#}", url, err);
                            if let Ok(mut guard) = shared.failure.lock() {
                                *guard = Some(format!("{:#}", err));
                            }
                            break;
                        }
                    }
                }
            })
            .context("spawn mjpeg reader")?;
        self.reader = Some(handle);
        Ok(())
    }
}

impl FrameSource for MjpegSource {
    fn describe(&self) -> String {
        self.config.url.clone()
    }

    fn open(&mut self) -> Result<()> {
        self.close();
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(self.config.timeout)
            .build();
        let response = agent
            .get(&self.config.url)
            .call()
            .context("connect to camera stream")?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if content_type.contains("multipart") {
            self.spawn_reader(response.into_reader())?;
            self.mode = Some(CameraMode::Stream);
        } else {
            let mut bytes = Vec::new();
            response
                .into_reader()
                .take(MAX_JPEG_BYTES as u64)
                .read_to_end(&mut bytes)
                .context("read camera snapshot")?;
            self.store_latest(decode_jpeg(&bytes)?)?;
            self.mode = Some(CameraMode::Snapshot);
        }
        log::info!("MjpegSource: connected to {}", self.config.url);
        Ok(())
    }

    fn close(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        // The reader may be parked in a blocking read; it drops the connection
        // on its next wakeup, so detach rather than join.
        if self.reader.take().is_some() {
            log::debug!("MjpegSource: closing {}", self.config.url);
        }
        self.shared = Arc::new(ReaderShared::default());
        self.mode = None;
    }

    fn intrinsic_size(&self) -> (u32, u32) {
        self.shared
            .latest
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|frame| frame.dimensions()))
            .unwrap_or((0, 0))
    }

    fn current_frame(&mut self) -> Result<Option<RgbaImage>> {
        if let Some(reason) = self.reader_failure() {
            return Err(anyhow!("camera stream {} ended: {}", self.config.url, reason));
        }
        if let Some(CameraMode::Snapshot) = self.mode {
            let bytes = fetch_single_jpeg(&self.config.url, self.config.timeout)?;
            self.store_latest(decode_jpeg(&bytes)?)?;
        }
        let guard = self
            .shared
            .latest
            .lock()
            .map_err(|_| anyhow!("camera frame lock poisoned"))?;
        Ok(guard.clone())
    }
}

impl Drop for MjpegSource {
    fn drop(&mut self) {
        self.close();
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send + Sync>,
    buffer: Vec<u8>,
    shared: Arc<ReaderShared>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send + Sync>, shared: Arc<ReaderShared>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
            shared,
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            if self.shared.shutdown.load(Ordering::SeqCst) {
                return Err(anyhow!("mjpeg reader closed"));
            }
            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let response = ureq::AgentBuilder::new()
        .timeout(timeout)
        .build()
        .get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

fn decode_jpeg(bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    Ok(image.into_rgba8())
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Cursor, Write};
    use std::net::TcpListener;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Default)]
    struct CameraStats {
        accepted: AtomicUsize,
        disconnected: AtomicUsize,
    }

    fn tiny_jpeg() -> Vec<u8> {
        let frame = image::RgbImage::from_pixel(8, 6, image::Rgb([10, 200, 30]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(frame)
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .expect("encode jpeg");
        out.into_inner()
    }

    /// Serve an MJPEG stream to every client. `frames` caps how many parts
    /// each client gets before the server hangs up.
    fn camera(frames: Option<usize>) -> (String, Arc<CameraStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind camera");
        let addr = listener.local_addr().expect("local addr");
        let stats = Arc::new(CameraStats::default());
        let server_stats = stats.clone();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                server_stats.accepted.fetch_add(1, Ordering::SeqCst);
                let stats = server_stats.clone();
                std::thread::spawn(move || {
                    let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                    let mut line = String::new();
                    while matches!(reader.read_line(&mut line), Ok(n) if n > 0) && line != "\r\n" {
                        line.clear();
                    }
                    let mut stream = stream;
                    let jpeg = tiny_jpeg();
                    let header = "HTTP/1.1 200 OK\r\n\
                        Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
                        Connection: close\r\n\r\n";
                    let mut sent = 0;
                    let mut result = stream.write_all(header.as_bytes());
                    while result.is_ok() && frames.map_or(true, |max| sent < max) {
                        let part = format!(
                            "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                            jpeg.len()
                        );
                        result = stream
                            .write_all(part.as_bytes())
                            .and_then(|_| stream.write_all(&jpeg))
                            .and_then(|_| stream.write_all(b"\r\n"))
                            .and_then(|_| stream.flush());
                        sent += 1;
                        std::thread::sleep(Duration::from_millis(20));
                    }
                    if result.is_err() {
                        stats.disconnected.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        (format!("http://{}/stream", addr), stats)
    }

    fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn source(url: String) -> MjpegSource {
        MjpegSource::new(MjpegConfig {
            url,
            timeout: Duration::from_secs(5),
        })
        .expect("camera source")
    }

    #[test]
    fn reopening_releases_the_previous_connection() -> Result<()> {
        let (url, stats) = camera(None);
        let mut src = source(url);
        src.open()?;
        wait_until("first frame", || src.intrinsic_size() == (8, 6));

        src.open()?;
        wait_until("first connection to drop", || {
            stats.disconnected.load(Ordering::SeqCst) == 1
        });
        assert_eq!(stats.accepted.load(Ordering::SeqCst), 2);
        wait_until("frame on new connection", || src.intrinsic_size() == (8, 6));
        assert!(src.current_frame()?.is_some());

        src.close();
        assert_eq!(src.intrinsic_size(), (0, 0));
        wait_until("second connection to drop", || {
            stats.disconnected.load(Ordering::SeqCst) == 2
        });
        Ok(())
    }

    #[test]
    fn ended_stream_surfaces_as_frame_error() -> Result<()> {
        let (url, _stats) = camera(Some(1));
        let mut src = source(url);
        src.open()?;

        let mut failure = None;
        wait_until("stream end to surface", || match src.current_frame() {
            Err(err) => {
                failure = Some(format!("{:#}", err));
                true
            }
            Ok(_) => false,
        });
        let failure = failure.unwrap_or_default();
        assert!(failure.contains("ended"), "{}", failure);
        // The last frame keeps its size so samplers still reach `current_frame`.
        assert_eq!(src.intrinsic_size(), (8, 6));
        assert!(src.current_frame().is_err());
        Ok(())
    }

    #[test]
    fn finds_jpeg_markers_in_multipart_noise() {
        let buffer = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8abc\xFF\xD9\r\n--frame";
        let (start, end) = find_jpeg_bounds(buffer).unwrap();
        assert_eq!(&buffer[start..end], b"\xFF\xD8abc\xFF\xD9");
    }

    #[test]
    fn incomplete_jpeg_has_no_bounds() {
        assert!(find_jpeg_bounds(b"\xFF\xD8abc").is_none());
        assert!(find_jpeg_bounds(b"no markers").is_none());
    }

    #[test]
    fn reads_consecutive_frames_from_stream() -> Result<()> {
        let data = b"xx\xFF\xD81\xFF\xD9yy\xFF\xD82\xFF\xD9".to_vec();
        let shared = Arc::new(ReaderShared::default());
        let mut stream = MjpegStream::new(Box::new(std::io::Cursor::new(data)), shared);
        assert_eq!(stream.read_next_jpeg()?, b"\xFF\xD81\xFF\xD9");
        assert_eq!(stream.read_next_jpeg()?, b"\xFF\xD82\xFF\xD9");
        assert!(stream.read_next_jpeg().is_err());
        Ok(())
    }

    #[test]
    fn rejects_non_http_camera_urls() {
        assert!(MjpegSource::new(MjpegConfig {
            url: "udp://0.0.0.0:5000".to_string(),
            ..MjpegConfig::default()
        })
        .is_err());
    }
}
