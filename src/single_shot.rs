//! One-shot still image upload.
//!
//! Sends one image to the single-image endpoint, appends the backend's logs to
//! the session log, and paints the detections over the image. A failed upload
//! is reported once; nothing is retried.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbaImage};

use crate::config::ClientConfig;
use crate::inference::{
    dispatcher_for, DispatchRequest, Dispatcher, InferenceResult, ProcessingMode,
};
use crate::overlay::{OverlayPlan, OverlayRenderer, OverlayStyle};
use crate::session_log::SessionLog;

/// Outcome of a successful upload.
#[derive(Debug)]
pub struct SingleShotReport {
    pub image: PathBuf,
    pub mode: ProcessingMode,
    pub result: InferenceResult,
    /// Input image with the overlay painted on it, at the image's own size.
    pub surface: RgbaImage,
    pub plan: OverlayPlan,
    pub log: Vec<String>,
}

pub struct SingleShot {
    dispatcher: Box<dyn Dispatcher>,
    renderer: OverlayRenderer,
    log: SessionLog,
}

impl SingleShot {
    pub fn new(
        dispatcher: Box<dyn Dispatcher>,
        renderer: OverlayRenderer,
        log: SessionLog,
    ) -> Self {
        Self {
            dispatcher,
            renderer,
            log,
        }
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    /// Upload `image_path` with `mode`. The session log is reset first, as each
    /// image starts a fresh transcript.
    pub fn run(&mut self, image_path: &Path, mode: ProcessingMode) -> Result<SingleShotReport> {
        self.log.clear();

        let bytes = std::fs::read(image_path)
            .with_context(|| format!("read image {}", image_path.display()))?;
        let format = image::guess_format(&bytes)
            .with_context(|| format!("detect image format of {}", image_path.display()))?;
        let content_type = content_type_for(format)
            .ok_or_else(|| anyhow!("unsupported image format {:?}", format))?;
        let frame = image::load_from_memory_with_format(&bytes, format)
            .with_context(|| format!("decode image {}", image_path.display()))?
            .into_rgba8();

        let file_name = image_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();

        self.log.system(format!(
            "Initializing transfer to {} core...",
            mode.as_str().to_ascii_uppercase()
        ));
        log::info!(
            "single-shot: uploading {} ({} bytes) via {} in {} mode",
            image_path.display(),
            bytes.len(),
            self.dispatcher.name(),
            mode
        );

        let request = DispatchRequest::single_image(bytes, content_type, file_name, mode);
        let result = self.dispatcher.dispatch(&request);
        if let Some(reason) = result.failure_reason() {
            self.log.error("Connection to Zynq Board failed.");
            log::warn!("single-shot: upload failed: {}", reason);
            return Err(anyhow!("connection to board failed: {}", reason));
        }

        if !result.logs.is_empty() {
            self.log.extend_backend(result.logs.iter().cloned());
        }

        let mut surface = RgbaImage::new(frame.width().max(1), frame.height().max(1));
        let plan = self.renderer.render(&mut surface, &frame, &result.detections);
        log::info!(
            "single-shot: {} detections, backend latency {:.1} ms",
            result.detections.len(),
            result.reported_latency_ms
        );

        Ok(SingleShotReport {
            image: image_path.to_path_buf(),
            mode,
            result,
            surface,
            plan,
            log: self.log.lines().map(|line| line.to_string()).collect(),
        })
    }
}

/// Build a `SingleShot` from config and run it once.
pub fn run_single_shot(
    config: &ClientConfig,
    image_path: &Path,
    mode: ProcessingMode,
) -> Result<SingleShotReport> {
    let dispatcher = dispatcher_for(&config.backend_url, config.stream.timeout)?;
    let mut renderer = OverlayRenderer::new(OverlayStyle::default());
    if let Some(path) = config.overlay.font_path.as_deref() {
        renderer = renderer.with_font(OverlayRenderer::load_font(path)?);
    }
    let log = SessionLog::new(config.stream.log_capacity);
    SingleShot::new(dispatcher, renderer, log).run(image_path, mode)
}

fn content_type_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StubDispatcher;
    use crate::session_log::LogKind;

    fn write_png(dir: &Path) -> PathBuf {
        let path = dir.join("bench.png");
        RgbaImage::from_pixel(320, 240, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn logs_transfer_and_renders_detections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path());
        let mut shot = SingleShot::new(
            Box::new(StubDispatcher::new().with_latency(std::time::Duration::ZERO)),
            OverlayRenderer::new(OverlayStyle::default()),
            SessionLog::new(50),
        );

        let report = shot.run(&path, ProcessingMode::Cpu).unwrap();
        assert_eq!(report.surface.dimensions(), (320, 240));
        assert_eq!(report.plan.boxes.len(), report.result.detections.len());
        assert!(report.log[0].ends_with("[System] Initializing transfer to CPU core..."));
    }

    #[test]
    fn failure_is_logged_once_and_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path());
        let mut shot = SingleShot::new(
            Box::new(
                StubDispatcher::new()
                    .with_latency(std::time::Duration::ZERO)
                    .failing_every(1),
            ),
            OverlayRenderer::new(OverlayStyle::default()),
            SessionLog::new(50),
        );

        let err = shot.run(&path, ProcessingMode::Fpga).unwrap_err();
        assert!(err.to_string().contains("connection to board failed"));
        let log = shot.session_log();
        assert_eq!(log.count(LogKind::Error), 1);
        assert_eq!(log.last().unwrap().text, "[Error] Connection to Zynq Board failed.");
    }

    #[test]
    fn rejects_non_image_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not an image").unwrap();
        let mut shot = SingleShot::new(
            Box::new(StubDispatcher::new()),
            OverlayRenderer::new(OverlayStyle::default()),
            SessionLog::new(50),
        );
        assert!(shot.run(&path, ProcessingMode::Fpga).is_err());
        assert!(shot.session_log().is_empty());
    }
}
