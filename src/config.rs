use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::inference::ProcessingMode;
use crate::sampler::DEFAULT_JPEG_QUALITY;
use crate::session_log::DEFAULT_LOG_CAPACITY;
use crate::stream::{ControllerConfig, DEFAULT_PACING};

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SURFACE_WIDTH: u32 = 640;
const DEFAULT_SURFACE_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    backend_url: Option<String>,
    mode: Option<String>,
    stream: Option<StreamConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    source: Option<String>,
    pacing_ms: Option<u64>,
    timeout_ms: Option<u64>,
    jpeg_quality: Option<u8>,
    log_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    font_path: Option<PathBuf>,
    output: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    pub mode: ProcessingMode,
    pub stream: StreamSettings,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub source: String,
    pub pacing: Duration,
    pub timeout: Duration,
    pub jpeg_quality: u8,
    pub log_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub width: u32,
    pub height: u32,
    pub font_path: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            mode: ProcessingMode::default(),
            stream: StreamSettings {
                source: DEFAULT_SOURCE.to_string(),
                pacing: DEFAULT_PACING,
                timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
                jpeg_quality: DEFAULT_JPEG_QUALITY,
                log_capacity: DEFAULT_LOG_CAPACITY,
            },
            overlay: OverlaySettings {
                width: DEFAULT_SURFACE_WIDTH,
                height: DEFAULT_SURFACE_HEIGHT,
                font_path: None,
                output: None,
            },
        }
    }
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("OVERLAY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(url) = file.backend_url {
            cfg.backend_url = url;
        }
        if let Some(mode) = file.mode.as_deref() {
            cfg.mode = parse_mode(mode)?;
        }
        if let Some(stream) = file.stream {
            if let Some(source) = stream.source {
                cfg.stream.source = source;
            }
            if let Some(ms) = stream.pacing_ms {
                cfg.stream.pacing = Duration::from_millis(ms);
            }
            if let Some(ms) = stream.timeout_ms {
                cfg.stream.timeout = Duration::from_millis(ms);
            }
            if let Some(quality) = stream.jpeg_quality {
                cfg.stream.jpeg_quality = quality;
            }
            if let Some(capacity) = stream.log_capacity {
                cfg.stream.log_capacity = capacity;
            }
        }
        if let Some(overlay) = file.overlay {
            cfg.overlay.width = overlay.width.unwrap_or(cfg.overlay.width);
            cfg.overlay.height = overlay.height.unwrap_or(cfg.overlay.height);
            cfg.overlay.font_path = overlay.font_path;
            cfg.overlay.output = overlay.output;
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("OVERLAY_BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend_url = url.trim().to_string();
            }
        }
        if let Ok(mode) = std::env::var("OVERLAY_MODE") {
            if !mode.trim().is_empty() {
                self.mode = parse_mode(&mode)?;
            }
        }
        if let Ok(source) = std::env::var("OVERLAY_SOURCE") {
            if !source.trim().is_empty() {
                self.stream.source = source.trim().to_string();
            }
        }
        if let Ok(pacing) = std::env::var("OVERLAY_PACING_MS") {
            let ms: u64 = pacing.trim().parse().map_err(|_| {
                anyhow!("OVERLAY_PACING_MS must be an integer number of milliseconds")
            })?;
            self.stream.pacing = Duration::from_millis(ms);
        }
        if let Ok(timeout) = std::env::var("OVERLAY_TIMEOUT_MS") {
            let ms: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("OVERLAY_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.stream.timeout = Duration::from_millis(ms);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_backend_url(&self.backend_url)?;
        if self.stream.pacing.is_zero() {
            return Err(anyhow!("pacing interval must be greater than zero"));
        }
        if self.stream.timeout.is_zero() {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        if self.overlay.width == 0 || self.overlay.height == 0 {
            return Err(anyhow!(
                "overlay surface must be non-zero (got {}x{})",
                self.overlay.width,
                self.overlay.height
            ));
        }
        if self.stream.source.trim().is_empty() {
            return Err(anyhow!("stream source must not be empty"));
        }
        if self.stream.log_capacity == 0 {
            return Err(anyhow!("session log capacity must be greater than zero"));
        }
        Ok(())
    }

    /// Controller settings derived from this config.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            pacing: self.stream.pacing,
            surface_size: (self.overlay.width, self.overlay.height),
            jpeg_quality: self.stream.jpeg_quality,
            log_capacity: self.stream.log_capacity,
        }
    }
}

/// Accepts `http(s)://` backends and the offline `stub://` backend.
pub fn validate_backend_url(value: &str) -> Result<()> {
    let url = Url::parse(value.trim())
        .map_err(|e| anyhow!("invalid backend url '{}': {}", value, e))?;
    match url.scheme() {
        "http" | "https" | "stub" => Ok(()),
        other => Err(anyhow!(
            "unsupported backend url scheme '{}'; expected http, https or stub",
            other
        )),
    }
}

fn parse_mode(value: &str) -> Result<ProcessingMode> {
    ProcessingMode::parse(value)
        .ok_or_else(|| anyhow!("unknown processing mode '{}'; expected cpu or fpga", value))
}

fn read_config_file(path: &Path) -> Result<ClientConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
