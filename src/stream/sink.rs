use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbaImage;

use crate::metrics::MetricsSnapshot;
use crate::overlay::OverlayPlan;

/// Receives each freshly rendered overlay surface.
pub trait OverlaySink: Send {
    fn present(
        &mut self,
        surface: &RgbaImage,
        plan: &OverlayPlan,
        metrics: &MetricsSnapshot,
    ) -> Result<()>;
}

/// Writes the latest overlay to an image file, replacing it atomically.
pub struct FileSink {
    path: PathBuf,
    every: u64,
    presented: u64,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            every: 1,
            presented: 0,
        }
    }

    /// Only write every `n`-th frame.
    pub fn every(mut self, n: u64) -> Self {
        self.every = n.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OverlaySink for FileSink {
    fn present(
        &mut self,
        surface: &RgbaImage,
        plan: &OverlayPlan,
        metrics: &MetricsSnapshot,
    ) -> Result<()> {
        self.presented += 1;
        if (self.presented - 1) % self.every != 0 {
            return Ok(());
        }
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("png")
            .to_string();
        let tmp = self.path.with_extension(format!("tmp.{}", extension));
        surface
            .save(&tmp)
            .with_context(|| format!("write overlay {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace overlay {}", self.path.display()))?;
        log::debug!(
            "FileSink: wrote {} ({} boxes, {:.1} fps, {:.1} ms hw)",
            self.path.display(),
            plan.boxes.len(),
            metrics.observed_fps,
            metrics.hardware_latency_ms
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_every_nth_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("overlay.png");
        let mut sink = FileSink::new(&path).every(2);
        let surface = RgbaImage::new(8, 8);
        let plan = OverlayPlan::default();
        let metrics = MetricsSnapshot::default();

        sink.present(&surface, &plan, &metrics)?;
        assert!(path.exists());
        std::fs::remove_file(&path)?;
        sink.present(&surface, &plan, &metrics)?;
        assert!(!path.exists());
        sink.present(&surface, &plan, &metrics)?;
        assert!(path.exists());
        Ok(())
    }
}
