use std::path::PathBuf;

use anyhow::{Context, Result};
use image::RgbaImage;

use super::FrameSource;

/// Local still image replayed as a live feed.
pub struct StillImageSource {
    path: PathBuf,
    frame: Option<RgbaImage>,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame: None,
        }
    }

    pub fn from_image(name: impl Into<PathBuf>, frame: RgbaImage) -> Self {
        Self {
            path: name.into(),
            frame: Some(frame),
        }
    }
}

impl FrameSource for StillImageSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&mut self) -> Result<()> {
        if self.frame.is_some() {
            return Ok(());
        }
        let image = image::open(&self.path)
            .with_context(|| format!("open still image {}", self.path.display()))?;
        self.frame = Some(image.into_rgba8());
        log::info!("StillImageSource: loaded {}", self.path.display());
        Ok(())
    }

    fn intrinsic_size(&self) -> (u32, u32) {
        self.frame
            .as_ref()
            .map(|frame| frame.dimensions())
            .unwrap_or((0, 0))
    }

    fn current_frame(&mut self) -> Result<Option<RgbaImage>> {
        Ok(self.frame.clone())
    }
}
