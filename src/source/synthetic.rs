use std::cell::Cell;

use anyhow::Result;
use image::{Rgba, RgbaImage};

use super::FrameSource;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Number of size queries that report "not ready" after opening.
    pub warmup_polls: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://synthetic".to_string(),
            width: 640,
            height: 480,
            warmup_polls: 0,
        }
    }
}

/// Synthetic source producing a scrolling gradient.
pub struct SyntheticSource {
    config: SyntheticConfig,
    opened: bool,
    polls: Cell<u32>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            opened: false,
            polls: Cell::new(0),
            frame_count: 0,
        }
    }

    pub fn frames_produced(&self) -> u64 {
        self.frame_count
    }

    fn warmed_up(&self) -> bool {
        self.opened && self.polls.get() >= self.config.warmup_polls
    }

    fn generate(&self) -> RgbaImage {
        let shift = (self.frame_count % 256) as u32;
        RgbaImage::from_fn(self.config.width, self.config.height, |x, y| {
            let r = ((x + shift) % 256) as u8;
            let g = ((y + shift) % 256) as u8;
            let b = ((x / 4 + y / 4) % 256) as u8;
            Rgba([r, g, b, 255])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.name.clone()
    }

    fn open(&mut self) -> Result<()> {
        log::info!("SyntheticSource: opened {}", self.config.name);
        self.opened = true;
        self.polls.set(0);
        Ok(())
    }

    fn intrinsic_size(&self) -> (u32, u32) {
        if self.warmed_up() {
            (self.config.width, self.config.height)
        } else {
            if self.opened {
                self.polls.set(self.polls.get().saturating_add(1));
            }
            (0, 0)
        }
    }

    fn current_frame(&mut self) -> Result<Option<RgbaImage>> {
        if !self.warmed_up() {
            return Ok(None);
        }
        self.frame_count += 1;
        Ok(Some(self.generate()))
    }
}
