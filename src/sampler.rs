//! Frame sampling: current source frame -> staging surface + encoded payload.

use std::fmt;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use crate::source::FrameSource;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// One sampled frame.
pub struct SampledFrame {
    /// JPEG bytes sent to the backend.
    pub payload: Vec<u8>,
    /// Same frame at surface size, kept for compositing once the result arrives.
    pub staging: RgbaImage,
}

#[derive(Debug)]
pub enum SampleError {
    /// The source has no frame yet. Retry on the next tick.
    NotReady,
    Source(anyhow::Error),
    Encode(image::ImageError),
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::NotReady => write!(f, "frame not ready"),
            SampleError::Source(err) => write!(f, "source read failed: {:#}", err),
            SampleError::Encode(err) => write!(f, "frame encode failed: {}", err),
        }
    }
}

impl std::error::Error for SampleError {}

pub struct FrameSampler {
    quality: u8,
}

impl FrameSampler {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Sample the source at `target` (width, height).
    ///
    /// Only the returned staging image is written; the visible surface is never
    /// touched here.
    pub fn sample(
        &self,
        source: &mut dyn FrameSource,
        target: (u32, u32),
    ) -> Result<SampledFrame, SampleError> {
        let (w, h) = source.intrinsic_size();
        if w == 0 || h == 0 {
            return Err(SampleError::NotReady);
        }
        let frame = source
            .current_frame()
            .map_err(SampleError::Source)?
            .ok_or(SampleError::NotReady)?;
        if frame.width() == 0 || frame.height() == 0 {
            return Err(SampleError::NotReady);
        }

        let staging = if frame.dimensions() == target {
            frame
        } else {
            imageops::resize(&frame, target.0, target.1, FilterType::Triangle)
        };

        let payload = self.encode(&staging)?;
        Ok(SampledFrame { payload, staging })
    }

    /// Encode an RGBA frame as JPEG (alpha dropped).
    pub fn encode(&self, frame: &RgbaImage) -> Result<Vec<u8>, SampleError> {
        let rgb = DynamicImage::ImageRgba8(frame.clone()).into_rgb8();
        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(&rgb)
            .map_err(SampleError::Encode)?;
        Ok(out.into_inner())
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}
