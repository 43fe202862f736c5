//! Live raster sources.
//!
//! A source is selected by identifier:
//! - `stub://name` synthetic moving pattern (tests, demos)
//! - `http(s)://...` MJPEG or JPEG-snapshot camera (feature: ingest-mjpeg)
//! - anything else is a local still image replayed as a live feed
//!
//! Sources report `(0, 0)` intrinsic size until they have produced a frame.
//! Callers treat that as "not ready yet", never as an error.

#[cfg(feature = "ingest-mjpeg")]
pub mod mjpeg;
pub mod still;
pub mod synthetic;

#[cfg(feature = "ingest-mjpeg")]
pub use mjpeg::{MjpegConfig, MjpegSource};
pub use still::StillImageSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

use anyhow::Result;
use image::RgbaImage;

pub trait FrameSource: Send {
    /// Identifier for logs.
    fn describe(&self) -> String;

    /// Acquire the underlying device or stream.
    fn open(&mut self) -> Result<()>;

    /// Current frame dimensions, `(0, 0)` while no frame is available.
    fn intrinsic_size(&self) -> (u32, u32);

    /// Current frame, `None` while not ready.
    fn current_frame(&mut self) -> Result<Option<RgbaImage>>;

    /// Release the device or stream. `open` may be called again afterwards.
    fn close(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn intrinsic_size(&self) -> (u32, u32) {
        (**self).intrinsic_size()
    }

    fn current_frame(&mut self) -> Result<Option<RgbaImage>> {
        (**self).current_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Build a source from an identifier. The source is not opened.
pub fn source_for(identifier: &str) -> Result<Box<dyn FrameSource>> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        anyhow::bail!("source identifier is empty");
    }
    if identifier.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            name: identifier.to_string(),
            ..SyntheticConfig::default()
        })));
    }
    if identifier.starts_with("http://") || identifier.starts_with("https://") {
        #[cfg(feature = "ingest-mjpeg")]
        {
            return Ok(Box::new(MjpegSource::new(MjpegConfig {
                url: identifier.to_string(),
                ..MjpegConfig::default()
            })?));
        }
        #[cfg(not(feature = "ingest-mjpeg"))]
        {
            anyhow::bail!("network camera sources require the ingest-mjpeg feature")
        }
    }
    if identifier.contains("://") {
        anyhow::bail!("unsupported source scheme in '{}'", identifier);
    }
    Ok(Box::new(StillImageSource::new(identifier)))
}
