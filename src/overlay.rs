//! Detection overlay rendering.
//!
//! `render` always repaints the whole destination: clear, raw frame, then one
//! rectangle and one label chip per detection. Nothing from a previous call
//! survives, so identical inputs give identical pixels.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::inference::Detection;

/// Default chip height in pixels.
pub const LABEL_HEIGHT: u32 = 20;

#[derive(Clone, Debug)]
pub struct OverlayStyle {
    pub clear_color: Rgba<u8>,
    pub box_color: Rgba<u8>,
    pub box_thickness: u32,
    pub chip_color: Rgba<u8>,
    pub text_color: Rgba<u8>,
    pub label_height: u32,
    /// Advance per character used to size chips.
    pub char_width: u32,
    pub chip_padding: u32,
    pub text_scale: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            clear_color: Rgba([0, 0, 0, 255]),
            box_color: Rgba([34, 197, 94, 255]),
            box_thickness: 2,
            chip_color: Rgba([22, 163, 74, 255]),
            text_color: Rgba([0, 0, 0, 255]),
            label_height: LABEL_HEIGHT,
            char_width: 7,
            chip_padding: 6,
            text_scale: 13.0,
        }
    }
}

/// Where a label chip landed.
#[derive(Clone, Debug, PartialEq)]
pub struct ChipPlacement {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub text: String,
    /// True when the chip sits above the box, false when pushed inside it.
    pub above_box: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawnBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub chip: ChipPlacement,
}

/// Everything drawn by one `render` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayPlan {
    pub surface: (u32, u32),
    pub boxes: Vec<DrawnBox>,
    /// False when no font is loaded and chip captions were not rasterized.
    pub text_rasterized: bool,
}

/// Vertical chip position for a box top at `box_y`.
///
/// Above the box by default; when that would start above the surface the chip
/// moves down to the box's top edge.
pub fn chip_top(box_y: i32, label_height: u32) -> (i32, bool) {
    let label_height = i32::try_from(label_height).unwrap_or(i32::MAX);
    let above = box_y.saturating_sub(label_height);
    if above >= 0 {
        (above, true)
    } else {
        (box_y.max(0), false)
    }
}

/// Round a box edge and clamp it to `[-extent, extent]`.
///
/// Anything past that range is fully off the surface already, and keeping
/// coordinates small leaves room for the edge arithmetic in `Rect`.
fn clamp_edge(value: f32, extent: u32) -> i32 {
    let bound = extent as f32;
    value.round().clamp(-bound, bound) as i32
}

/// Round a box size and cap it at twice `extent`.
fn clamp_size(value: f32, extent: u32) -> u32 {
    let cap = extent.saturating_mul(2).max(1);
    (value.round().min(cap as f32) as u32).clamp(1, cap)
}

pub struct OverlayRenderer {
    style: OverlayStyle,
    font: Option<FontArc>,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style, font: None }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TrueType/OpenType font for chip captions.
    pub fn load_font(path: &Path) -> Result<FontArc> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        FontArc::try_from_vec(bytes).with_context(|| format!("parse font {}", path.display()))
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Repaint `surface` with `frame` and `detections`.
    pub fn render(
        &self,
        surface: &mut RgbaImage,
        frame: &RgbaImage,
        detections: &[Detection],
    ) -> OverlayPlan {
        self.clear(surface);
        self.draw_frame(surface, frame);

        let boxes = detections
            .iter()
            .map(|det| self.draw_detection(surface, det))
            .collect();

        OverlayPlan {
            surface: surface.dimensions(),
            boxes,
            text_rasterized: self.font.is_some(),
        }
    }

    fn clear(&self, surface: &mut RgbaImage) {
        for pixel in surface.pixels_mut() {
            *pixel = self.style.clear_color;
        }
    }

    fn draw_frame(&self, surface: &mut RgbaImage, frame: &RgbaImage) {
        if frame.width() == 0 || frame.height() == 0 {
            return;
        }
        if frame.dimensions() == surface.dimensions() {
            imageops::replace(surface, frame, 0, 0);
        } else {
            let scaled = imageops::resize(
                frame,
                surface.width(),
                surface.height(),
                FilterType::Triangle,
            );
            imageops::replace(surface, &scaled, 0, 0);
        }
    }

    fn draw_detection(&self, surface: &mut RgbaImage, det: &Detection) -> DrawnBox {
        let style = &self.style;
        let (surface_w, surface_h) = surface.dimensions();
        let x = clamp_edge(det.bbox.x, surface_w);
        let y = clamp_edge(det.bbox.y, surface_h);
        let width = clamp_size(det.bbox.width, surface_w);
        let height = clamp_size(det.bbox.height, surface_h);

        for t in 0..style.box_thickness {
            let inset_w = width.saturating_sub(2 * t);
            let inset_h = height.saturating_sub(2 * t);
            if inset_w == 0 || inset_h == 0 {
                break;
            }
            let inset = t as i32;
            let rect = Rect::at(x.saturating_add(inset), y.saturating_add(inset))
                .of_size(inset_w, inset_h);
            draw_hollow_rect_mut(surface, rect, style.box_color);
        }

        let text = det.caption();
        let chip_width = text.chars().count() as u32 * style.char_width + 2 * style.chip_padding;
        let (chip_y, above_box) = chip_top(y, style.label_height);
        let chip_rect = Rect::at(x, chip_y).of_size(chip_width, style.label_height.max(1));
        draw_filled_rect_mut(surface, chip_rect, style.chip_color);

        if let Some(font) = &self.font {
            let slack = (style.label_height as f32 - style.text_scale).max(0.0) as i32;
            let text_y = chip_y + slack / 2;
            draw_text_mut(
                surface,
                style.text_color,
                x.saturating_add(style.chip_padding as i32),
                text_y,
                PxScale::from(style.text_scale),
                font,
                &text,
            );
        }

        DrawnBox {
            x,
            y,
            width,
            height,
            chip: ChipPlacement {
                x,
                y: chip_y,
                width: chip_width,
                height: style.label_height,
                text,
                above_box,
            },
        }
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}
