//! Detection overlay rendering.
//!
//! The overlay is a drawing surface stacked exactly on top of the video
//! element. Both are fixed at the capture resolution; predictions arrive in
//! that pixel space and are drawn without scaling.

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::detect::{BoundingBox, Prediction};
use crate::frame::{CAPTURE_HEIGHT, CAPTURE_WIDTH};

const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const LABEL_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 180]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const LABEL_HEIGHT: u32 = 10;
const GLYPH_WIDTH: u32 = 6;

/// Label text for one prediction: `"<label> <percent>%"`.
pub fn format_label(prediction: &Prediction) -> String {
    format!("{} {}%", prediction.label, prediction.percent())
}

/// Rendering boundary: a 2D surface the renderer draws on.
pub trait DrawingSurface: Send {
    fn dimensions(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    /// Erase the whole surface.
    fn clear(&mut self);

    fn stroke_rect(&mut self, bbox: &BoundingBox);

    /// Draw `text` anchored at the top-left corner of a box.
    fn fill_text(&mut self, text: &str, x: f32, y: f32);
}

// ----------------------------------------------------------------------------
// OverlayRenderer
// ----------------------------------------------------------------------------

pub struct OverlayRenderer {
    surface: Box<dyn DrawingSurface>,
    renders: u64,
}

impl OverlayRenderer {
    /// Take ownership of a surface, resetting it to the capture size.
    pub fn new(surface: Box<dyn DrawingSurface>) -> Self {
        let mut renderer = Self {
            surface,
            renders: 0,
        };
        renderer.clear();
        renderer
    }

    /// Clear the surface, then draw every prediction's box and label.
    pub fn render(&mut self, predictions: &[Prediction]) {
        self.ensure_capture_size();
        self.surface.clear();
        for prediction in predictions {
            if !prediction.bbox.is_finite() {
                log::debug!("overlay: skipping {} with non-finite box", prediction.label);
                continue;
            }
            self.surface.stroke_rect(&prediction.bbox);
            self.surface
                .fill_text(&format_label(prediction), prediction.bbox.x, prediction.bbox.y);
        }
        self.renders += 1;
    }

    pub fn clear(&mut self) {
        self.ensure_capture_size();
        self.surface.clear();
    }

    /// Number of `render` calls so far.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    fn ensure_capture_size(&mut self) {
        let dims = self.surface.dimensions();
        if dims != (CAPTURE_WIDTH, CAPTURE_HEIGHT) {
            log::debug!(
                "overlay: resizing surface from {}x{} to {}x{}",
                dims.0,
                dims.1,
                CAPTURE_WIDTH,
                CAPTURE_HEIGHT
            );
            self.surface.resize(CAPTURE_WIDTH, CAPTURE_HEIGHT);
        }
    }
}

// ----------------------------------------------------------------------------
// Canvas: shared raster surface
// ----------------------------------------------------------------------------

/// A label drawn on the canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

/// Point-in-time copy of the canvas, as the host would display it.
#[derive(Clone, Debug)]
pub struct CanvasSnapshot {
    pub width: u32,
    pub height: u32,
    pub boxes: Vec<BoundingBox>,
    pub labels: Vec<LabelRun>,
    pub clears: u64,
    pub image: RgbaImage,
}

impl CanvasSnapshot {
    pub fn is_blank(&self) -> bool {
        self.boxes.is_empty() && self.labels.is_empty()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.image.get_pixel_checked(x, y).copied()
    }

    /// Write the snapshot as PNG.
    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save(path)
            .with_context(|| format!("failed to write overlay to {}", path.display()))
    }
}

struct CanvasState {
    image: RgbaImage,
    boxes: Vec<BoundingBox>,
    labels: Vec<LabelRun>,
    clears: u64,
}

/// Raster surface shared between the renderer and the host that displays it.
///
/// Clones are handles to the same canvas. Boxes are stroked into an RGBA
/// buffer; labels get a dark backing strip on the raster and their text is
/// kept as runs for the host's text layer.
#[derive(Clone)]
pub struct Canvas {
    state: Arc<Mutex<CanvasState>>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(CanvasState {
                image: RgbaImage::from_pixel(width, height, TRANSPARENT),
                boxes: Vec::new(),
                labels: Vec::new(),
                clears: 0,
            })),
        }
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        let state = self.lock();
        CanvasSnapshot {
            width: state.image.width(),
            height: state.image.height(),
            boxes: state.boxes.clone(),
            labels: state.labels.clone(),
            clears: state.clears,
            image: state.image.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CanvasState> {
        // A poisoned canvas only means a draw panicked midway; the raster is
        // still usable for display.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(CAPTURE_WIDTH, CAPTURE_HEIGHT)
    }
}

impl DrawingSurface for Canvas {
    fn dimensions(&self) -> (u32, u32) {
        let state = self.lock();
        (state.image.width(), state.image.height())
    }

    fn resize(&mut self, width: u32, height: u32) {
        let mut state = self.lock();
        state.image = RgbaImage::from_pixel(width, height, TRANSPARENT);
        state.boxes.clear();
        state.labels.clear();
    }

    fn clear(&mut self) {
        let mut state = self.lock();
        state
            .image
            .pixels_mut()
            .for_each(|pixel| *pixel = TRANSPARENT);
        state.boxes.clear();
        state.labels.clear();
        state.clears += 1;
    }

    fn stroke_rect(&mut self, bbox: &BoundingBox) {
        let mut state = self.lock();
        let bounds = state.image.dimensions();
        if let Some(rect) = to_rect(bbox, bounds) {
            draw_hollow_rect_mut(&mut state.image, rect, BOX_COLOR);
            draw_hollow_rect_mut(&mut state.image, inset(rect), BOX_COLOR);
        }
        state.boxes.push(*bbox);
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) {
        let mut state = self.lock();
        if x.is_finite() && y.is_finite() {
            let (canvas_w, canvas_h) = state.image.dimensions();
            let width = (text.chars().count() as u32 * GLYPH_WIDTH).clamp(1, canvas_w.max(1));
            let left = x.round().clamp(-(width as f32), canvas_w as f32) as i32;
            let top = (y.round() - LABEL_HEIGHT as f32).clamp(0.0, canvas_h as f32) as i32;
            draw_filled_rect_mut(
                &mut state.image,
                Rect::at(left, top).of_size(width, LABEL_HEIGHT),
                LABEL_BACKGROUND,
            );
        }
        state.labels.push(LabelRun {
            text: text.to_string(),
            x,
            y,
        });
    }
}

/// Edges are clipped to a band just outside the surface, so the visible part
/// of a huge or far off-canvas box is drawn and its hidden edges stay hidden.
fn to_rect(bbox: &BoundingBox, (canvas_w, canvas_h): (u32, u32)) -> Option<Rect> {
    if !bbox.is_finite() {
        return None;
    }
    let (x1, x2) = clip_span(bbox.x, bbox.width, canvas_w)?;
    let (y1, y2) = clip_span(bbox.y, bbox.height, canvas_h)?;
    Some(Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32))
}

/// Both strokes of an edge clipped to this band land off the surface.
const CLIP_MARGIN: f32 = 3.0;

fn clip_span(start: f32, len: f32, extent: u32) -> Option<(i32, i32)> {
    let len = len.round();
    if len < 1.0 {
        return None;
    }
    let start = start.round();
    let lo = -CLIP_MARGIN;
    let hi = extent as f32 + CLIP_MARGIN - 1.0;
    let a = start.clamp(lo, hi);
    let b = (start + len).clamp(lo, hi);
    if b - a < 1.0 {
        return None;
    }
    Some((a as i32, b as i32))
}

/// Second stroke one pixel inside, for a 2px outline.
fn inset(rect: Rect) -> Rect {
    if rect.width() <= 2 || rect.height() <= 2 {
        return rect;
    }
    Rect::at(rect.left() + 1, rect.top() + 1).of_size(rect.width() - 2, rect.height() - 2)
}
