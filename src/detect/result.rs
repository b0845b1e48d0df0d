/// Axis-aligned box in video-pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner coordinates (x1, y1, x2, y2).
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// False when any coordinate is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// One detected object for a single frame.
///
/// A tick produces a fresh, unordered set of predictions. No confidence floor
/// is applied anywhere between the model and the overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub score: f32,
    pub bbox: BoundingBox,
}

impl Prediction {
    pub fn new(label: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            score: score.clamp(0.0, 1.0),
            bbox,
        }
    }

    /// Score as a whole percentage, rounded half away from zero.
    pub fn percent(&self) -> u32 {
        (self.score * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_score_and_rounds_percent() {
        let p = Prediction::new("person", 1.7, BoundingBox::default());
        assert_eq!(p.score, 1.0);
        assert_eq!(p.percent(), 100);

        let p = Prediction::new("cell phone", 0.875, BoundingBox::default());
        assert_eq!(p.percent(), 88);

        let p = Prediction::new("book", 0.004, BoundingBox::default());
        assert_eq!(p.percent(), 0);
    }

    #[test]
    fn corners_normalise_to_origin_and_size() {
        let b = BoundingBox::from_corners(40.0, 30.0, 10.0, 10.0);
        assert_eq!(b, BoundingBox::new(10.0, 10.0, 30.0, 20.0));
        assert_eq!(b.area(), 600.0);
    }

    #[test]
    fn nan_corner_is_not_finite() {
        let b = BoundingBox::from_corners(10.0, 10.0, f32::NAN, 50.0);
        assert!(!b.is_finite());
        assert!(BoundingBox::new(3.0e9, 10.0, 20.0, 20.0).is_finite());
    }
}
