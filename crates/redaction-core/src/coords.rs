//! Coordinate transformation between document and display space
//!
//! Document space is PDF points with a bottom-left origin and y growing
//! upward. Display space is rendered pixels with a top-left origin and y
//! growing downward, after zoom and rotation have been applied.
//!
//! Quarter-turn rotations use exact closed-form remaps and round-trip
//! within floating error. Any other angle rotates the rectangle's center
//! about the page center and keeps its size, which only approximates what a
//! renderer shows and is not guaranteed to invert exactly.

use serde::{Deserialize, Serialize};

use crate::error::RedactionError;
use crate::geometry::{normalize, Point, Rect};

/// Tolerance used to recognise a quarter-turn after normalization
const ANGLE_EPSILON: f64 = 1e-9;

/// Presentation parameters for a single page, supplied by the renderer.
///
/// Always built through [`PageFrame::new`], deserialization included, so
/// the size and scale are positive and the rotation is in `[0, 360)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawPageFrame")]
pub struct PageFrame {
    page_width: f64,
    page_height: f64,
    scale: f64,
    rotation: f64,
}

/// Unchecked wire form of [`PageFrame`]
#[derive(Deserialize)]
struct RawPageFrame {
    page_width: f64,
    page_height: f64,
    scale: f64,
    #[serde(default)]
    rotation: f64,
}

impl TryFrom<RawPageFrame> for PageFrame {
    type Error = RedactionError;

    fn try_from(raw: RawPageFrame) -> Result<Self, Self::Error> {
        PageFrame::new(raw.page_width, raw.page_height, raw.scale, raw.rotation)
    }
}

impl PageFrame {
    pub fn new(
        page_width: f64,
        page_height: f64,
        scale: f64,
        rotation: f64,
    ) -> Result<Self, RedactionError> {
        if !(page_width > 0.0 && page_height > 0.0) {
            return Err(RedactionError::InvalidFrame(format!(
                "page size must be positive, got {}x{}",
                page_width, page_height
            )));
        }
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(RedactionError::InvalidFrame(format!(
                "scale must be positive, got {}",
                scale
            )));
        }
        if !rotation.is_finite() {
            return Err(RedactionError::InvalidFrame(format!(
                "rotation must be finite, got {}",
                rotation
            )));
        }
        Ok(Self {
            page_width,
            page_height,
            scale,
            rotation: normalize_rotation(rotation),
        })
    }

    /// Frame whose scale makes the rotated page exactly `container_width`
    /// pixels wide.
    pub fn fit_width(
        page_width: f64,
        page_height: f64,
        rotation: f64,
        container_width: f64,
    ) -> Result<Self, RedactionError> {
        let upright_width = match QuarterTurn::from_degrees(normalize_rotation(rotation)) {
            Some(QuarterTurn::Deg90) | Some(QuarterTurn::Deg270) => page_height,
            _ => page_width,
        };
        if upright_width <= 0.0 {
            return Err(RedactionError::InvalidFrame(
                "page size must be positive".to_string(),
            ));
        }
        Self::new(
            page_width,
            page_height,
            container_width / upright_width,
            rotation,
        )
    }

    /// Page width in document units (points)
    pub fn page_width(&self) -> f64 {
        self.page_width
    }

    /// Page height in document units (points)
    pub fn page_height(&self) -> f64 {
        self.page_height
    }

    /// Display pixels per document unit
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Rotation in degrees, in `[0, 360)`
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Pixel size of the rendered page `(width, height)` after rotation.
    /// Non-canonical angles report the unrotated box.
    pub fn display_size(&self) -> (f64, f64) {
        let w = self.page_width * self.scale;
        let h = self.page_height * self.scale;
        match QuarterTurn::from_degrees(self.rotation) {
            Some(QuarterTurn::Deg90) | Some(QuarterTurn::Deg270) => (h, w),
            _ => (w, h),
        }
    }
}

/// Map any angle into `[0, 360)`
pub fn normalize_rotation(degrees: f64) -> f64 {
    let r = degrees.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if r >= 360.0 {
        0.0
    } else {
        r
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuarterTurn {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl QuarterTurn {
    fn from_degrees(normalized: f64) -> Option<Self> {
        [
            (0.0, QuarterTurn::Deg0),
            (90.0, QuarterTurn::Deg90),
            (180.0, QuarterTurn::Deg180),
            (270.0, QuarterTurn::Deg270),
            (360.0, QuarterTurn::Deg0),
        ]
        .into_iter()
        .find(|(deg, _)| (normalized - deg).abs() < ANGLE_EPSILON)
        .map(|(_, turn)| turn)
    }

    fn inverse(self) -> Self {
        match self {
            QuarterTurn::Deg0 => QuarterTurn::Deg0,
            QuarterTurn::Deg90 => QuarterTurn::Deg270,
            QuarterTurn::Deg180 => QuarterTurn::Deg180,
            QuarterTurn::Deg270 => QuarterTurn::Deg90,
        }
    }

    /// Remap a y-down rect inside a `box_w` x `box_h` box
    fn remap(self, r: &Rect, box_w: f64, box_h: f64) -> Rect {
        match self {
            QuarterTurn::Deg0 => *r,
            QuarterTurn::Deg90 => Rect {
                x: r.y,
                y: box_w - r.x - r.width,
                width: r.height,
                height: r.width,
            },
            QuarterTurn::Deg180 => Rect {
                x: box_w - r.x - r.width,
                y: box_h - r.y - r.height,
                width: r.width,
                height: r.height,
            },
            QuarterTurn::Deg270 => Rect {
                x: box_h - r.y - r.height,
                y: r.x,
                width: r.height,
                height: r.width,
            },
        }
    }
}

/// Rotate a rectangle's center about `pivot`; size is preserved
fn rotate_about(r: &Rect, pivot: Point, degrees: f64) -> Rect {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let c = r.center();
    let dx = c.x - pivot.x;
    let dy = c.y - pivot.y;
    let cx = pivot.x + dx * cos - dy * sin;
    let cy = pivot.y + dx * sin + dy * cos;
    Rect {
        x: cx - r.width / 2.0,
        y: cy - r.height / 2.0,
        width: r.width,
        height: r.height,
    }
}

/// Convert a document-space rectangle into display space
pub fn to_display(rect: &Rect, frame: &PageFrame) -> Rect {
    let s = frame.scale;
    // Flip y and scale as if unrotated
    let flipped = Rect {
        x: rect.x * s,
        y: (frame.page_height - rect.y - rect.height) * s,
        width: rect.width * s,
        height: rect.height * s,
    };

    let w = frame.page_width * s;
    let h = frame.page_height * s;
    match QuarterTurn::from_degrees(frame.rotation) {
        Some(turn) => turn.remap(&flipped, w, h),
        None => rotate_about(&flipped, Point::new(w / 2.0, h / 2.0), frame.rotation),
    }
}

/// Convert a display-space rectangle back into document space
pub fn to_document(rect: &Rect, frame: &PageFrame) -> Rect {
    let s = frame.scale;
    let w = frame.page_width * s;
    let h = frame.page_height * s;

    let unrotated = match QuarterTurn::from_degrees(frame.rotation) {
        Some(turn) => {
            // The inverse turn runs inside the rotated (displayed) box
            let (box_w, box_h) = frame.display_size();
            turn.inverse().remap(rect, box_w, box_h)
        }
        None => rotate_about(rect, Point::new(w / 2.0, h / 2.0), -frame.rotation),
    };

    Rect {
        x: unrotated.x / s,
        y: frame.page_height - (unrotated.y / s + unrotated.height / s),
        width: unrotated.width / s,
        height: unrotated.height / s,
    }
}

/// Convert a document-space point (e.g. a text anchor) to display space
pub fn document_point_to_display(point: Point, frame: &PageFrame) -> Point {
    let r = to_display(&Rect::new(point.x, point.y, 0.0, 0.0), frame);
    Point::new(r.x, r.y)
}

/// Convert a raw pointer position to document space
pub fn display_point_to_document(point: Point, frame: &PageFrame) -> Point {
    let r = to_document(&Rect::new(point.x, point.y, 0.0, 0.0), frame);
    Point::new(r.x, r.y)
}

/// Turn a drag gesture's start and end pointer positions into a
/// document-space rectangle, regardless of drag direction.
pub fn display_drag_to_document(start: Point, end: Point, frame: &PageFrame) -> Rect {
    to_document(&normalize(start, end), frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(rotation: f64) -> PageFrame {
        PageFrame::new(800.0, 1000.0, 1.0, rotation).unwrap()
    }

    fn assert_rect_close(a: &Rect, b: &Rect) {
        let tolerance = 1e-9;
        assert!(
            (a.x - b.x).abs() < tolerance
                && (a.y - b.y).abs() < tolerance
                && (a.width - b.width).abs() < tolerance
                && (a.height - b.height).abs() < tolerance,
            "{:?} != {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_to_display_unrotated_flips_y() {
        let r = Rect::new(100.0, 200.0, 80.0, 20.0);
        assert_eq!(to_display(&r, &frame(0.0)), Rect::new(100.0, 780.0, 80.0, 20.0));
    }

    #[test]
    fn test_to_display_rotated_90() {
        let r = Rect::new(100.0, 200.0, 80.0, 20.0);
        assert_eq!(to_display(&r, &frame(90.0)), Rect::new(780.0, 620.0, 20.0, 80.0));
    }

    #[test]
    fn test_to_display_rotated_180_and_270() {
        let r = Rect::new(100.0, 200.0, 80.0, 20.0);
        // unrotated display rect is (100, 780, 80, 20)
        assert_eq!(
            to_display(&r, &frame(180.0)),
            Rect::new(620.0, 200.0, 80.0, 20.0)
        );
        assert_eq!(
            to_display(&r, &frame(270.0)),
            Rect::new(200.0, 100.0, 20.0, 80.0)
        );
    }

    #[test]
    fn test_scale_applies_to_every_field() {
        let f = PageFrame::new(800.0, 1000.0, 2.0, 0.0).unwrap();
        let r = Rect::new(100.0, 200.0, 80.0, 20.0);
        assert_eq!(to_display(&r, &f), Rect::new(200.0, 1560.0, 160.0, 40.0));
    }

    #[test]
    fn test_round_trip_canonical_rotations() {
        let r = Rect::new(12.5, 640.25, 33.0, 7.75);
        for rotation in [0.0, 90.0, 180.0, 270.0, -90.0, 450.0] {
            let f = PageFrame::new(612.0, 792.0, 1.37, rotation).unwrap();
            assert_rect_close(&to_document(&to_display(&r, &f), &f), &r);
        }
    }

    #[test]
    fn test_rotation_is_normalized() {
        assert_eq!(frame(-90.0).rotation(), 270.0);
        assert_eq!(frame(720.0).rotation(), 0.0);
        assert_eq!(normalize_rotation(-1e-20), 0.0);
    }

    #[test]
    fn test_non_canonical_rotation_keeps_size() {
        let r = Rect::new(100.0, 200.0, 80.0, 20.0);
        let d = to_display(&r, &frame(45.0));
        assert!((d.width - 80.0).abs() < 1e-9);
        assert!((d.height - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_frames_rejected() {
        assert!(PageFrame::new(0.0, 100.0, 1.0, 0.0).is_err());
        assert!(PageFrame::new(100.0, 100.0, 0.0, 0.0).is_err());
        assert!(PageFrame::new(100.0, 100.0, -1.0, 0.0).is_err());
        assert!(PageFrame::new(100.0, 100.0, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_deserialized_frame_is_normalized() {
        let r = Rect::new(100.0, 200.0, 80.0, 20.0);
        for rotation in ["-90.0", "630.0"] {
            let json = format!(
                r#"{{"page_width":800.0,"page_height":1000.0,"scale":1.0,"rotation":{}}}"#,
                rotation
            );
            let f: PageFrame = serde_json::from_str(&json).unwrap();
            assert_eq!(f.rotation(), 270.0);
            assert_eq!(to_display(&r, &f), Rect::new(200.0, 100.0, 20.0, 80.0));
        }

        let f: PageFrame =
            serde_json::from_str(r#"{"page_width":800.0,"page_height":1000.0,"scale":2.0,"rotation":450.0}"#)
                .unwrap();
        assert_eq!(f, PageFrame::new(800.0, 1000.0, 2.0, 90.0).unwrap());
    }

    #[test]
    fn test_deserialized_frame_is_validated() {
        assert!(serde_json::from_str::<PageFrame>(
            r#"{"page_width":800.0,"page_height":1000.0,"scale":0.0,"rotation":0.0}"#
        )
        .is_err());
        assert!(serde_json::from_str::<PageFrame>(
            r#"{"page_width":-1.0,"page_height":1000.0,"scale":1.0}"#
        )
        .is_err());
        let f = PageFrame::new(612.0, 792.0, 1.25, 180.0).unwrap();
        let json = serde_json::to_string(&f).unwrap();
        assert_eq!(serde_json::from_str::<PageFrame>(&json).unwrap(), f);
    }

    #[test]
    fn test_fit_width_accounts_for_rotation() {
        let upright = PageFrame::fit_width(612.0, 792.0, 0.0, 918.0).unwrap();
        assert!((upright.scale() - 1.5).abs() < 1e-12);
        let sideways = PageFrame::fit_width(612.0, 792.0, 90.0, 792.0).unwrap();
        assert!((sideways.scale() - 1.0).abs() < 1e-12);
        assert_eq!(sideways.display_size(), (792.0, 612.0));
    }

    #[test]
    fn test_pointer_corners() {
        let f = PageFrame::new(612.0, 792.0, 1.0, 0.0).unwrap();
        // Top-left pixel is the top of the page in PDF space
        let p = display_point_to_document(Point::new(0.0, 0.0), &f);
        assert_eq!(p, Point::new(0.0, 792.0));
        let back = document_point_to_display(p, &f);
        assert_eq!(back, Point::new(0.0, 0.0));
    }

    #[test]
    fn test_drag_in_any_direction() {
        let f = PageFrame::new(800.0, 1000.0, 2.0, 0.0).unwrap();
        let forward = display_drag_to_document(Point::new(200.0, 100.0), Point::new(400.0, 300.0), &f);
        let backward =
            display_drag_to_document(Point::new(400.0, 300.0), Point::new(200.0, 100.0), &f);
        assert_eq!(forward, backward);
        assert_eq!(forward, Rect::new(100.0, 850.0, 100.0, 100.0));
    }
}
