//! Rectangle primitives shared by the coordinate engine and the stores
//!
//! A [`Rect`] carries no notion of which space it lives in. Callers keep
//! track of whether a value is in document space (points, y-up) or display
//! space (pixels, y-down).

use serde::{Deserialize, Serialize};

/// Slack applied to page-bound comparisons to absorb render rounding
pub const BOUNDS_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Bounding box covering both rectangles
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    /// True if the rectangles overlap or their gap is at most `tolerance`
    /// on both axes. Touching edges count as overlapping.
    pub fn touches(&self, other: &Rect, tolerance: f64) -> bool {
        self.x <= other.right() + tolerance
            && other.x <= self.right() + tolerance
            && self.y <= other.bottom() + tolerance
            && other.y <= self.bottom() + tolerance
    }

    pub fn has_positive_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Check that a rectangle has positive size and lies inside the page.
///
/// Boundaries are inclusive, with [`BOUNDS_TOLERANCE`] of slack.
pub fn validate(rect: &Rect, page_width: f64, page_height: f64) -> bool {
    rect.x >= -BOUNDS_TOLERANCE
        && rect.y >= -BOUNDS_TOLERANCE
        && rect.width > 0.0
        && rect.height > 0.0
        && rect.right() <= page_width + BOUNDS_TOLERANCE
        && rect.bottom() <= page_height + BOUNDS_TOLERANCE
}

/// Build the canonical rectangle spanned by two corner points, whatever
/// direction the drag went in. Identical points give a zero-size rect.
pub fn normalize(p1: Point, p2: Point) -> Rect {
    Rect {
        x: p1.x.min(p2.x),
        y: p1.y.min(p2.y),
        width: (p2.x - p1.x).abs(),
        height: (p2.y - p1.y).abs(),
    }
}

pub fn area(rect: &Rect) -> f64 {
    rect.width * rect.height
}

/// Rescale a rectangle measured at `from_scale` to `to_scale`
pub fn scale_rect(rect: &Rect, from_scale: f64, to_scale: f64) -> Rect {
    let factor = to_scale / from_scale;
    Rect {
        x: rect.x * factor,
        y: rect.y * factor,
        width: rect.width * factor,
        height: rect.height * factor,
    }
}

/// Round every field independently to the nearest multiple of `grid_size`.
/// A non-positive grid leaves the rectangle unchanged.
pub fn snap_to_grid(rect: &Rect, grid_size: f64) -> Rect {
    if grid_size <= 0.0 {
        return *rect;
    }
    let snap = |v: f64| (v / grid_size).round() * grid_size;
    Rect {
        x: snap(rect.x),
        y: snap(rect.y),
        width: snap(rect.width),
        height: snap(rect.height),
    }
}

/// Grow the rectangle by `margin` on every side (shrink when negative).
/// The result is not clamped; run [`validate`] on it before storing.
pub fn expand(rect: &Rect, margin: f64) -> Rect {
    Rect {
        x: rect.x - margin,
        y: rect.y - margin,
        width: rect.width + 2.0 * margin,
        height: rect.height + 2.0 * margin,
    }
}

/// Merge overlapping rectangles with a single sweep over `(x, y)` order.
///
/// Each rectangle is folded into the running accumulator when it touches it
/// (within `tolerance`), otherwise it starts a new accumulator. This is not
/// a transitive merge: two rectangles that overlap each other but are
/// separated in sort order by a disjoint one stay apart.
pub fn merge_overlapping(rects: &[Rect], tolerance: f64) -> Vec<Rect> {
    let mut sorted = rects.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));

    let mut merged: Vec<Rect> = Vec::with_capacity(sorted.len());
    let mut current: Option<Rect> = None;

    for rect in sorted {
        current = match current {
            Some(acc) if acc.touches(&rect, tolerance) => Some(acc.union(&rect)),
            Some(acc) => {
                merged.push(acc);
                Some(rect)
            }
            None => Some(rect),
        };
    }
    merged.extend(current);
    merged
}
