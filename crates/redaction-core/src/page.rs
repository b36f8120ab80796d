//! Page geometry extraction
//!
//! Reads the document-space size and `/Rotate` of each page so the
//! coordinate engine can be fed without a renderer, e.g. for headless
//! review or for validating manual redactions server-side.

use lopdf::{Dictionary, Document, Object};
use serde::Serialize;

use crate::coords::PageFrame;
use crate::error::RedactionError;

/// Hard stop when walking `/Parent` chains, guards against cycles
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Document-space geometry of a single page
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageGeometry {
    /// Page number (1-indexed)
    pub page_num: u32,
    /// Page width in points
    pub width: f64,
    /// Page height in points
    pub height: f64,
    /// Page rotation in degrees (0, 90, 180, 270)
    pub rotation: i32,
    pub orientation: PageOrientation,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum PageOrientation {
    Portrait,
    Landscape,
    Square,
}

impl PageGeometry {
    pub fn from_document(doc: &Document, page_num: u32) -> Result<Self, RedactionError> {
        let pages = doc.get_pages();
        let page_id = pages
            .get(&page_num)
            .ok_or(RedactionError::UnknownPage(page_num))?;

        let page_dict = doc
            .get_object(*page_id)
            .and_then(Object::as_dict)
            .map_err(|e| RedactionError::ParseError(format!("page {}: {}", page_num, e)))?;

        let media_box = match inherited(doc, page_dict, b"MediaBox") {
            Some(obj) => parse_box(obj)?,
            // US Letter when the tree omits it entirely
            None => [0.0, 0.0, 612.0, 792.0],
        };
        let width = (media_box[2] - media_box[0]).abs();
        let height = (media_box[3] - media_box[1]).abs();

        let rotation = inherited(doc, page_dict, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .map(normalize_quarter_turn)
            .unwrap_or(0);

        let (upright_w, upright_h) = if rotation == 90 || rotation == 270 {
            (height, width)
        } else {
            (width, height)
        };
        let orientation = if (upright_w - upright_h).abs() < 1.0 {
            PageOrientation::Square
        } else if upright_w > upright_h {
            PageOrientation::Landscape
        } else {
            PageOrientation::Portrait
        };

        Ok(Self {
            page_num,
            width,
            height,
            rotation,
            orientation,
        })
    }

    /// Geometry for every page, in page order
    pub fn all_from_bytes(bytes: &[u8]) -> Result<Vec<Self>, RedactionError> {
        let doc =
            Document::load_mem(bytes).map_err(|e| RedactionError::ParseError(e.to_string()))?;
        let count = doc.get_pages().len() as u32;
        (1..=count)
            .map(|page_num| Self::from_document(&doc, page_num))
            .collect()
    }

    /// Presentation frame at the given zoom, with an extra user rotation
    /// added on top of the page's own `/Rotate`.
    pub fn frame(&self, scale: f64, user_rotation: f64) -> Result<PageFrame, RedactionError> {
        PageFrame::new(
            self.width,
            self.height,
            scale,
            self.rotation as f64 + user_rotation,
        )
    }
}

/// Look a key up on the page, then on its ancestors
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut dict = page;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return match value {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
        }
        let parent_id = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        dict = doc.get_object(parent_id).and_then(Object::as_dict).ok()?;
    }
    None
}

/// Parse a box array `[x1, y1, x2, y2]`
fn parse_box(obj: &Object) -> Result<[f64; 4], RedactionError> {
    let array = obj
        .as_array()
        .map_err(|_| RedactionError::ParseError("MediaBox is not an array".to_string()))?;
    if array.len() != 4 {
        return Err(RedactionError::ParseError(
            "MediaBox must have 4 elements".to_string(),
        ));
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = match obj {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => {
                return Err(RedactionError::ParseError(format!(
                    "MediaBox element {} is not a number",
                    i
                )))
            }
        };
    }
    Ok(result)
}

fn normalize_quarter_turn(angle: i64) -> i32 {
    // In [0, 360) after the reduction, so the cast is lossless
    angle.rem_euclid(360) as i32
}
