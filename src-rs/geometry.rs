//! Rectangles and the mapping between the scaled display canvas and the
//! original image.
//!
//! Three coordinate spaces are involved:
//!
//! * **screen** - pointer positions relative to the canvas element as laid out
//!   on screen (CSS pixels),
//! * **canvas** - the canvas backing store, always `display_width` pixels wide,
//! * **original** - pixels of the source image.
//!
//! Screen to canvas is a per-axis CSS correction; canvas to original is the
//! uniform image scale. Rounding only happens when landing in original space.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// Integer rectangle in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Half-open containment: left/top edges are inside, right/bottom are not.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= f64::from(self.x)
            && px < f64::from(self.right())
            && py >= f64::from(self.y)
            && py < f64::from(self.bottom())
    }

    /// True when the vertical extent overlaps `[top, bottom)`.
    pub fn spans_rows(&self, top: u32, bottom: u32) -> bool {
        i64::from(self.bottom()) > i64::from(top) && i64::from(self.y) < i64::from(bottom)
    }
}

/// Unsigned rectangle used for crops; always inside the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Point in canvas backing-store pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

impl CanvasPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: CanvasPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Pointer position relative to the on-screen canvas element.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in canvas pixels with possibly negative extent
/// while a drag is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CanvasRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CanvasRect {
    pub fn from_edges(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Flip negative extents so the origin is the top-left corner.
    pub fn normalized(self) -> Self {
        let mut out = self;
        if out.width < 0.0 {
            out.x += out.width;
            out.width = out.width.abs();
        }
        if out.height < 0.0 {
            out.y += out.height;
            out.height = out.height.abs();
        }
        out
    }
}

/// Bidirectional conversion between screen, canvas and original pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMapper {
    scale: f64,
    canvas_width: u32,
    canvas_height: u32,
    css_scale_x: f64,
    css_scale_y: f64,
}

impl CoordinateMapper {
    /// Fit an `original_width` x `original_height` image into a canvas
    /// `display_width` pixels wide, keeping the aspect ratio.
    pub fn new(
        original_width: u32,
        original_height: u32,
        display_width: u32,
    ) -> Result<Self, ConfigError> {
        if original_width == 0 {
            return Err(ConfigError::ZeroImageWidth);
        }
        if display_width == 0 {
            return Err(ConfigError::ZeroDisplayWidth);
        }
        let scale = f64::from(display_width) / f64::from(original_width);
        let canvas_height = (f64::from(original_height) * scale).round() as u32;
        Ok(Self {
            scale,
            canvas_width: display_width,
            canvas_height,
            css_scale_x: 1.0,
            css_scale_y: 1.0,
        })
    }

    /// Record the canvas element's on-screen size. Non-positive sizes (an
    /// element that has not been laid out yet) leave the correction at 1.
    pub fn set_viewport(&mut self, css_width: f64, css_height: f64) {
        self.css_scale_x = if css_width > 0.0 {
            f64::from(self.canvas_width) / css_width
        } else {
            1.0
        };
        self.css_scale_y = if css_height > 0.0 {
            f64::from(self.canvas_height) / css_height
        } else {
            1.0
        };
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.canvas_width, self.canvas_height)
    }

    pub fn screen_to_canvas(&self, point: ScreenPoint) -> CanvasPoint {
        CanvasPoint::new(point.x * self.css_scale_x, point.y * self.css_scale_y)
    }

    pub fn to_original(&self, point: CanvasPoint) -> (i32, i32) {
        (
            (point.x / self.scale).round() as i32,
            (point.y / self.scale).round() as i32,
        )
    }

    pub fn to_canvas(&self, x: i32, y: i32) -> CanvasPoint {
        CanvasPoint::new(f64::from(x) * self.scale, f64::from(y) * self.scale)
    }

    pub fn rect_to_canvas(&self, rect: Rect) -> CanvasRect {
        let origin = self.to_canvas(rect.x, rect.y);
        CanvasRect {
            x: origin.x,
            y: origin.y,
            width: f64::from(rect.width) * self.scale,
            height: f64::from(rect.height) * self.scale,
        }
    }

    /// Normalize a canvas rectangle and land it in original pixels. Each edge
    /// is rounded on its own, so an edge that did not move keeps its pixel.
    pub fn rect_to_original(&self, rect: CanvasRect) -> Rect {
        let rect = rect.normalized();
        let (left, top) = self.to_original(CanvasPoint::new(rect.x, rect.y));
        let (right, bottom) =
            self.to_original(CanvasPoint::new(rect.x + rect.width, rect.y + rect.height));
        Rect::new(left, top, right - left, bottom - top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_round_trip_stays_within_one_pixel() {
        for (w, h) in [(1920u32, 1080u32), (333, 517), (640, 480), (100, 100), (4001, 7)] {
            let mapper = CoordinateMapper::new(w, h, 640).unwrap();
            let step = (w / 97).max(1) as usize;
            for x in (0..=w as i32).step_by(step) {
                for y in (0..=h as i32).step_by((h / 31).max(1) as usize) {
                    let (rx, ry) = mapper.to_original(mapper.to_canvas(x, y));
                    assert!((rx - x).abs() <= 1, "x {x} -> {rx} at {w}x{h}");
                    assert!((ry - y).abs() <= 1, "y {y} -> {ry} at {w}x{h}");
                }
            }
        }
    }

    #[test]
    fn canvas_height_keeps_aspect_ratio() {
        let mapper = CoordinateMapper::new(1280, 721, 640).unwrap();
        assert_eq!(mapper.canvas_size(), (640, 361));
        assert_eq!(mapper.scale(), 0.5);
    }

    #[test]
    fn css_correction_applies_before_image_scale() {
        let mut mapper = CoordinateMapper::new(1280, 960, 640).unwrap();
        // canvas is 640x480 but displayed at 320x240
        mapper.set_viewport(320.0, 240.0);
        let canvas = mapper.screen_to_canvas(ScreenPoint::new(10.25, 20.5));
        assert_eq!(canvas, CanvasPoint::new(20.5, 41.0));
        assert_eq!(mapper.to_original(canvas), (41, 82));
    }

    #[test]
    fn degenerate_viewport_leaves_correction_neutral() {
        let mut mapper = CoordinateMapper::new(640, 480, 640).unwrap();
        mapper.set_viewport(0.0, -3.0);
        let canvas = mapper.screen_to_canvas(ScreenPoint::new(7.0, 9.0));
        assert_eq!(canvas, CanvasPoint::new(7.0, 9.0));
    }

    #[test]
    fn zero_width_image_is_rejected() {
        assert!(matches!(
            CoordinateMapper::new(0, 10, 640),
            Err(ConfigError::ZeroImageWidth)
        ));
        assert!(matches!(
            CoordinateMapper::new(10, 10, 0),
            Err(ConfigError::ZeroDisplayWidth)
        ));
    }

    #[test]
    fn negative_drag_rect_is_normalized() {
        let rect = CanvasRect {
            x: 50.0,
            y: 40.0,
            width: -20.0,
            height: -10.0,
        }
        .normalized();
        assert_eq!(
            rect,
            CanvasRect {
                x: 30.0,
                y: 30.0,
                width: 20.0,
                height: 10.0
            }
        );
    }

    #[test]
    fn rect_to_original_scales_and_rounds() {
        let mapper = CoordinateMapper::new(1280, 960, 640).unwrap();
        let rect = mapper.rect_to_original(CanvasRect::from_edges(60.4, 10.0, 10.0, 35.2));
        assert_eq!(rect, Rect::new(20, 20, 101, 50));
    }

    #[test]
    fn untouched_edges_keep_their_pixel_on_half_steps() {
        let mapper = CoordinateMapper::new(1280, 960, 640).unwrap();
        for left in [30.25, 30.75, 31.25, 44.75] {
            let rect = mapper.rect_to_original(CanvasRect::from_edges(left, 50.0, 75.0, 70.0));
            assert_eq!(rect.right(), 150, "left at {left}");
            assert_eq!(rect.bottom(), 140);
        }
    }

    #[test]
    fn rect_containment_is_half_open() {
        let rect = Rect::new(10, 10, 5, 5);
        assert!(rect.contains(10.0, 10.0));
        assert!(rect.contains(14.9, 14.9));
        assert!(!rect.contains(15.0, 12.0));
        assert!(!rect.contains(12.0, 15.0));
    }
}
