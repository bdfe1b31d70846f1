//! Preview rendering: the canvas-sized image with every selection outlined
//! and labelled, the focused selection's resize handles and the live draft.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::geometry::{CanvasRect, CoordinateMapper};
use crate::interaction::Handle;
use crate::selection::{display_label, SelectionContent, SelectionId, SelectionStore};

pub const ACCENT: Rgba<u8> = Rgba([0xff, 0x3e, 0x00, 0xff]);
pub const OUTLINE: Rgba<u8> = Rgba([0x00, 0x70, 0xf3, 0xff]);
const LABEL_HEIGHT: i32 = 20;
const HANDLE_SIZE: i32 = 8;

/// What to draw on top of the scaled image.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayState {
    pub editing: Option<SelectionId>,
    pub draft: Option<CanvasRect>,
}

pub fn render_overlay(
    image: &RgbaImage,
    store: &SelectionStore,
    mapper: &CoordinateMapper,
    state: OverlayState,
) -> RgbaImage {
    let (cw, ch) = mapper.canvas_size();
    let mut canvas = imageops::resize(image, cw.max(1), ch.max(1), FilterType::Triangle);

    for (position, sel) in store.iter().enumerate() {
        let rect = mapper.rect_to_canvas(sel.rect());
        let focused = state.editing == Some(sel.id());
        let color = if focused { ACCENT } else { OUTLINE };

        if let SelectionContent::Replace {
            background_color, ..
        } = sel.content()
        {
            if let Some(mut fill) = parse_color(background_color) {
                fill[3] /= 2;
                fill_canvas_rect(&mut canvas, rect, fill);
            }
        }
        stroke_canvas_rect(&mut canvas, rect, color);

        let label = display_label(position, sel);
        let lx = rect.x.round() as i32;
        let top = rect.y.round() as i32;
        // no room above: tuck the label inside the rectangle
        let ly = if top >= LABEL_HEIGHT { top - LABEL_HEIGHT } else { top };
        let label_w = label.chars().count() as i32 * 8 + 10;
        fill_rect_alpha(&mut canvas, lx, ly, lx + label_w - 1, ly + LABEL_HEIGHT - 1, color);
        draw_bitmap_text(&mut canvas, lx + 5, ly + 6, &label, Rgba([255, 255, 255, 255]), 1);

        if focused {
            for handle in Handle::ALL {
                let p = handle.position(rect);
                let (hx, hy) = (p.x.round() as i32, p.y.round() as i32);
                let half = HANDLE_SIZE / 2;
                fill_rect_alpha(&mut canvas, hx - half, hy - half, hx + half, hy + half, Rgba([255, 255, 255, 255]));
                draw_rect_outline(
                    &mut canvas,
                    (hx - half).max(0) as u32,
                    (hy - half).max(0) as u32,
                    HANDLE_SIZE as u32 + 1,
                    HANDLE_SIZE as u32 + 1,
                    ACCENT,
                    1,
                );
            }
        }
    }

    if let Some(draft) = state.draft {
        stroke_canvas_rect(&mut canvas, draft.normalized(), ACCENT);
    }
    canvas
}

fn stroke_canvas_rect(img: &mut RgbaImage, rect: CanvasRect, color: Rgba<u8>) {
    let x = rect.x.round().max(0.0) as u32;
    let y = rect.y.round().max(0.0) as u32;
    let w = rect.width.round().max(0.0) as u32;
    let h = rect.height.round().max(0.0) as u32;
    draw_rect_outline(img, x, y, w, h, color, 2);
}

fn fill_canvas_rect(img: &mut RgbaImage, rect: CanvasRect, color: Rgba<u8>) {
    if rect.width < 1.0 || rect.height < 1.0 {
        return;
    }
    let x0 = rect.x.round() as i32;
    let y0 = rect.y.round() as i32;
    let x1 = (rect.x + rect.width).round() as i32 - 1;
    let y1 = (rect.y + rect.height).round() as i32 - 1;
    fill_rect_alpha(img, x0, y0, x1, y1, color);
}

/// `#rgb`, `#rrggbb`, `#rrggbbaa` or `rgba(r, g, b, a)`.
pub fn parse_color(raw: &str) -> Option<Rgba<u8>> {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            3 => {
                let mut out = [0u8; 4];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    out[i] = v * 17;
                }
                out[3] = 255;
                Some(Rgba(out))
            }
            6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => None,
        };
    }

    let lower = s.to_ascii_lowercase();
    if lower.starts_with("rgba(") && lower.ends_with(')') {
        let body = &lower[5..lower.len() - 1];
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return None;
        }
        let channel = |p: &str| p.parse::<f64>().ok().map(|v| v.round().clamp(0.0, 255.0) as u8);
        let alpha_value = parts[3].parse::<f64>().ok()?;
        let a = if alpha_value <= 1.0 {
            (alpha_value * 255.0).round().clamp(0.0, 255.0) as u8
        } else {
            alpha_value.round().clamp(0.0, 255.0) as u8
        };
        return Some(Rgba([channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, a]));
    }

    None
}

fn draw_rect_outline(
    img: &mut RgbaImage,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    color: Rgba<u8>,
    thickness: u32,
) {
    if w == 0 || h == 0 || img.width() == 0 || img.height() == 0 {
        return;
    }
    let max_x = img.width() - 1;
    let max_y = img.height() - 1;
    if x > max_x || y > max_y {
        return;
    }

    let x1 = x.saturating_add(w - 1).min(max_x);
    let y1 = y.saturating_add(h - 1).min(max_y);

    // strokes grow inward so the outline stays inside the selection
    for t in 0..thickness.max(1) {
        let (tx0, ty0) = (x + t, y + t);
        let (tx1, ty1) = (x1.saturating_sub(t), y1.saturating_sub(t));
        if tx0 > tx1 || ty0 > ty1 {
            break;
        }
        for xx in tx0..=tx1 {
            img.put_pixel(xx, ty0, color);
            img.put_pixel(xx, ty1, color);
        }
        for yy in ty0..=ty1 {
            img.put_pixel(tx0, yy, color);
            img.put_pixel(tx1, yy, color);
        }
    }
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| (f64::from(d) * inv + f64::from(s) * a).round().clamp(0.0, 255.0) as u8;
    let out_a = (f64::from(dst[3]) * inv + f64::from(src[3])).round().clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

fn fill_rect_alpha(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let max_x = img.width() as i32 - 1;
    let max_y = img.height() as i32 - 1;
    let (lo_x, hi_x) = (x0.min(x1), x0.max(x1));
    let (lo_y, hi_y) = (y0.min(y1), y0.max(y1));
    if hi_x < 0 || hi_y < 0 || lo_x > max_x || lo_y > max_y {
        return;
    }
    for y in lo_y.max(0)..=hi_y.min(max_y) {
        for x in lo_x.max(0)..=hi_x.min(max_x) {
            let dst = *img.get_pixel(x as u32, y as u32);
            img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
        }
    }
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: u32) {
    let scale_i = scale.max(1) as i32;
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += 8 * scale_i;
            continue;
        };
        for (row_idx, row_bits) in glyph.iter().enumerate() {
            for col_idx in 0..8 {
                if (row_bits >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col_idx * scale_i;
                let py = y + row_idx as i32 * scale_i;
                for sy in 0..scale_i {
                    for sx in 0..scale_i {
                        let (tx, ty) = (px + sx, py + sy);
                        if tx >= 0 && ty >= 0 && tx < img.width() as i32 && ty < img.height() as i32 {
                            let dst = *img.get_pixel(tx as u32, ty as u32);
                            img.put_pixel(tx as u32, ty as u32, blend_pixel(dst, color));
                        }
                    }
                }
            }
        }
        cursor_x += 8 * scale_i;
    }
}
