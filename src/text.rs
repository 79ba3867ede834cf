//! Text rendering for the info widget
//!
//! Fonts are discovered at runtime from a candidate list. A frame without a
//! usable font still composes: measurements fall back to estimates and text
//! is simply not drawn.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use std::path::PathBuf;

/// Rough advance and line height when no font could be loaded
const FALLBACK_ADVANCE: f32 = 0.6;
const FALLBACK_HEIGHT: f32 = 1.0;

/// Loaded widget font, if any
pub struct FontSet {
    font: Option<FontVec>,
}

impl FontSet {
    /// Load the first candidate that reads and parses
    pub fn load(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            let Ok(data) = std::fs::read(path) else {
                continue;
            };
            match FontVec::try_from_vec(data) {
                Ok(font) => {
                    tracing::info!("Using font {}", path.display());
                    return Self { font: Some(font) };
                }
                Err(e) => tracing::warn!("Unusable font {}: {}", path.display(), e),
            }
        }

        tracing::warn!("No usable font found, widget text will be skipped");
        Self::none()
    }

    pub fn none() -> Self {
        Self { font: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.font.is_some()
    }

    /// Horizontal advance of `text` at `size` pixels
    pub fn text_width(&self, text: &str, size: f32) -> u32 {
        match &self.font {
            Some(font) => measure_text_width(font, text, PxScale::from(size)).ceil() as u32,
            None => (text.chars().count() as f32 * size * FALLBACK_ADVANCE).round() as u32,
        }
    }

    /// Bottom of the ink box measured from the draw origin (top of the line).
    /// Empty text measures zero.
    pub fn text_height(&self, text: &str, size: f32) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let Some(font) = &self.font else {
            return (size * FALLBACK_HEIGHT).round() as u32;
        };

        let scale = PxScale::from(size);
        let ascent = font.as_scaled(scale).ascent();
        let mut bottom = 0.0f32;
        layout_glyphs(font, text, scale, 0.0, ascent, |glyph| {
            if let Some(outlined) = font.outline_glyph(glyph) {
                bottom = bottom.max(outlined.px_bounds().max.y);
            }
        });
        bottom.ceil().max(0.0) as u32
    }

    /// Largest size from `sizes` at which `text` fits in `max_width`
    pub fn fit_size(&self, text: &str, max_width: u32, sizes: &[f32]) -> f32 {
        sizes
            .iter()
            .copied()
            .find(|&size| self.text_width(text, size) <= max_width)
            .or_else(|| sizes.last().copied())
            .unwrap_or(14.0)
    }

    /// Draw `text` with its line top at (`x`, `y`), blending glyph coverage
    /// into every channel so the alpha of a translucent card is preserved.
    pub fn draw(&self, canvas: &mut RgbaImage, text: &str, size: f32, x: i32, y: i32, color: Rgba<u8>) {
        let Some(font) = &self.font else {
            return;
        };

        let scale = PxScale::from(size);
        let ascent = font.as_scaled(scale).ascent();
        let (width, height) = canvas.dimensions();

        layout_glyphs(font, text, scale, x as f32, y as f32 + ascent, |glyph| {
            let Some(outlined) = font.outline_glyph(glyph) else {
                return;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let px = bounds.min.x as i32 + gx as i32;
                let py = bounds.min.y as i32 + gy as i32;
                if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                    return;
                }
                let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                *pixel = blend(*pixel, color, coverage);
            });
        });
    }
}

/// Measure the width of text at a given scale
fn measure_text_width(font: &FontVec, text: &str, scale: PxScale) -> f32 {
    let scaled_font = font.as_scaled(scale);
    text.chars()
        .map(|c| scaled_font.h_advance(font.glyph_id(c)))
        .sum()
}

/// Position each glyph along a baseline starting at (`x`, `baseline`)
fn layout_glyphs(
    font: &FontVec,
    text: &str,
    scale: PxScale,
    x: f32,
    baseline: f32,
    mut visit: impl FnMut(ab_glyph::Glyph),
) {
    let scaled_font = font.as_scaled(scale);
    let mut cursor_x = x;

    for c in text.chars() {
        let glyph_id = font.glyph_id(c);
        visit(glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, baseline)));
        cursor_x += scaled_font.h_advance(glyph_id);
    }
}

/// Linear mix of every channel, alpha included
pub fn blend(base: Rgba<u8>, color: Rgba<u8>, coverage: f32) -> Rgba<u8> {
    let t = coverage.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
    Rgba([
        mix(base[0], color[0]),
        mix(base[1], color[1]),
        mix(base[2], color[2]),
        mix(base[3], color[3]),
    ])
}
