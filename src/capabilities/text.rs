use std::{
    fmt,
    path::{Path, PathBuf},
};

use ab_glyph::{FontVec, PxScale};
use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::{debug, warn};

const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

const GLYPH_SIZE: u32 = 8;

/// Rasterizes overlay text with a TrueType font when one can be found, or the
/// built-in 8x8 bitmap font so text rendering never depends on the host.
pub enum TextRenderer {
    Vector(FontVec),
    Bitmap,
}

impl fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextRenderer::Vector(_) => f.write_str("TextRenderer::Vector"),
            TextRenderer::Bitmap => f.write_str("TextRenderer::Bitmap"),
        }
    }
}

impl TextRenderer {
    /// Tries `preferred` first, then well-known system font locations.
    pub fn load(preferred: Option<&Path>) -> Self {
        let candidates = preferred
            .map(Path::to_path_buf)
            .into_iter()
            .chain(SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from));

        for candidate in candidates {
            let Ok(bytes) = std::fs::read(&candidate) else {
                continue;
            };
            match FontVec::try_from_vec(bytes) {
                Ok(font) => {
                    debug!(target: "compositor", font = %candidate.display(), "loaded overlay font");
                    return TextRenderer::Vector(font);
                }
                Err(err) => {
                    warn!(target: "compositor", font = %candidate.display(), error = %err, "unusable font file");
                }
            }
        }

        debug!(target: "compositor", "no TrueType font found, using bitmap font");
        TextRenderer::Bitmap
    }

    pub fn bitmap() -> Self {
        TextRenderer::Bitmap
    }

    pub fn measure(&self, text: &str, size: f32) -> (u32, u32) {
        match self {
            TextRenderer::Vector(font) => text_size(PxScale::from(size), font, text),
            TextRenderer::Bitmap => {
                let scale = bitmap_scale(size);
                let chars = text.chars().count() as u32;
                (chars * GLYPH_SIZE * scale, GLYPH_SIZE * scale)
            }
        }
    }

    pub fn draw(&self, canvas: &mut RgbaImage, text: &str, x: i32, y: i32, size: f32, color: Rgba<u8>) {
        match self {
            TextRenderer::Vector(font) => {
                draw_text_mut(canvas, color, x, y, PxScale::from(size), font, text)
            }
            TextRenderer::Bitmap => draw_bitmap_text(canvas, text, x, y, size, color),
        }
    }

    /// Stroke underlay in `outline`, then the fill on top.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_outlined(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        x: i32,
        y: i32,
        size: f32,
        fill: Rgba<u8>,
        outline: Rgba<u8>,
        stroke: i32,
    ) {
        for dx in -stroke..=stroke {
            for dy in -stroke..=stroke {
                if dx != 0 || dy != 0 {
                    self.draw(canvas, text, x + dx, y + dy, size, outline);
                }
            }
        }
        self.draw(canvas, text, x, y, size, fill);
    }

    /// Greedy word wrap so no line measures wider than `max_width`.
    pub fn wrap(&self, text: &str, size: f32, max_width: u32) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();

        for word in text.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };

            if self.measure(&candidate, size).0 <= max_width || current.is_empty() {
                current = candidate;
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }
}

fn bitmap_scale(size: f32) -> u32 {
    ((size / GLYPH_SIZE as f32).round() as u32).max(1)
}

fn draw_bitmap_text(canvas: &mut RgbaImage, text: &str, x: i32, y: i32, size: f32, color: Rgba<u8>) {
    let scale = bitmap_scale(size) as i32;
    let advance = GLYPH_SIZE as i32 * scale;
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);

    for (index, ch) in text.chars().enumerate() {
        let glyph = BASIC_FONTS
            .get(ch)
            .or_else(|| LATIN_FONTS.get(ch))
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);
        let origin_x = x + index as i32 * advance;

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE as i32 {
                if bits >> col & 1 == 0 {
                    continue;
                }
                let px = origin_x + col * scale;
                let py = y + row as i32 * scale;
                for oy in py.max(0)..(py + scale).min(height) {
                    for ox in px.max(0)..(px + scale).min(width) {
                        canvas.put_pixel(ox as u32, oy as u32, color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_measure_scales_with_size() {
        let renderer = TextRenderer::bitmap();
        assert_eq!(renderer.measure("abc", 16.0), (48, 16));
        assert_eq!(renderer.measure("a", 2.0), (8, 8));
    }

    #[test]
    fn bitmap_text_paints_pixels() {
        let renderer = TextRenderer::bitmap();
        let mut canvas = RgbaImage::from_pixel(64, 32, Rgba([0, 0, 0, 255]));
        renderer.draw_outlined(
            &mut canvas,
            "Hi",
            4,
            4,
            16.0,
            Rgba([255, 255, 255, 255]),
            Rgba([255, 0, 0, 255]),
            1,
        );
        assert!(canvas.pixels().any(|p| p.0 == [255, 255, 255, 255]));
        assert!(canvas.pixels().any(|p| p.0 == [255, 0, 0, 255]));
    }

    #[test]
    fn drawing_off_canvas_is_clipped() {
        let renderer = TextRenderer::bitmap();
        let mut canvas = RgbaImage::new(10, 10);
        renderer.draw(&mut canvas, "Offscreen", -50, 200, 24.0, Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn wrap_respects_width() {
        let renderer = TextRenderer::bitmap();
        let lines = renderer.wrap("one two three four", 8.0, 8 * 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
    }
}
