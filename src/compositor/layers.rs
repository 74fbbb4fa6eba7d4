use std::path::Path;

use image::{DynamicImage, Rgba, RgbaImage, imageops};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_hollow_rect_mut},
    rect::Rect,
};

use crate::{
    capabilities::TextRenderer,
    errors::{PipelineError, Result},
    models::AspectRatio,
};

const CONTRAST: f32 = 1.1;
const BRIGHTNESS: f32 = 1.05;
const SHARPNESS: f32 = 1.1;
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];
const SCRIM_MAX_ALPHA: f32 = 100.0;
const LOGO_MARGIN: i64 = 20;
const INDICATOR_MARGIN: i32 = 20;
const OUTLINE_WIDTH: i32 = 2;

pub fn rgba([r, g, b]: [u8; 3]) -> Rgba<u8> {
    Rgba([r, g, b, 255])
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Fixed contrast, brightness and sharpness multipliers.
pub fn enhance(image: &RgbaImage) -> RgbaImage {
    let pixel_count = (image.width() as f64 * image.height() as f64).max(1.0);
    let mean_luma = image
        .pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .sum::<f64>()
        / pixel_count;
    let mean_luma = mean_luma as f32;

    let mut adjusted = image.clone();
    for pixel in adjusted.pixels_mut() {
        for channel in 0..3 {
            let contrasted = mean_luma + (pixel[channel] as f32 - mean_luma) * CONTRAST;
            pixel[channel] = clamp_channel(clamp_channel(contrasted) as f32 * BRIGHTNESS);
        }
    }

    let smoothed: RgbaImage = imageops::filter3x3(&adjusted, &SMOOTH_KERNEL);
    let mut sharpened = adjusted.clone();
    for (out, (orig, blur)) in sharpened
        .pixels_mut()
        .zip(adjusted.pixels().zip(smoothed.pixels()))
    {
        for channel in 0..3 {
            let blurred = blur[channel] as f32;
            out[channel] = clamp_channel(blurred + (orig[channel] as f32 - blurred) * SHARPNESS);
        }
    }
    sharpened
}

/// Bottom-third gradient band that fades upward; portrait only.
pub fn scrim(image: &mut RgbaImage, color: [u8; 3]) {
    let (width, height) = image.dimensions();
    let band = height / 3;
    if band == 0 {
        return;
    }
    let top = height - band;

    for i in 0..band {
        let alpha = SCRIM_MAX_ALPHA * (1.0 - i as f32 / band as f32) / 255.0;
        let y = top + i;
        for x in 0..width {
            let pixel = image.get_pixel_mut(x, y);
            for channel in 0..3 {
                let blended =
                    pixel[channel] as f32 * (1.0 - alpha) + color[channel] as f32 * alpha;
                pixel[channel] = clamp_channel(blended);
            }
        }
    }
}

pub fn border(image: &mut RgbaImage, color: [u8; 3], width: u32) {
    let (w, h) = image.dimensions();
    for inset in 0..width {
        if w <= inset * 2 || h <= inset * 2 {
            break;
        }
        let rect = Rect::at(inset as i32, inset as i32).of_size(w - inset * 2, h - inset * 2);
        draw_hollow_rect_mut(image, rect, rgba(color));
    }
}

pub struct TextBlock<'a> {
    pub title: &'a str,
    pub message: &'a str,
    pub fill: [u8; 3],
    pub outline: [u8; 3],
}

/// Product name and campaign message, centered, in the ratio's text band.
pub fn text_blocks(
    image: &mut RgbaImage,
    renderer: &TextRenderer,
    block: &TextBlock<'_>,
    aspect_ratio: AspectRatio,
) -> Result<()> {
    let (width, height) = image.dimensions();
    let base_size = width.min(height) / 25;
    if base_size < 4 {
        return Err(PipelineError::other(format!(
            "image {width}x{height} is too small for text overlay"
        )));
    }
    let title_size = (base_size as f32 * 1.2).floor();
    let subtitle_size = (base_size as f32 * 0.8).floor();

    let (start_y, gap) = match aspect_ratio {
        AspectRatio::Portrait => (height - height / 4, 20),
        AspectRatio::Square | AspectRatio::Landscape => (height - height / 5, 15),
    };

    let fill = rgba(block.fill);
    let outline = rgba(block.outline);

    let (title_width, _) = renderer.measure(block.title, title_size);
    let title_x = (width as i32 - title_width as i32) / 2;
    renderer.draw_outlined(
        image,
        block.title,
        title_x,
        start_y as i32,
        title_size,
        fill,
        outline,
        OUTLINE_WIDTH,
    );

    let max_width = width.saturating_sub(80).max(1);
    let line_height = (subtitle_size * 1.25) as i32;
    let mut y = start_y as i32 + title_size as i32 + gap;
    for line in renderer.wrap(block.message, subtitle_size, max_width) {
        let (line_width, _) = renderer.measure(&line, subtitle_size);
        let x = (width as i32 - line_width as i32) / 2;
        renderer.draw_outlined(image, &line, x, y, subtitle_size, fill, outline, OUTLINE_WIDTH);
        y += line_height;
    }

    Ok(())
}

pub fn logo_position(
    (width, height): (u32, u32),
    (logo_width, logo_height): (u32, u32),
    aspect_ratio: AspectRatio,
) -> (i64, i64) {
    let (w, h) = (width as i64, height as i64);
    let (lw, lh) = (logo_width as i64, logo_height as i64);
    match aspect_ratio {
        AspectRatio::Portrait => ((w - lw) / 2, h - lh - LOGO_MARGIN),
        AspectRatio::Landscape => (w - lw - LOGO_MARGIN, LOGO_MARGIN),
        AspectRatio::Square => (w - lw - LOGO_MARGIN, h - lh - LOGO_MARGIN),
    }
}

/// Pastes the logo, scaled to 1/8 of the shorter side and flattened on white.
pub fn logo(image: &mut RgbaImage, logo_path: &Path, aspect_ratio: AspectRatio) -> Result<()> {
    let logo = image::open(logo_path)?;
    let bound = (image.width().min(image.height()) / 8).max(1);
    let logo = logo.thumbnail(bound, bound).to_rgba8();

    let mut flattened = RgbaImage::from_pixel(logo.width(), logo.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut flattened, &logo, 0, 0);

    let (x, y) = logo_position(image.dimensions(), flattened.dimensions(), aspect_ratio);
    imageops::replace(image, &flattened, x, y);
    Ok(())
}

/// Generic circular brand mark in the top-right corner.
pub fn brand_indicator(
    image: &mut RgbaImage,
    renderer: &TextRenderer,
    fill: [u8; 3],
    outline: [u8; 3],
) {
    let (width, height) = image.dimensions();
    let size = (width.min(height) / 20) as i32;
    if size < 4 {
        return;
    }
    let x = width as i32 - size - INDICATOR_MARGIN;
    let y = INDICATOR_MARGIN;
    let radius = size / 2;
    let center = (x + radius, y + radius);

    draw_filled_circle_mut(image, center, radius, rgba(outline));
    draw_filled_circle_mut(image, center, (radius - OUTLINE_WIDTH).max(1), rgba(fill));

    let label = "BRAND";
    let label_size = (size / 3).max(1) as f32;
    let (label_width, label_height) = renderer.measure(label, label_size);
    renderer.draw(
        image,
        label,
        x + (size - label_width as i32) / 2,
        y + (size - label_height as i32) / 2,
        label_size,
        Rgba([0, 0, 0, 255]),
    );
}

pub fn into_dynamic(image: RgbaImage) -> DynamicImage {
    DynamicImage::ImageRgba8(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enhancement_brightens_flat_image() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([100, 100, 100, 255]));
        let enhanced = enhance(&image);
        assert_eq!(enhanced.get_pixel(4, 4).0, [105, 105, 105, 255]);
    }

    #[test]
    fn scrim_darkens_toward_primary_at_bottom() {
        let mut image = RgbaImage::from_pixel(4, 30, Rgba([255, 255, 255, 255]));
        scrim(&mut image, [0, 0, 0]);
        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255, 255]);
        let top_of_band = image.get_pixel(0, 20)[0];
        let bottom_of_band = image.get_pixel(0, 29)[0];
        assert!(top_of_band < 255);
        assert!(bottom_of_band > top_of_band);
    }

    #[test]
    fn border_is_drawn_at_edges() {
        let mut image = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        border(&mut image, [255, 215, 0], 4);
        assert_eq!(image.get_pixel(0, 0).0, [255, 215, 0, 255]);
        assert_eq!(image.get_pixel(3, 10).0, [255, 215, 0, 255]);
        assert_eq!(image.get_pixel(10, 10).0, [0, 0, 0, 255]);
    }

    #[test]
    fn logo_corners_follow_ratio() {
        assert_eq!(
            logo_position((1080, 1920), (100, 50), AspectRatio::Portrait),
            (490, 1850)
        );
        assert_eq!(
            logo_position((1920, 1080), (100, 50), AspectRatio::Landscape),
            (1800, 20)
        );
        assert_eq!(
            logo_position((1080, 1080), (100, 50), AspectRatio::Square),
            (960, 1010)
        );
    }

    #[test]
    fn tiny_images_reject_text() {
        let mut image = RgbaImage::new(40, 40);
        let block = TextBlock {
            title: "A",
            message: "B",
            fill: [255, 255, 255],
            outline: [0, 0, 0],
        };
        assert!(text_blocks(&mut image, &TextRenderer::bitmap(), &block, AspectRatio::Square).is_err());
    }
}
