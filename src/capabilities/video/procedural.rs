use std::{
    f64::consts::PI,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Arc,
};

use async_trait::async_trait;
use image::{
    Delay, DynamicImage, Frame, Rgba, RgbaImage,
    codecs::gif::{GifEncoder, Repeat},
    imageops::{self, FilterType},
};
use imageproc::drawing::draw_filled_circle_mut;
use tracing::{debug, warn};

use super::{VideoClip, VideoContext, VideoSpec, VideoStrategy, append_extension};
use crate::{
    capabilities::{Cancellation, MessageTranslator, TextRenderer},
    errors::{PipelineError, Result},
};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const PRICE_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
/// Share of the product photo kept under the animated tint.
const PHOTO_WEIGHT: f32 = 0.7;

/// Local clip: animated tint over the first product image (or a flat
/// background), product name, message and price, and a moving progress dot.
/// Encoded to MP4 through `ffmpeg`; when that is unavailable the frames are
/// written as an animated GIF, so this stage always yields a clip.
pub struct ProceduralStrategy {
    spec: VideoSpec,
    ffmpeg: PathBuf,
    renderer: Arc<TextRenderer>,
    translator: Arc<MessageTranslator>,
}

struct Scene {
    spec: VideoSpec,
    background: Option<RgbaImage>,
    overlay: RgbaImage,
}

impl ProceduralStrategy {
    pub fn new(
        spec: VideoSpec,
        ffmpeg: PathBuf,
        renderer: Arc<TextRenderer>,
        translator: Arc<MessageTranslator>,
    ) -> Self {
        Self {
            spec,
            ffmpeg,
            renderer,
            translator,
        }
    }

    async fn message(&self, ctx: &VideoContext<'_>) -> String {
        if ctx.brief.is_english() {
            return ctx.brief.campaign_message.clone();
        }
        self.translator
            .translate(&ctx.brief.campaign_message, &ctx.brief.language, ctx.cancel)
            .await
    }
}

#[async_trait]
impl VideoStrategy for ProceduralStrategy {
    fn name(&self) -> &'static str {
        "procedural"
    }

    async fn attempt(&self, ctx: &VideoContext<'_>) -> Result<Option<VideoClip>> {
        let message = self.message(ctx).await;
        let spec = self.spec;
        let renderer = self.renderer.clone();
        let ffmpeg = self.ffmpeg.clone();
        let first_image = ctx.image_paths.first().cloned();
        let name = ctx.product.name.clone();
        let price = ctx.product.price.filter(|price| *price > 0.0);
        let stem = ctx.output_stem.to_path_buf();
        let cancel = ctx.cancel.clone();

        let (path, encoder) = tokio::task::spawn_blocking(move || {
            let scene = Scene {
                spec,
                background: first_image.as_deref().and_then(|path| load_background(path, spec)),
                overlay: text_overlay(&renderer, spec, &name, &message, price),
            };
            encode(&scene, &ffmpeg, &stem, &cancel)
        })
        .await
        .map_err(|err| PipelineError::other(format!("video render task failed: {err}")))??;

        Ok(Some(VideoClip {
            path,
            spec,
            model: format!("procedural-{encoder}"),
            has_audio: false,
        }))
    }
}

fn load_background(path: &Path, spec: VideoSpec) -> Option<RgbaImage> {
    match image::open(path) {
        Ok(image) => Some(
            image
                .resize_to_fill(spec.width, spec.height, FilterType::Triangle)
                .to_rgba8(),
        ),
        Err(err) => {
            debug!(target: "video_composer", path = %path.display(), error = %err, "background image unreadable, using flat color");
            None
        }
    }
}

/// Static text layer, drawn once and composited onto every frame.
fn text_overlay(
    renderer: &TextRenderer,
    spec: VideoSpec,
    name: &str,
    message: &str,
    price: Option<f64>,
) -> RgbaImage {
    let (width, height) = (spec.width, spec.height);
    let mut layer = RgbaImage::new(width, height);

    let title_size = (height / 12).max(8) as f32;
    centered(renderer, &mut layer, name, height / 3, title_size, WHITE);

    if !message.trim().is_empty() {
        let size = (height / 24).max(8) as f32;
        let line_height = renderer.measure("Ag", size).1 + 4;
        let lines = renderer.wrap(message, size, width.saturating_sub(80).max(1));
        for (index, line) in lines.iter().enumerate() {
            centered(renderer, &mut layer, line, height / 2 + index as u32 * line_height, size, WHITE);
        }
    }

    if let Some(price) = price {
        let size = (height / 16).max(8) as f32;
        centered(renderer, &mut layer, &format!("${price:.2}"), height * 2 / 3, size, PRICE_COLOR);
    }

    layer
}

fn centered(renderer: &TextRenderer, layer: &mut RgbaImage, text: &str, y: u32, size: f32, fill: Rgba<u8>) {
    let (text_width, _) = renderer.measure(text, size);
    let x = (layer.width() as i32 - text_width as i32) / 2;
    renderer.draw_outlined(layer, text, x, y as i32, size, fill, BLACK, 2);
}

fn tint(progress: f64) -> [u8; 3] {
    let intensity = (128.0 + 127.0 * (progress * 2.0 * PI).sin()).round() as u8;
    [intensity, intensity / 2, intensity / 3]
}

impl Scene {
    fn frame(&self, index: u32) -> RgbaImage {
        let total = self.spec.total_frames().max(1);
        let progress = index as f64 / total as f64;
        let [r, g, b] = tint(progress);

        let mut frame = match self.background.as_ref() {
            Some(background) => {
                let mut frame = background.clone();
                for pixel in frame.pixels_mut() {
                    for (channel, tint) in pixel.0.iter_mut().take(3).zip([r, g, b]) {
                        *channel = (*channel as f32 * PHOTO_WEIGHT + tint as f32 * (1.0 - PHOTO_WEIGHT)) as u8;
                    }
                }
                frame
            }
            None => RgbaImage::from_pixel(self.spec.width, self.spec.height, Rgba([r, g, b, 255])),
        };

        imageops::overlay(&mut frame, &self.overlay, 0, 0);

        let radius = (self.spec.height / 40).max(2) as i32;
        let track = self.spec.width as i32 - 4 * radius;
        let x = 2 * radius + (track as f64 * progress) as i32;
        let y = self.spec.height as i32 - 3 * radius;
        draw_filled_circle_mut(&mut frame, (x, y), radius, WHITE);

        frame
    }
}

fn check(cancel: &Cancellation) -> Result<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Tries ffmpeg first, then GIF. Returns the written path and encoder name.
fn encode(scene: &Scene, ffmpeg: &Path, stem: &Path, cancel: &Cancellation) -> Result<(PathBuf, &'static str)> {
    let mp4 = append_extension(stem, "mp4");
    match encode_mp4(scene, ffmpeg, &mp4, cancel) {
        Ok(()) => return Ok((mp4, "ffmpeg")),
        Err(PipelineError::Cancelled) => {
            let _ = std::fs::remove_file(&mp4);
            return Err(PipelineError::Cancelled);
        }
        Err(err) => {
            let _ = std::fs::remove_file(&mp4);
            warn!(target: "video_composer", ffmpeg = %ffmpeg.display(), error = %err, "ffmpeg encode unavailable, writing GIF");
        }
    }

    let gif = append_extension(stem, "gif");
    if let Err(err) = encode_gif(scene, &gif, cancel) {
        let _ = std::fs::remove_file(&gif);
        return Err(err);
    }
    Ok((gif, "gif"))
}

fn encode_mp4(scene: &Scene, ffmpeg: &Path, target: &Path, cancel: &Cancellation) -> Result<()> {
    let size = format!("{}x{}", scene.spec.width, scene.spec.height);
    let mut child = Command::new(ffmpeg)
        .args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
        .arg(&size)
        .arg("-r")
        .arg(scene.spec.fps.to_string())
        .args(["-i", "-", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags", "+faststart"])
        .arg(target)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let written = match child.stdin.take() {
        Some(stdin) => write_raw_frames(scene, stdin, cancel),
        None => Err(PipelineError::other("ffmpeg stdin unavailable")),
    };
    if written.is_err() {
        let _ = child.kill();
    }
    let output = child.wait_with_output()?;
    written?;

    if !output.status.success() {
        return Err(PipelineError::other(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

fn write_raw_frames(scene: &Scene, stdin: impl Write, cancel: &Cancellation) -> Result<()> {
    let mut writer = BufWriter::new(stdin);
    for index in 0..scene.spec.total_frames() {
        check(cancel)?;
        let rgb = DynamicImage::ImageRgba8(scene.frame(index)).to_rgb8();
        writer.write_all(rgb.as_raw())?;
    }
    writer.flush()?;
    Ok(())
}

fn encode_gif(scene: &Scene, target: &Path, cancel: &Cancellation) -> Result<()> {
    let mut encoder = GifEncoder::new_with_speed(BufWriter::new(File::create(target)?), 30);
    encoder.set_repeat(Repeat::Infinite)?;
    let delay = Delay::from_numer_denom_ms(1000, scene.spec.fps.max(1));
    for index in 0..scene.spec.total_frames() {
        check(cancel)?;
        encoder.encode_frame(Frame::from_parts(scene.frame(index), 0, 0, delay))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{VideoFormat, fixtures};

    const TINY: VideoSpec = VideoSpec {
        duration_secs: 1,
        width: 64,
        height: 48,
        fps: 4,
    };

    fn strategy() -> ProceduralStrategy {
        ProceduralStrategy::new(
            TINY,
            PathBuf::from("/nonexistent/ffmpeg"),
            Arc::new(TextRenderer::bitmap()),
            Arc::new(MessageTranslator::disabled()),
        )
    }

    #[test]
    fn tint_follows_sine_cycle() {
        assert_eq!(tint(0.0), [128, 64, 42]);
        assert_eq!(tint(0.25), [255, 127, 85]);
        assert_eq!(tint(0.75), [1, 0, 0]);
    }

    #[test]
    fn frames_have_spec_size_and_moving_marker() {
        let scene = Scene {
            spec: TINY,
            background: None,
            overlay: RgbaImage::new(TINY.width, TINY.height),
        };
        let first = scene.frame(0);
        let later = scene.frame(3);
        assert_eq!(first.dimensions(), (64, 48));
        assert_ne!(first, later);
    }

    #[tokio::test]
    async fn missing_ffmpeg_falls_back_to_gif() {
        let dir = tempfile::tempdir().unwrap();
        let brief = fixtures::brief(&["Trail Watch"]);
        let stem = dir.path().join("trail_watch_story_abc");
        let ctx = VideoContext {
            brief: &brief,
            product: &brief.products[0],
            format: VideoFormat::Story,
            image_paths: &[],
            prompt: "unused",
            output_stem: &stem,
            cancel: &Cancellation::never(),
        };

        let clip = strategy().attempt(&ctx).await.unwrap().unwrap();
        assert_eq!(clip.path, append_extension(&stem, "gif"));
        assert_eq!(clip.model, "procedural-gif");
        assert_eq!(clip.spec, TINY);
        assert!(!clip.has_audio);

        let bytes = std::fs::read(&clip.path).unwrap();
        assert!(bytes.starts_with(b"GIF89a"));
        assert!(!append_extension(&stem, "mp4").exists());
    }

    #[tokio::test]
    async fn cancelled_render_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let brief = fixtures::brief(&["Trail Watch"]);
        let stem = dir.path().join("cancelled");
        let (handle, cancel) = Cancellation::new();
        handle.cancel();
        let ctx = VideoContext {
            brief: &brief,
            product: &brief.products[0],
            format: VideoFormat::Story,
            image_paths: &[],
            prompt: "unused",
            output_stem: &stem,
            cancel: &cancel,
        };

        let result = strategy().attempt(&ctx).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert!(!append_extension(&stem, "gif").exists());
    }
}
