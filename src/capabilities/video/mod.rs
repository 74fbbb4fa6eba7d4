mod procedural;
mod prompt;
mod veo;

pub use procedural::ProceduralStrategy;
pub use prompt::{MAX_PROMPT_CHARS, build_video_prompt};
pub use veo::VeoStrategy;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Cancellation, MessageTranslator, TextRenderer};
use crate::{
    config::AppConfig,
    errors::{PipelineError, Result},
    models::{CampaignBrief, GeneratedVideo, Product, Resolution, VideoFormat},
    util::{short_id, slug},
};

/// Fixed score recorded for every produced clip; videos are not analysed.
pub const VIDEO_QUALITY_SCORE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSpec {
    pub duration_secs: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for VideoSpec {
    fn default() -> Self {
        Self {
            duration_secs: 8,
            width: 1280,
            height: 720,
            fps: 24,
        }
    }
}

impl VideoSpec {
    pub fn total_frames(&self) -> u32 {
        self.duration_secs * self.fps
    }
}

pub struct VideoContext<'a> {
    pub brief: &'a CampaignBrief,
    pub product: &'a Product,
    pub format: VideoFormat,
    pub image_paths: &'a [PathBuf],
    pub prompt: &'a str,
    /// Output path without extension; each strategy picks its container.
    pub output_stem: &'a Path,
    pub cancel: &'a Cancellation,
}

impl VideoContext<'_> {
    pub fn output_path(&self, extension: &str) -> PathBuf {
        append_extension(self.output_stem, extension)
    }
}

/// Unlike `Path::with_extension`, keeps any dots already in the stem.
pub(crate) fn append_extension(stem: &Path, extension: &str) -> PathBuf {
    let mut path = stem.as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

#[derive(Debug, Clone)]
pub struct VideoClip {
    pub path: PathBuf,
    pub spec: VideoSpec,
    pub model: String,
    pub has_audio: bool,
}

/// One stage of the video fallback chain, same contract as the image chain.
#[async_trait]
pub trait VideoStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, ctx: &VideoContext<'_>) -> Result<Option<VideoClip>>;
}

pub struct VideoComposer {
    strategies: Vec<Box<dyn VideoStrategy>>,
}

impl VideoComposer {
    /// Chain: Veo when a Google AI key is configured, then the local renderer.
    pub fn from_config(
        config: &AppConfig,
        http: reqwest::Client,
        renderer: Arc<TextRenderer>,
        translator: Arc<MessageTranslator>,
    ) -> Self {
        let mut strategies: Vec<Box<dyn VideoStrategy>> = Vec::new();
        match config.veo.as_ref() {
            Some(veo) => strategies.push(Box::new(VeoStrategy::new(http, veo))),
            None => {
                info!(target: "video_composer", "no Google AI key configured, videos use the local renderer")
            }
        }
        strategies.push(Box::new(ProceduralStrategy::new(
            config.video.spec,
            config.video.ffmpeg_path.clone(),
            renderer,
            translator,
        )));
        Self { strategies }
    }

    pub fn with_strategies(strategies: Vec<Box<dyn VideoStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Produces one clip for `(product, format)` under `output_dir`, named
    /// `{product}_{format}_{id}` with the extension of the winning stage.
    pub async fn generate(
        &self,
        product: &Product,
        brief: &CampaignBrief,
        image_paths: &[PathBuf],
        format: VideoFormat,
        output_dir: &Path,
        cancel: &Cancellation,
    ) -> Option<GeneratedVideo> {
        let started = Instant::now();
        if let Err(err) = tokio::fs::create_dir_all(output_dir).await {
            warn!(target: "video_composer", dir = %output_dir.display(), error = %err, "cannot create video directory");
            return None;
        }

        let prompt = build_video_prompt(product, brief);
        let stem = output_dir.join(format!("{}_{}_{}", slug(&product.name), format.as_str(), short_id()));
        let ctx = VideoContext {
            brief,
            product,
            format,
            image_paths,
            prompt: &prompt,
            output_stem: &stem,
            cancel,
        };

        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                return None;
            }
            match strategy.attempt(&ctx).await {
                Ok(Some(clip)) => {
                    let file_size = tokio::fs::metadata(&clip.path).await.ok().map(|meta| meta.len());
                    info!(
                        target: "video_composer",
                        product = %product.name,
                        format = %format,
                        source = strategy.name(),
                        path = %clip.path.display(),
                        "video ready"
                    );
                    return Some(GeneratedVideo {
                        video_id: uuid::Uuid::new_v4().to_string(),
                        product_name: product.name.clone(),
                        video_format: format,
                        file_path: clip.path,
                        file_size,
                        duration_secs: clip.spec.duration_secs as f64,
                        resolution: Resolution {
                            width: clip.spec.width,
                            height: clip.spec.height,
                        },
                        fps: clip.spec.fps,
                        has_music: clip.has_audio && brief.include_music,
                        has_voice_over: clip.has_audio && brief.include_voice_over,
                        quality_score: VIDEO_QUALITY_SCORE,
                        generation_time_secs: started.elapsed().as_secs_f64(),
                        model_used: clip.model,
                        remote_url: None,
                    });
                }
                Ok(None) => {
                    debug!(target: "video_composer", stage = strategy.name(), "stage not applicable");
                }
                Err(PipelineError::Cancelled) => return None,
                Err(err) => {
                    warn!(
                        target: "video_composer",
                        stage = strategy.name(),
                        product = %product.name,
                        format = %format,
                        error = %err,
                        "video stage failed, falling back"
                    );
                }
            }
        }

        warn!(target: "video_composer", product = %product.name, format = %format, "every video stage failed");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;

    struct Failing;

    #[async_trait]
    impl VideoStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn attempt(&self, _ctx: &VideoContext<'_>) -> Result<Option<VideoClip>> {
            Err(PipelineError::other("quota exceeded"))
        }
    }

    struct Fixed;

    #[async_trait]
    impl VideoStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn attempt(&self, ctx: &VideoContext<'_>) -> Result<Option<VideoClip>> {
            let path = ctx.output_path("mp4");
            tokio::fs::write(&path, b"clip").await?;
            Ok(Some(VideoClip {
                path,
                spec: VideoSpec::default(),
                model: "fixed-model".to_string(),
                has_audio: true,
            }))
        }
    }

    #[tokio::test]
    async fn failing_stage_falls_through_to_next() {
        let dir = tempfile::tempdir().unwrap();
        let composer = VideoComposer::with_strategies(vec![Box::new(Failing), Box::new(Fixed)]);
        let brief = fixtures::brief(&["Trail Watch"]);

        let video = composer
            .generate(
                &brief.products[0],
                &brief,
                &[],
                VideoFormat::Tiktok,
                dir.path(),
                &Cancellation::never(),
            )
            .await
            .unwrap();

        assert_eq!(video.model_used, "fixed-model");
        assert_eq!(video.duration_secs, 8.0);
        assert_eq!(video.resolution, Resolution { width: 1280, height: 720 });
        assert_eq!(video.fps, 24);
        assert_eq!(video.file_size, Some(4));
        assert_eq!(video.quality_score, VIDEO_QUALITY_SCORE);
        assert!(video.has_music && video.has_voice_over);
        let name = video.file_path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("trail_watch_tiktok_"), "{name}");
    }

    #[tokio::test]
    async fn exhausted_chain_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let composer = VideoComposer::with_strategies(vec![Box::new(Failing)]);
        let brief = fixtures::brief(&["Trail Watch"]);
        let video = composer
            .generate(
                &brief.products[0],
                &brief,
                &[],
                VideoFormat::Story,
                dir.path(),
                &Cancellation::never(),
            )
            .await;
        assert!(video.is_none());
    }

    #[test]
    fn extension_is_appended_after_dotted_stem() {
        assert_eq!(
            append_extension(Path::new("out/watch_2.0_tiktok_ab12"), "mp4"),
            PathBuf::from("out/watch_2.0_tiktok_ab12.mp4")
        );
    }

    #[test]
    fn default_chain_without_key_is_local_only() {
        let composer = VideoComposer::from_config(
            &AppConfig::default(),
            reqwest::Client::new(),
            Arc::new(TextRenderer::bitmap()),
            Arc::new(MessageTranslator::disabled()),
        );
        assert_eq!(composer.strategy_names(), vec!["procedural"]);
    }
}
