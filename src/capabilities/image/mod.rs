mod prompt;
mod strategies;

pub use prompt::build_image_prompt;
pub use strategies::{
    AvatarEditStrategy, OpenAiImageStrategy, PLACEHOLDER_COLOR, PlaceholderStrategy,
    StockImageStrategy, StockImageTable,
};

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use image::{DynamicImage, codecs::jpeg::JpegEncoder, imageops::FilterType};
use tracing::{debug, info, warn};

use super::{Cancellation, TextRenderer};
use crate::{
    brand::BrandRegistry,
    config::AppConfig,
    errors::{PipelineError, Result},
    models::{AspectRatio, CampaignBrief, Product},
    util::short_id,
};

/// Everything a strategy needs to produce one base image.
pub struct ImageContext<'a> {
    pub brief: &'a CampaignBrief,
    pub product: &'a Product,
    pub aspect_ratio: AspectRatio,
    pub variation: u32,
    pub prompt: &'a str,
    pub cancel: &'a Cancellation,
}

/// One stage of the base image fallback chain.
///
/// `Ok(None)` means the stage does not apply (missing input or credential) and
/// the chain moves on silently; `Err` is logged and the chain moves on.
#[async_trait]
pub trait ImageStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, ctx: &ImageContext<'_>) -> Result<Option<DynamicImage>>;
}

#[derive(Debug, Clone)]
pub struct BaseImage {
    pub path: PathBuf,
    pub image: DynamicImage,
    /// Name of the strategy that produced the image.
    pub source: &'static str,
}

pub struct BaseImageGenerator {
    strategies: Vec<Box<dyn ImageStrategy>>,
    brands: Arc<BrandRegistry>,
    jpeg_quality: u8,
}

impl BaseImageGenerator {
    /// Chain: OpenAI generation, avatar edit (portrait only), stock photo, placeholder.
    pub fn from_config(
        config: &AppConfig,
        http: reqwest::Client,
        renderer: Arc<TextRenderer>,
        brands: Arc<BrandRegistry>,
    ) -> Self {
        let mut strategies: Vec<Box<dyn ImageStrategy>> = Vec::new();

        if let Some(openai) = config.openai.as_ref() {
            let client = openai.client();
            strategies.push(Box::new(OpenAiImageStrategy::new(
                &client,
                &openai.image_model,
                openai.request_timeout,
            )));
            strategies.push(Box::new(AvatarEditStrategy::new(http.clone(), openai)));
        } else {
            info!(target: "image_generator", "no OpenAI key configured, using stock and placeholder images");
        }

        strategies.push(Box::new(StockImageStrategy::new(
            http,
            config.images.stock_images.clone(),
            config.images.download_timeout,
        )));
        strategies.push(Box::new(PlaceholderStrategy::new(renderer)));

        Self {
            strategies,
            brands,
            jpeg_quality: config.images.jpeg_quality,
        }
    }

    /// Uses exactly `strategies`, in order. Without a placeholder stage the
    /// chain can be exhausted and `generate` returns `None`.
    pub fn with_strategies(strategies: Vec<Box<dyn ImageStrategy>>, brands: Arc<BrandRegistry>) -> Self {
        Self {
            strategies,
            brands,
            jpeg_quality: 95,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    pub fn prompt_for(&self, brief: &CampaignBrief, product: &Product, aspect_ratio: AspectRatio) -> String {
        build_image_prompt(brief, product, aspect_ratio, &self.brands)
    }

    /// Runs the chain and saves the winner, resized to the ratio's target size,
    /// as `variation{n}_generated_{id}_{ratio}.jpg` under `output_dir`.
    pub async fn generate(
        &self,
        brief: &CampaignBrief,
        product: &Product,
        aspect_ratio: AspectRatio,
        variation: u32,
        output_dir: &Path,
        cancel: &Cancellation,
    ) -> Option<BaseImage> {
        let prompt = self.prompt_for(brief, product, aspect_ratio);
        let ctx = ImageContext {
            brief,
            product,
            aspect_ratio,
            variation,
            prompt: &prompt,
            cancel,
        };

        for strategy in &self.strategies {
            if cancel.is_cancelled() {
                debug!(target: "image_generator", product = %product.name, "generation cancelled");
                return None;
            }

            match strategy.attempt(&ctx).await {
                Ok(Some(image)) => {
                    let file_name = format!(
                        "variation{variation}_generated_{}_{}.jpg",
                        short_id(),
                        aspect_ratio.slug()
                    );
                    let path = output_dir.join(file_name);

                    return match save_normalized(image, aspect_ratio, path, self.jpeg_quality).await {
                        Ok((path, image)) => {
                            info!(
                                target: "image_generator",
                                product = %product.name,
                                aspect_ratio = %aspect_ratio,
                                source = strategy.name(),
                                path = %path.display(),
                                "base image ready"
                            );
                            Some(BaseImage {
                                path,
                                image,
                                source: strategy.name(),
                            })
                        }
                        Err(err) => {
                            warn!(target: "image_generator", product = %product.name, error = %err, "failed to save base image");
                            None
                        }
                    };
                }
                Ok(None) => {
                    debug!(target: "image_generator", stage = strategy.name(), "stage not applicable");
                }
                Err(PipelineError::Cancelled) => {
                    debug!(target: "image_generator", stage = strategy.name(), "stage cancelled");
                    return None;
                }
                Err(err) => {
                    warn!(
                        target: "image_generator",
                        stage = strategy.name(),
                        product = %product.name,
                        aspect_ratio = %aspect_ratio,
                        error = %err,
                        "image stage failed, falling back"
                    );
                }
            }
        }

        warn!(target: "image_generator", product = %product.name, aspect_ratio = %aspect_ratio, "every image stage failed");
        None
    }
}

async fn save_normalized(
    image: DynamicImage,
    aspect_ratio: AspectRatio,
    path: PathBuf,
    quality: u8,
) -> Result<(PathBuf, DynamicImage)> {
    tokio::task::spawn_blocking(move || {
        let (width, height) = aspect_ratio.target_size();
        let resized = if (image.width(), image.height()) == (width, height) {
            DynamicImage::ImageRgb8(image.to_rgb8())
        } else {
            DynamicImage::ImageRgb8(image.resize_to_fill(width, height, FilterType::Lanczos3).to_rgb8())
        };
        write_jpeg(&resized, &path, quality)?;
        Ok((path, resized))
    })
    .await
    .map_err(|err| PipelineError::other(format!("image save task failed: {err}")))?
}

/// Encodes as RGB JPEG; alpha is dropped.
pub fn write_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    let rgb = image.to_rgb8();
    JpegEncoder::new_with_quality(&mut writer, quality).encode_image(&rgb)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing(Arc<AtomicUsize>);

    #[async_trait]
    impl ImageStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn attempt(&self, _ctx: &ImageContext<'_>) -> Result<Option<DynamicImage>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::other("upstream unavailable"))
        }
    }

    struct Skipping;

    #[async_trait]
    impl ImageStrategy for Skipping {
        fn name(&self) -> &'static str {
            "skipping"
        }

        async fn attempt(&self, _ctx: &ImageContext<'_>) -> Result<Option<DynamicImage>> {
            Ok(None)
        }
    }

    fn placeholder() -> Box<dyn ImageStrategy> {
        Box::new(PlaceholderStrategy::new(Arc::new(TextRenderer::bitmap())))
    }

    #[tokio::test]
    async fn failing_network_stages_fall_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let generator = BaseImageGenerator::with_strategies(
            vec![Box::new(Failing(calls.clone())), Box::new(Skipping), placeholder()],
            Arc::new(BrandRegistry::default()),
        );
        let brief = fixtures::brief(&["Trail Watch"]);

        for (index, ratio) in AspectRatio::ALL.into_iter().enumerate() {
            let base = generator
                .generate(&brief, &brief.products[0], ratio, index as u32 + 1, dir.path(), &Cancellation::never())
                .await
                .expect("placeholder always succeeds");

            assert_eq!(base.source, "placeholder");
            assert_eq!((base.image.width(), base.image.height()), ratio.target_size());
            assert!(base.path.exists());

            let on_disk = image::open(&base.path).unwrap();
            assert_eq!((on_disk.width(), on_disk.height()), ratio.target_size());
            let name = base.path.file_name().unwrap().to_str().unwrap().to_string();
            assert!(name.starts_with(&format!("variation{}_generated_", index + 1)));
            assert!(name.ends_with(&format!("_{}.jpg", ratio.slug())));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_chain_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let generator = BaseImageGenerator::with_strategies(
            vec![Box::new(Failing(Arc::new(AtomicUsize::new(0))))],
            Arc::new(BrandRegistry::default()),
        );
        let brief = fixtures::brief(&["Trail Watch"]);
        let result = generator
            .generate(&brief, &brief.products[0], AspectRatio::Square, 1, dir.path(), &Cancellation::never())
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn cancelled_run_produces_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let generator = BaseImageGenerator::with_strategies(
            vec![placeholder()],
            Arc::new(BrandRegistry::default()),
        );
        let brief = fixtures::brief(&["Trail Watch"]);
        let (handle, cancel) = Cancellation::new();
        handle.cancel();

        let result = generator
            .generate(&brief, &brief.products[0], AspectRatio::Square, 1, dir.path(), &cancel)
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn offline_default_chain_still_yields_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.images.stock_images = StockImageTable::new(Vec::new(), "http://127.0.0.1:9/stock.jpg".to_string());
        config.images.download_timeout = std::time::Duration::from_secs(2);

        let generator = BaseImageGenerator::from_config(
            &config,
            reqwest::Client::new(),
            Arc::new(TextRenderer::bitmap()),
            Arc::new(BrandRegistry::default()),
        );
        assert_eq!(generator.strategy_names(), vec!["stock", "placeholder"]);

        let brief = fixtures::brief(&["Trail Watch"]);
        let base = generator
            .generate(&brief, &brief.products[0], AspectRatio::Portrait, 2, dir.path(), &Cancellation::never())
            .await
            .unwrap();
        assert_eq!(base.source, "placeholder");
        assert_eq!((base.image.width(), base.image.height()), (1080, 1920));
    }
}
