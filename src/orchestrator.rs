use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::future::join_all;
use serde_json::{Map, Value, json};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::{
    brand::BrandRegistry,
    capabilities::{
        BaseImageGenerator, Cancellation, MessageTranslator, TextRenderer, VideoComposer,
    },
    compositor::TemplateCompositor,
    config::{AppConfig, DEFAULT_STORAGE_TIMEOUT},
    errors::Result,
    events::{self, EventSender},
    models::{
        AspectRatio, CampaignBrief, CampaignOutput, GeneratedCreative, GeneratedVideo,
        GenerationRequest, GenerationSummary, Product, RunMetrics, VideoFormat, success_rate,
    },
    quality::QualityScorer,
    storage::{ArtifactStore, S3ArtifactStore},
    util::{RecordWriter, now_utc, short_id, slug, slug_or, utc_rfc3339},
};

const BASE_IMAGE_DIR: &str = "_base";
const VIDEO_DIR: &str = "videos";

/// Drives one campaign run: image slots (product × aspect ratio) in parallel
/// under a concurrency cap, then per-product videos, then local records and
/// best-effort remote persistence.
pub struct CampaignOrchestrator {
    images: Arc<BaseImageGenerator>,
    compositor: Arc<TemplateCompositor>,
    scorer: Arc<QualityScorer>,
    videos: Arc<VideoComposer>,
    store: Option<Arc<dyn ArtifactStore>>,
    store_timeout: Duration,
    events: Option<EventSender>,
    output_dir: PathBuf,
    max_concurrency: usize,
}

pub struct OrchestratorBuilder {
    images: Arc<BaseImageGenerator>,
    compositor: Arc<TemplateCompositor>,
    scorer: Arc<QualityScorer>,
    videos: Arc<VideoComposer>,
    store: Option<Arc<dyn ArtifactStore>>,
    store_timeout: Duration,
    events: Option<EventSender>,
    output_dir: PathBuf,
    max_concurrency: usize,
}

impl OrchestratorBuilder {
    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Upper bound for each store call during persistence.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    pub fn build(self) -> CampaignOrchestrator {
        CampaignOrchestrator {
            images: self.images,
            compositor: self.compositor,
            scorer: self.scorer,
            videos: self.videos,
            store: self.store,
            store_timeout: self.store_timeout,
            events: self.events,
            output_dir: self.output_dir,
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Successful image slot plus the stage that produced its base image.
struct SlotSuccess {
    product_index: usize,
    creative: GeneratedCreative,
    source: &'static str,
}

impl CampaignOrchestrator {
    pub fn builder(
        images: BaseImageGenerator,
        compositor: TemplateCompositor,
        scorer: QualityScorer,
        videos: VideoComposer,
    ) -> OrchestratorBuilder {
        let defaults = AppConfig::default();
        OrchestratorBuilder {
            images: Arc::new(images),
            compositor: Arc::new(compositor),
            scorer: Arc::new(scorer),
            videos: Arc::new(videos),
            store: None,
            store_timeout: DEFAULT_STORAGE_TIMEOUT,
            events: None,
            output_dir: defaults.output_dir,
            max_concurrency: defaults.max_concurrency,
        }
    }

    /// Wires every collaborator from configuration. Remote services that have
    /// no credentials are left out of their fallback chains.
    pub async fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::new();
        let renderer = Arc::new(TextRenderer::load(config.template.font_path.as_deref()));
        let brands = Arc::new(BrandRegistry::default());
        let translator = Arc::new(match config.openai.as_ref() {
            Some(openai) => MessageTranslator::with_openai(
                &openai.client(),
                &openai.translation_model,
                openai.request_timeout,
            ),
            None => MessageTranslator::disabled(),
        });

        let images = BaseImageGenerator::from_config(config, http.clone(), renderer.clone(), brands.clone());
        let compositor = TemplateCompositor::new(
            config.template.clone(),
            renderer.clone(),
            translator.clone(),
            brands,
        );
        let scorer = QualityScorer::new(config.quality.clone());
        let videos = VideoComposer::from_config(config, http, renderer, translator);

        let mut builder = Self::builder(images, compositor, scorer, videos)
            .output_dir(config.output_dir.clone())
            .max_concurrency(config.max_concurrency);

        match config.storage.as_ref() {
            Some(storage) => {
                builder = builder
                    .store(Arc::new(S3ArtifactStore::connect(storage).await))
                    .store_timeout(storage.request_timeout);
            }
            None => info!(target: "orchestrator", "no storage bucket configured, outputs stay local"),
        }

        builder.build()
    }

    pub async fn process(&self, request: GenerationRequest) -> Result<CampaignOutput> {
        self.process_with_cancel(request, &Cancellation::never()).await
    }

    /// Fails only for a structurally invalid brief, before any work starts.
    /// Every other failure is isolated to its slot and listed in the summary.
    pub async fn process_with_cancel(
        &self,
        request: GenerationRequest,
        cancel: &Cancellation,
    ) -> Result<CampaignOutput> {
        let started = Instant::now();
        let brief = request.campaign_brief;
        brief.validate()?;

        let campaign_dir = self.output_dir.join(slug_or(&brief.campaign_id, "campaign"));
        let total_expected = brief.total_expected();
        info!(
            target: "orchestrator",
            campaign_id = %brief.campaign_id,
            products = brief.products.len(),
            aspect_ratios = brief.aspect_ratios.len(),
            content_type = ?brief.content_type,
            input_assets = request.input_assets.len(),
            "campaign run started"
        );
        if let Some(sender) = self.events.as_ref() {
            events::campaign_started(sender, &brief.campaign_id, total_expected);
        }

        let mut metrics = RunMetrics {
            total_expected,
            ..RunMetrics::default()
        };
        let mut errors = Vec::new();

        let image_started = Instant::now();
        let mut creatives = Vec::new();
        let mut images_by_product = vec![Vec::new(); brief.products.len()];
        if brief.content_type.includes_images() {
            for outcome in self.run_image_slots(&brief, &campaign_dir, cancel).await {
                match outcome {
                    Ok(success) => {
                        *metrics.image_sources.entry(success.source.to_string()).or_default() += 1;
                        images_by_product[success.product_index].push(success.creative.file_path.clone());
                        creatives.push(success.creative);
                    }
                    Err(message) => {
                        warn!(target: "orchestrator", "{message}");
                        errors.push(message);
                    }
                }
            }
        } else {
            info!(target: "orchestrator", "video-only brief, skipping image slots");
        }
        metrics.image_stage_secs = image_started.elapsed().as_secs_f64();

        let video_started = Instant::now();
        let mut videos = Vec::new();
        if brief.content_type.includes_video() {
            for outcome in self.run_video_slots(&brief, images_by_product, &campaign_dir, cancel).await {
                match outcome {
                    Ok(video) => videos.push(video),
                    Err(message) => {
                        warn!(target: "orchestrator", "{message}");
                        errors.push(message);
                    }
                }
            }
        }
        metrics.video_stage_secs = video_started.elapsed().as_secs_f64();

        let below_threshold = creatives
            .iter()
            .filter(|creative| creative.quality_score < request.quality_threshold)
            .inspect(|creative| {
                info!(
                    target: "orchestrator",
                    product = %creative.product_name,
                    aspect_ratio = %creative.aspect_ratio,
                    score = creative.quality_score,
                    threshold = request.quality_threshold,
                    "creative below quality threshold"
                )
            })
            .count();

        let rate = success_rate(creatives.len(), total_expected);
        let summary = GenerationSummary {
            campaign_id: brief.campaign_id.clone(),
            total_expected,
            total_generated: creatives.len(),
            total_videos: videos.len(),
            success_rate: rate,
            below_threshold,
            errors,
            generated_at: now_utc(),
        };

        metrics.creatives_generated = creatives.len();
        metrics.videos_generated = videos.len();
        metrics.error_count = summary.errors.len();
        metrics.success_rate = rate;
        metrics.average_quality = average(creatives.iter().map(|creative| creative.quality_score));
        metrics.cancelled = cancel.is_cancelled();

        let mut output = CampaignOutput {
            campaign_id: brief.campaign_id.clone(),
            campaign_name: brief.campaign_name.clone(),
            generated_creatives: creatives,
            generated_videos: videos,
            summary,
            output_directory: campaign_dir.clone(),
            metrics,
        };

        let writer = match RecordWriter::new(campaign_dir).await {
            Ok(writer) => Some(writer),
            Err(err) => {
                error!(target: "orchestrator", error = %err, "cannot create campaign directory for records");
                None
            }
        };
        if let Some(writer) = writer.as_ref() {
            if let Err(err) = writer.write_summary(&output.summary).await {
                error!(target: "orchestrator", error = %err, "failed to write generation summary");
            }
        }

        let persistence_started = Instant::now();
        if !cancel.is_cancelled() {
            self.persist(&brief, &mut output, cancel).await;
        }
        output.metrics.cancelled = cancel.is_cancelled();
        output.metrics.persistence_secs = persistence_started.elapsed().as_secs_f64();
        output.metrics.total_secs = started.elapsed().as_secs_f64();

        if let Some(writer) = writer.as_ref() {
            if let Err(err) = writer.write_output(&output).await {
                error!(target: "orchestrator", error = %err, "failed to write campaign output");
            }
        }

        info!(
            target: "orchestrator",
            campaign_id = %output.campaign_id,
            generated = output.summary.total_generated,
            expected = output.summary.total_expected,
            videos = output.summary.total_videos,
            success_rate = output.summary.success_rate,
            errors = output.summary.errors.len(),
            "campaign run completed"
        );
        if let Some(sender) = self.events.as_ref() {
            events::campaign_completed(sender, &output);
        }

        Ok(output)
    }

    async fn run_image_slots(
        &self,
        brief: &CampaignBrief,
        campaign_dir: &Path,
        cancel: &Cancellation,
    ) -> Vec<std::result::Result<SlotSuccess, String>> {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut slots = Vec::new();
        for (product_index, product) in brief.products.iter().enumerate() {
            // Variation numbers follow the requested ratio order, starting at 1.
            for (index, aspect_ratio) in brief.aspect_ratios.iter().copied().enumerate() {
                let permits = permits.clone();
                let variation = index as u32 + 1;
                slots.push(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return Err(slot_label("Failed to generate creative for", product, variation, aspect_ratio));
                    };
                    self.image_slot(brief, product, aspect_ratio, variation, campaign_dir, cancel)
                        .await
                        .map(|(creative, source)| SlotSuccess {
                            product_index,
                            creative,
                            source,
                        })
                });
            }
        }
        join_all(slots).await
    }

    async fn image_slot(
        &self,
        brief: &CampaignBrief,
        product: &Product,
        aspect_ratio: AspectRatio,
        variation: u32,
        campaign_dir: &Path,
        cancel: &Cancellation,
    ) -> std::result::Result<(GeneratedCreative, &'static str), String> {
        if cancel.is_cancelled() {
            return Err(slot_label("Generation cancelled for", product, variation, aspect_ratio));
        }

        let base_dir = campaign_dir.join(BASE_IMAGE_DIR);
        let Some(base) = self
            .images
            .generate(brief, product, aspect_ratio, variation, &base_dir, cancel)
            .await
        else {
            let prefix = if cancel.is_cancelled() {
                "Generation cancelled for"
            } else {
                "Failed to generate base image for"
            };
            return Err(slot_label(prefix, product, variation, aspect_ratio));
        };

        let product_slug = slug(&product.name);
        let file_name = format!(
            "variation{variation}_{product_slug}_{}_{}.jpg",
            aspect_ratio.slug(),
            short_id()
        );
        let creative_path = campaign_dir
            .join(&product_slug)
            .join(aspect_ratio.slug())
            .join(file_name);

        let creative_path = self
            .compositor
            .compose_to_file(&base.image, brief, product, aspect_ratio, &creative_path, cancel)
            .await
            .map_err(|err| {
                format!(
                    "{}: {err}",
                    slot_label("Failed to compose creative for", product, variation, aspect_ratio)
                )
            })?;

        let scorer = self.scorer.clone();
        let (path, scored_brief, scored_product) = (creative_path.clone(), brief.clone(), product.clone());
        let report = tokio::task::spawn_blocking(move || scorer.report(&path, &scored_brief, &scored_product))
            .await
            .map_err(|err| {
                format!(
                    "{}: {err}",
                    slot_label("Failed to score creative for", product, variation, aspect_ratio)
                )
            })?;
        debug!(
            target: "orchestrator",
            product = %product.name,
            aspect_ratio = %aspect_ratio,
            score = report.overall,
            issues = report.issues.len(),
            "creative scored"
        );

        let mut metadata = Map::new();
        metadata.insert("base_image_path".to_string(), json!(base.path));
        metadata.insert("image_source".to_string(), json!(base.source));
        metadata.insert("template_applied".to_string(), Value::Bool(true));
        metadata.insert("generated_at".to_string(), json!(utc_rfc3339(&now_utc())));
        metadata.insert("quality_report".to_string(), json!(report));

        info!(
            target: "orchestrator",
            product = %product.name,
            variation,
            aspect_ratio = %aspect_ratio,
            path = %creative_path.display(),
            "creative generated"
        );

        let creative = GeneratedCreative {
            creative_id: uuid::Uuid::new_v4().to_string(),
            product_name: product.name.clone(),
            aspect_ratio,
            file_path: creative_path,
            campaign_message: brief.campaign_message.clone(),
            quality_score: report.overall,
            variation_num: variation,
            remote_url: None,
            generation_metadata: metadata,
        };
        Ok((creative, base.source))
    }

    async fn run_video_slots(
        &self,
        brief: &CampaignBrief,
        images_by_product: Vec<Vec<PathBuf>>,
        campaign_dir: &Path,
        cancel: &Cancellation,
    ) -> Vec<std::result::Result<GeneratedVideo, String>> {
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let formats = brief.requested_video_formats();
        let mut slots = Vec::new();

        // Grouped by product position, so products sharing a name keep their own images.
        for (product, image_paths) in brief.products.iter().zip(images_by_product) {
            let image_paths = Arc::new(image_paths);
            let video_dir = campaign_dir.join(slug(&product.name)).join(VIDEO_DIR);

            for format in formats.iter().copied() {
                let (permits, image_paths, video_dir) = (permits.clone(), image_paths.clone(), video_dir.clone());
                slots.push(async move {
                    let failed = || video_label(product, format);
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return Err(failed());
                    };
                    if cancel.is_cancelled() {
                        return Err(format!("Video generation cancelled for {} - {format}", product.name));
                    }
                    self.videos
                        .generate(product, brief, &image_paths, format, &video_dir, cancel)
                        .await
                        .filter(|video| video.file_path.exists())
                        .ok_or_else(failed)
                });
            }
        }
        join_all(slots).await
    }

    /// Uploads every artifact, then the brief and the output record. Nothing
    /// here can fail the run: each call is bounded by the store timeout, and
    /// cancellation stops the remaining calls.
    async fn persist(&self, brief: &CampaignBrief, output: &mut CampaignOutput, cancel: &Cancellation) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let interrupted = || {
            let cancelled = cancel.is_cancelled();
            if cancelled {
                info!(target: "orchestrator", "run cancelled, skipping remaining persistence");
            }
            cancelled
        };

        for creative in output.generated_creatives.iter_mut() {
            if interrupted() {
                return;
            }
            creative.remote_url = self
                .bounded_store("creative upload", cancel, store.upload_creative(&brief.campaign_id, creative))
                .await;
        }
        for video in output.generated_videos.iter_mut() {
            if interrupted() {
                return;
            }
            video.remote_url = self
                .bounded_store("video upload", cancel, store.upload_video(&brief.campaign_id, video))
                .await;
        }

        if interrupted() {
            return;
        }
        let stored_brief = self.bounded_store("brief", cancel, store.store_brief(brief)).await;
        if interrupted() {
            return;
        }
        let stored_output = self.bounded_store("output record", cancel, store.store_output(output)).await;
        debug!(
            target: "orchestrator",
            brief = ?stored_brief,
            output = ?stored_output,
            "persistence finished"
        );
    }

    async fn bounded_store<F>(&self, what: &str, cancel: &Cancellation, call: F) -> Option<String>
    where
        F: Future<Output = Option<String>>,
    {
        match tokio::time::timeout(self.store_timeout, cancel.guard(call)).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                debug!(target: "orchestrator", what, "store call cancelled");
                None
            }
            Err(_) => {
                warn!(
                    target: "orchestrator",
                    what,
                    timeout_secs = self.store_timeout.as_secs_f64(),
                    "store call timed out"
                );
                None
            }
        }
    }
}

fn slot_label(prefix: &str, product: &Product, variation: u32, aspect_ratio: AspectRatio) -> String {
    format!("{prefix} {} - Variation {variation} - {aspect_ratio}", product.name)
}

fn video_label(product: &Product, format: VideoFormat) -> String {
    format!("Failed to generate video for {} - {format}", product.name)
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}
