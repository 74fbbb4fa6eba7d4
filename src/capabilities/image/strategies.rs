use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use image::{DynamicImage, Rgba, RgbaImage};
use reqwest::multipart::{Form, Part};
use rig::{
    client::ImageGenerationClient, image_generation::ImageGenerationModel, providers::openai,
};
use serde::Deserialize;
use tracing::debug;

use super::{ImageContext, ImageStrategy};
use crate::{
    capabilities::TextRenderer,
    config::OpenAiConfig,
    errors::{PipelineError, Result},
    models::AspectRatio,
};

pub const PLACEHOLDER_COLOR: [u8; 3] = [70, 130, 180];

/// Awaits `fut` under both a timeout and the run's cancellation signal.
async fn bounded<F, T>(ctx: &ImageContext<'_>, timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = T>,
{
    match tokio::time::timeout(timeout, ctx.cancel.guard(fut)).await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(PipelineError::Cancelled),
        Err(_) => Err(PipelineError::other(format!(
            "{what} timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

/// Primary text-to-image call through rig's OpenAI image generation model.
pub struct OpenAiImageStrategy {
    model: openai::image_generation::ImageGenerationModel,
    model_name: String,
    timeout: Duration,
}

impl OpenAiImageStrategy {
    pub fn new(client: &openai::Client, model_name: &str, timeout: Duration) -> Self {
        Self {
            model: client.image_generation_model(model_name),
            model_name: model_name.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ImageStrategy for OpenAiImageStrategy {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn attempt(&self, ctx: &ImageContext<'_>) -> Result<Option<DynamicImage>> {
        let (width, height) = ctx.aspect_ratio.generation_size();
        debug!(
            target: "image_generator",
            model = %self.model_name,
            width,
            height,
            "requesting generated image"
        );

        let request = self
            .model
            .image_generation_request()
            .prompt(ctx.prompt)
            .width(width)
            .height(height)
            .send();

        let response = bounded(ctx, self.timeout, "image generation", request).await??;
        Ok(Some(image::load_from_memory(&response.image)?))
    }
}

/// Image-edit call conditioned on the brief's avatar, for portrait slots only.
pub struct AvatarEditStrategy {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl AvatarEditStrategy {
    pub fn new(http: reqwest::Client, config: &OpenAiConfig) -> Self {
        Self {
            http,
            endpoint: format!("{}/images/edits", config.api_base()),
            api_key: config.api_key.clone(),
            model: config.edit_model.clone(),
            timeout: config.request_timeout,
        }
    }

    async fn request(&self, ctx: &ImageContext<'_>, avatar: &Path) -> Result<Vec<u8>> {
        let avatar_bytes = tokio::fs::read(avatar).await?;
        let file_name = avatar
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("avatar.png")
            .to_string();

        let form = Form::new()
            .text("model", self.model.clone())
            .text("prompt", ctx.prompt.to_string())
            .part(
                "image",
                Part::bytes(avatar_bytes)
                    .file_name(file_name)
                    .mime_str(mime_for(avatar))?,
            );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::other(format!(
                "image edit returned status {status}: {body}"
            )));
        }

        let payload = response.json::<ImagesResponse>().await?;
        let datum = payload
            .data
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::unsupported("image edit response has no data"))?;

        if let Some(b64) = datum.b64_json {
            return BASE64_STANDARD
                .decode(b64)
                .map_err(|err| PipelineError::other(format!("invalid base64 image: {err}")));
        }
        if let Some(url) = datum.url {
            return Ok(self
                .http
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?
                .to_vec());
        }

        Err(PipelineError::unsupported(
            "image edit response is missing b64_json and url",
        ))
    }
}

#[async_trait]
impl ImageStrategy for AvatarEditStrategy {
    fn name(&self) -> &'static str {
        "avatar_edit"
    }

    async fn attempt(&self, ctx: &ImageContext<'_>) -> Result<Option<DynamicImage>> {
        if ctx.aspect_ratio != AspectRatio::Portrait {
            return Ok(None);
        }
        let Some(avatar) = ctx
            .brief
            .asset_params()
            .and_then(|params| params.selected_avatar.as_deref())
        else {
            return Ok(None);
        };

        let bytes = bounded(ctx, self.timeout, "avatar image edit", self.request(ctx, avatar)).await??;
        Ok(Some(image::load_from_memory(&bytes)?))
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Keyword to stock photo lookup. Keywords are matched as substrings of the
/// lowercased product name, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct StockImageTable {
    entries: Vec<(String, String)>,
    default_url: String,
}

impl Default for StockImageTable {
    fn default() -> Self {
        let entries = [
            ("smartphone", "https://images.unsplash.com/photo-1511707171634-5f897ff02aa9?w=800"),
            ("laptop", "https://images.unsplash.com/photo-1496181133206-80ce9b88a853?w=800"),
            ("headphones", "https://images.unsplash.com/photo-1505740420928-5e560c06d30e?w=800"),
            ("watch", "https://images.unsplash.com/photo-1523275335684-37898b6baf30?w=800"),
            ("camera", "https://images.unsplash.com/photo-1502920917128-1aa500764cbd?w=800"),
        ];
        Self::new(
            entries
                .into_iter()
                .map(|(keyword, url)| (keyword.to_string(), url.to_string()))
                .collect(),
            "https://images.unsplash.com/photo-1560472354-b33ff0c44a43?w=800".to_string(),
        )
    }
}

impl StockImageTable {
    pub fn new(entries: Vec<(String, String)>, default_url: String) -> Self {
        Self {
            entries,
            default_url,
        }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    pub fn lookup(&self, product_name: &str) -> &str {
        let name = product_name.to_lowercase();
        self.entries
            .iter()
            .find(|(keyword, _)| name.contains(keyword.as_str()))
            .map(|(_, url)| url.as_str())
            .unwrap_or(&self.default_url)
    }
}

pub struct StockImageStrategy {
    http: reqwest::Client,
    table: StockImageTable,
    timeout: Duration,
}

impl StockImageStrategy {
    pub fn new(http: reqwest::Client, table: StockImageTable, timeout: Duration) -> Self {
        Self {
            http,
            table,
            timeout,
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ImageStrategy for StockImageStrategy {
    fn name(&self) -> &'static str {
        "stock"
    }

    async fn attempt(&self, ctx: &ImageContext<'_>) -> Result<Option<DynamicImage>> {
        let url = self.table.lookup(&ctx.product.name);
        debug!(target: "image_generator", %url, "downloading stock image");
        let bytes = bounded(ctx, self.timeout, "stock image download", self.download(url)).await??;
        Ok(Some(image::load_from_memory(&bytes)?))
    }
}

/// Flat-color card with the product name centered; never touches the network.
pub struct PlaceholderStrategy {
    renderer: Arc<TextRenderer>,
}

impl PlaceholderStrategy {
    pub fn new(renderer: Arc<TextRenderer>) -> Self {
        Self { renderer }
    }

    pub fn render(&self, product_name: &str, aspect_ratio: AspectRatio) -> DynamicImage {
        let (width, height) = aspect_ratio.target_size();
        let [r, g, b] = PLACEHOLDER_COLOR;
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));

        let font_size = (width.min(height) / 20) as f32;
        let (text_width, text_height) = self.renderer.measure(product_name, font_size);
        let x = (width as i32 - text_width as i32) / 2;
        let y = (height as i32 - text_height as i32) / 2;

        self.renderer.draw_outlined(
            &mut canvas,
            product_name,
            x,
            y,
            font_size,
            Rgba([255, 255, 255, 255]),
            Rgba([0, 0, 0, 255]),
            2,
        );

        DynamicImage::ImageRgba8(canvas)
    }
}

#[async_trait]
impl ImageStrategy for PlaceholderStrategy {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn attempt(&self, ctx: &ImageContext<'_>) -> Result<Option<DynamicImage>> {
        Ok(Some(self.render(&ctx.product.name, ctx.aspect_ratio)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capabilities::Cancellation,
        models::{AssetParams, CampaignBrief, fixtures},
    };
    use image::GenericImageView;

    #[test]
    fn stock_lookup_matches_keywords_in_order() {
        let table = StockImageTable::default();
        assert!(table.lookup("Pro Smartphone X").contains("1511707171634"));
        assert!(table.lookup("Camera Watch").contains("1523275335684"));
        assert_eq!(table.lookup("Garden Hose"), table.default_url());
    }

    #[test]
    fn placeholder_has_exact_target_size() {
        let placeholder = PlaceholderStrategy::new(Arc::new(TextRenderer::bitmap()));
        for ratio in AspectRatio::ALL {
            let image = placeholder.render("Trail Watch", ratio);
            assert_eq!(image.dimensions(), ratio.target_size());
        }
    }

    #[test]
    fn placeholder_draws_name_over_background() {
        let placeholder = PlaceholderStrategy::new(Arc::new(TextRenderer::bitmap()));
        let image = placeholder.render("Trail Watch", AspectRatio::Square).to_rgba8();
        let [r, g, b] = PLACEHOLDER_COLOR;
        assert_eq!(image.get_pixel(0, 0).0, [r, g, b, 255]);
        assert!(image.pixels().any(|p| p.0 == [255, 255, 255, 255]));
    }

    fn avatar_strategy() -> AvatarEditStrategy {
        // Nothing listens on the discard port, so a request would fail loudly.
        AvatarEditStrategy::new(
            reqwest::Client::new(),
            &OpenAiConfig {
                api_key: "sk-test".to_string(),
                base_url: Some("http://127.0.0.1:9/v1".to_string()),
                image_model: "dall-e-3".to_string(),
                edit_model: "gpt-image-1".to_string(),
                translation_model: "gpt-3.5-turbo".to_string(),
                request_timeout: Duration::from_secs(5),
            },
        )
    }

    async fn attempt_avatar(brief: &CampaignBrief, aspect_ratio: AspectRatio) -> Result<Option<DynamicImage>> {
        let cancel = Cancellation::never();
        let ctx = ImageContext {
            brief,
            product: &brief.products[0],
            aspect_ratio,
            variation: 1,
            prompt: "a watch on a trail",
            cancel: &cancel,
        };
        avatar_strategy().attempt(&ctx).await
    }

    #[tokio::test]
    async fn avatar_edit_skips_non_portrait_ratios() {
        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.asset_params = Some(AssetParams {
            selected_avatar: Some("/nonexistent/avatar.png".into()),
            ..Default::default()
        });

        for ratio in [AspectRatio::Square, AspectRatio::Landscape] {
            assert!(matches!(attempt_avatar(&brief, ratio).await, Ok(None)), "{ratio}");
        }
    }

    #[tokio::test]
    async fn avatar_edit_needs_a_selected_avatar() {
        let mut brief = fixtures::brief(&["Trail Watch"]);
        assert!(matches!(attempt_avatar(&brief, AspectRatio::Portrait).await, Ok(None)));

        brief.asset_params = Some(AssetParams {
            brand: Some("Nike".to_string()),
            ..Default::default()
        });
        assert!(matches!(attempt_avatar(&brief, AspectRatio::Portrait).await, Ok(None)));
    }

    #[tokio::test]
    async fn avatar_edit_runs_for_portrait_with_avatar() {
        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.asset_params = Some(AssetParams {
            selected_avatar: Some("/nonexistent/avatar.png".into()),
            ..Default::default()
        });
        // The stage applies, so the unreadable avatar surfaces as an error.
        assert!(attempt_avatar(&brief, AspectRatio::Portrait).await.is_err());
    }

    #[test]
    fn avatar_mime_by_extension() {
        assert_eq!(mime_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_for(Path::new("a")), "image/png");
    }
}
