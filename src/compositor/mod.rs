mod layers;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{DynamicImage, RgbaImage};
use tracing::{debug, warn};

use crate::{
    brand::BrandRegistry,
    capabilities::{Cancellation, MessageTranslator, TextRenderer, image::write_jpeg},
    config::TemplateSettings,
    errors::{PipelineError, Result},
    models::{AspectRatio, CampaignBrief, Product},
};

use layers::TextBlock;

/// Brand template overlay: enhancement, scrim and border, text, brand mark.
///
/// Every stage runs on its own copy of the canvas; a failing stage is logged
/// and the image from the previous stage carries on, so `compose` always
/// returns an image.
pub struct TemplateCompositor {
    settings: TemplateSettings,
    renderer: Arc<TextRenderer>,
    translator: Arc<MessageTranslator>,
    brands: Arc<BrandRegistry>,
}

/// Inputs resolved before the CPU-bound stages run off the async runtime.
struct Plan {
    title: String,
    message: String,
    fill: [u8; 3],
    outline: [u8; 3],
    logo: Option<PathBuf>,
    aspect_ratio: AspectRatio,
}

impl TemplateCompositor {
    pub fn new(
        settings: TemplateSettings,
        renderer: Arc<TextRenderer>,
        translator: Arc<MessageTranslator>,
        brands: Arc<BrandRegistry>,
    ) -> Self {
        Self {
            settings,
            renderer,
            translator,
            brands,
        }
    }

    pub async fn compose(
        &self,
        base: &DynamicImage,
        brief: &CampaignBrief,
        product: &Product,
        aspect_ratio: AspectRatio,
        cancel: &Cancellation,
    ) -> DynamicImage {
        let plan = self.plan(brief, product, aspect_ratio, cancel).await;
        let settings = self.settings.clone();
        let renderer = self.renderer.clone();
        let canvas = base.to_rgba8();

        match tokio::task::spawn_blocking(move || render(canvas, &plan, &settings, &renderer)).await {
            Ok(image) => layers::into_dynamic(image),
            Err(err) => {
                warn!(target: "compositor", error = %err, "compositing task failed, keeping base image");
                base.clone()
            }
        }
    }

    /// Composes and writes the creative as JPEG at `output_path`.
    #[allow(clippy::too_many_arguments)]
    pub async fn compose_to_file(
        &self,
        base: &DynamicImage,
        brief: &CampaignBrief,
        product: &Product,
        aspect_ratio: AspectRatio,
        output_path: &Path,
        cancel: &Cancellation,
    ) -> Result<PathBuf> {
        let composed = self.compose(base, brief, product, aspect_ratio, cancel).await;
        let path = output_path.to_path_buf();
        let quality = self.settings.jpeg_quality;

        tokio::task::spawn_blocking(move || write_jpeg(&composed, &path, quality).map(|_| path))
            .await
            .map_err(|err| PipelineError::other(format!("creative write task failed: {err}")))?
    }

    async fn plan(
        &self,
        brief: &CampaignBrief,
        product: &Product,
        aspect_ratio: AspectRatio,
        cancel: &Cancellation,
    ) -> Plan {
        let (fill, outline) = match self.brands.palette_for(brief) {
            Some(palette) => {
                debug!(target: "compositor", brand = ?brief.asset_params().and_then(|p| p.brand.as_deref()), "applying brand palette to text");
                (palette.secondary, palette.primary)
            }
            None => (self.settings.text_color, self.settings.outline_color),
        };

        let message = if brief.is_english() {
            brief.campaign_message.clone()
        } else {
            self.translator
                .translate(&brief.campaign_message, &brief.language, cancel)
                .await
        };

        let logo = brief
            .asset_params()
            .and_then(|params| params.selected_brand_logo.clone())
            .filter(|path| path.exists());

        Plan {
            title: product.name.clone(),
            message,
            fill,
            outline,
            logo,
            aspect_ratio,
        }
    }
}

fn stage(
    name: &'static str,
    current: RgbaImage,
    apply: impl FnOnce(&mut RgbaImage) -> Result<()>,
) -> RgbaImage {
    let mut working = current.clone();
    match apply(&mut working) {
        Ok(()) => working,
        Err(err) => {
            warn!(target: "compositor", stage = name, error = %err, "template stage failed, keeping previous image");
            current
        }
    }
}

fn render(
    canvas: RgbaImage,
    plan: &Plan,
    settings: &TemplateSettings,
    renderer: &TextRenderer,
) -> RgbaImage {
    let palette = settings.palette;

    let canvas = stage("enhance", canvas, |image| {
        *image = layers::enhance(image);
        Ok(())
    });

    let canvas = stage("overlay", canvas, |image| {
        if plan.aspect_ratio == AspectRatio::Portrait {
            layers::scrim(image, palette.primary);
        }
        layers::border(image, palette.accent, settings.border_width);
        Ok(())
    });

    let canvas = stage("text", canvas, |image| {
        let block = TextBlock {
            title: &plan.title,
            message: &plan.message,
            fill: plan.fill,
            outline: plan.outline,
        };
        layers::text_blocks(image, renderer, &block, plan.aspect_ratio)
    });

    stage("brand", canvas, |image| match plan.logo.as_deref() {
        Some(logo) => layers::logo(image, logo, plan.aspect_ratio),
        None => {
            layers::brand_indicator(image, renderer, palette.accent, palette.primary);
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetParams, fixtures};
    use image::{Rgb, RgbImage, Rgba};

    fn compositor() -> TemplateCompositor {
        TemplateCompositor::new(
            TemplateSettings::default(),
            Arc::new(TextRenderer::bitmap()),
            Arc::new(MessageTranslator::disabled()),
            Arc::new(BrandRegistry::default()),
        )
    }

    fn base(ratio: AspectRatio) -> DynamicImage {
        let (w, h) = ratio.target_size();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([40, 40, 40])))
    }

    #[tokio::test]
    async fn composed_image_keeps_size_and_draws_border_and_mark() {
        let brief = fixtures::brief(&["Trail Watch"]);
        let compositor = compositor();

        for ratio in AspectRatio::ALL {
            let image = compositor
                .compose(&base(ratio), &brief, &brief.products[0], ratio, &Cancellation::never())
                .await
                .to_rgba8();
            assert_eq!(image.dimensions(), ratio.target_size());
            assert_eq!(image.get_pixel(0, 0).0, [255, 215, 0, 255]);

            assert!(image.pixels().any(|p| p.0 == [255, 255, 255, 255]));

            // Indicator fill, above the "BRAND" label.
            let size = image.width().min(image.height()) / 20;
            let center_x = image.width() - size - 20 + size / 2;
            assert_eq!(image.get_pixel(center_x, 28).0, [255, 215, 0, 255]);
        }
    }

    #[tokio::test]
    async fn known_brand_recolors_text() {
        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.asset_params = Some(AssetParams {
            brand: Some("Coca-Cola".to_string()),
            ..Default::default()
        });
        let compositor = compositor();
        let plan = compositor
            .plan(&brief, &brief.products[0], AspectRatio::Square, &Cancellation::never())
            .await;
        assert_eq!(plan.fill, [255, 255, 255]);
        assert_eq!(plan.outline, [255, 0, 0]);

        let brief = fixtures::brief(&["Trail Watch"]);
        let plan = compositor
            .plan(&brief, &brief.products[0], AspectRatio::Square, &Cancellation::never())
            .await;
        assert_eq!(plan.outline, [0, 0, 0]);
    }

    fn translating_compositor(entries: &[(&str, &str)]) -> TemplateCompositor {
        TemplateCompositor::new(
            TemplateSettings::default(),
            Arc::new(TextRenderer::bitmap()),
            Arc::new(MessageTranslator::fixed(entries)),
            Arc::new(BrandRegistry::default()),
        )
    }

    #[tokio::test]
    async fn non_english_message_is_translated_before_rendering() {
        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.language = "es".to_string();
        let translated = "Prepárate para tu mejor verano con nuestra nueva línea";
        let compositor = translating_compositor(&[(brief.campaign_message.as_str(), translated)]);

        let plan = compositor
            .plan(&brief, &brief.products[0], AspectRatio::Square, &Cancellation::never())
            .await;
        assert_eq!(plan.message, translated);
        assert_eq!(plan.title, "Trail Watch");
    }

    #[tokio::test]
    async fn failed_translation_keeps_original_message() {
        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.language = "fr".to_string();
        let compositor = translating_compositor(&[("Some other text", "Un autre texte")]);

        let plan = compositor
            .plan(&brief, &brief.products[0], AspectRatio::Portrait, &Cancellation::never())
            .await;
        assert_eq!(plan.message, brief.campaign_message);
    }

    #[tokio::test]
    async fn english_brief_skips_translation() {
        let brief = fixtures::brief(&["Trail Watch"]);
        let compositor = translating_compositor(&[(brief.campaign_message.as_str(), "Hola")]);

        let plan = compositor
            .plan(&brief, &brief.products[0], AspectRatio::Square, &Cancellation::never())
            .await;
        assert_eq!(plan.message, brief.campaign_message);
    }

    #[tokio::test]
    async fn missing_logo_falls_back_to_indicator() {
        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.asset_params = Some(AssetParams {
            selected_brand_logo: Some(PathBuf::from("/nonexistent/logo.png")),
            ..Default::default()
        });
        let compositor = compositor();
        let plan = compositor
            .plan(&brief, &brief.products[0], AspectRatio::Square, &Cancellation::never())
            .await;
        assert!(plan.logo.is_none());
    }

    #[tokio::test]
    async fn logo_is_pasted_at_square_corner() {
        let dir = tempfile::tempdir().unwrap();
        let logo_path = dir.path().join("logo.png");
        RgbaImage::from_pixel(200, 200, Rgba([0, 200, 0, 255]))
            .save(&logo_path)
            .unwrap();

        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.asset_params = Some(AssetParams {
            selected_brand_logo: Some(logo_path),
            ..Default::default()
        });

        let image = compositor()
            .compose(
                &base(AspectRatio::Square),
                &brief,
                &brief.products[0],
                AspectRatio::Square,
                &Cancellation::never(),
            )
            .await
            .to_rgba8();

        // 1080 / 8 = 135px logo, 20px margin from the bottom-right corner.
        let pixel = image.get_pixel(1080 - 20 - 135 / 2, 1080 - 20 - 135 / 2);
        assert!(pixel[0] < 10 && pixel[1] > 190 && pixel[2] < 10, "{pixel:?}");
    }

    #[tokio::test]
    async fn compose_to_file_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let brief = fixtures::brief(&["Trail Watch"]);
        let out = dir.path().join("nested").join("creative.jpg");
        let path = compositor()
            .compose_to_file(
                &base(AspectRatio::Landscape),
                &brief,
                &brief.products[0],
                AspectRatio::Landscape,
                &out,
                &Cancellation::never(),
            )
            .await
            .unwrap();
        let reopened = image::open(path).unwrap();
        assert_eq!((reopened.width(), reopened.height()), (1920, 1080));
    }

    #[test]
    fn failing_stage_keeps_previous_image() {
        let original = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let result = stage("broken", original.clone(), |image| {
            image.put_pixel(0, 0, Rgba([9, 9, 9, 255]));
            Err(PipelineError::other("boom"))
        });
        assert_eq!(result, original);
    }
}
