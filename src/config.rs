use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow};
use rig::providers::openai;
use serde::Deserialize;

use crate::{
    brand::BrandPalette,
    capabilities::{StockImageTable, VideoSpec},
    models::{CampaignBrief, DEFAULT_QUALITY_THRESHOLD, GenerationRequest},
};

const DEFAULT_CONFIG_PATH: &str = "config/app_config.toml";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_EDIT_MODEL: &str = "gpt-image-1";
const DEFAULT_TRANSLATION_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_VEO_MODEL: &str = "veo-3.0-generate-preview";
const DEFAULT_VEO_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_STORAGE_PREFIX: &str = "campaigns";
const DEFAULT_STORAGE_REGION: &str = "us-east-1";
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub image_model: String,
    /// Model used by the avatar-conditioned image edit call.
    pub edit_model: String,
    pub translation_model: String,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub fn api_base(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
    }

    pub fn client(&self) -> openai::Client {
        let mut builder = openai::Client::builder(&self.api_key);
        if let Some(base_url) = self.base_url.as_deref() {
            builder = builder.base_url(base_url);
        }
        builder.build().expect("Failed to build OpenAI client")
    }
}

#[derive(Clone, Debug)]
pub struct VeoConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub request_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ImageSettings {
    pub stock_images: StockImageTable,
    pub download_timeout: Duration,
    pub jpeg_quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            stock_images: StockImageTable::default(),
            download_timeout: Duration::from_secs(30),
            jpeg_quality: 95,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VideoSettings {
    /// Clip shape produced by the local fallback renderer.
    pub spec: VideoSpec,
    pub ffmpeg_path: PathBuf,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            spec: VideoSpec::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TemplateSettings {
    pub font_path: Option<PathBuf>,
    pub palette: BrandPalette,
    pub text_color: [u8; 3],
    pub outline_color: [u8; 3],
    pub border_width: u32,
    pub jpeg_quality: u8,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            font_path: None,
            palette: BrandPalette::default(),
            text_color: [255, 255, 255],
            outline_color: [0, 0, 0],
            border_width: 4,
            jpeg_quality: 95,
        }
    }
}

#[derive(Clone, Debug)]
pub struct QualitySettings {
    pub max_file_size: u64,
    pub min_width: u32,
    pub min_height: u32,
    pub brand_colors: Vec<[u8; 3]>,
    pub color_tolerance: f64,
    pub prohibited_words: Vec<String>,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            min_width: 800,
            min_height: 800,
            brand_colors: BrandPalette::default().colors().to_vec(),
            color_tolerance: 100.0,
            prohibited_words: ["free", "win", "winner", "prize", "contest", "sweepstakes"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub prefix: String,
    pub endpoint_url: Option<String>,
    /// Upper bound for a single store call.
    pub request_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub max_concurrency: usize,
    pub quality_threshold: f64,
    pub openai: Option<OpenAiConfig>,
    pub veo: Option<VeoConfig>,
    pub images: ImageSettings,
    pub video: VideoSettings,
    pub template: TemplateSettings,
    pub quality: QualitySettings,
    pub storage: Option<StorageConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            openai: None,
            veo: None,
            images: ImageSettings::default(),
            video: VideoSettings::default(),
            template: TemplateSettings::default(),
            quality: QualitySettings::default(),
            storage: None,
        }
    }
}

impl AppConfig {
    /// Reads `APP_CONFIG_PATH` (default `config/app_config.toml`). A missing
    /// file is not an error; environment variables fill remaining gaps.
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            env::var("APP_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config_path = Path::new(&config_path);

        let file_config = if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .with_context(|| format!("failed to read config file {:?}", config_path))?;
            Self::parse_file(&contents)
                .with_context(|| format!("failed to parse config file {:?}", config_path))?
        } else {
            FileConfig::default()
        };

        file_config.into_domain(&EnvOverrides::from_env())
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        Self::parse_file(contents)?.into_domain(&EnvOverrides::default())
    }

    /// Request for `brief` at the configured quality threshold. An explicit
    /// `threshold` wins and is clamped to [0, 1].
    pub fn generation_request(&self, brief: CampaignBrief, threshold: Option<f64>) -> GenerationRequest {
        let mut request = GenerationRequest::new(brief);
        request.quality_threshold = threshold
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(self.quality_threshold);
        request
    }

    fn parse_file(contents: &str) -> anyhow::Result<FileConfig> {
        Ok(toml::from_str(contents)?)
    }
}

#[derive(Debug, Default)]
struct EnvOverrides {
    openai_api_key: Option<String>,
    google_api_key: Option<String>,
    output_dir: Option<String>,
    s3_bucket: Option<String>,
    s3_region: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|value| !value.trim().is_empty());
        Self {
            openai_api_key: var("OPENAI_API_KEY"),
            google_api_key: var("GOOGLE_AI_API_KEY"),
            output_dir: var("OUTPUT_DIR"),
            s3_bucket: var("S3_BUCKET_NAME"),
            s3_region: var("S3_REGION").or_else(|| var("AWS_DEFAULT_REGION")),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    output_dir: Option<String>,
    #[serde(default)]
    max_concurrency: Option<usize>,
    #[serde(default)]
    quality_threshold: Option<f64>,
    #[serde(default)]
    openai: Option<FileOpenAiConfig>,
    #[serde(default)]
    veo: Option<FileVeoConfig>,
    #[serde(default)]
    images: Option<FileImageConfig>,
    #[serde(default)]
    video: Option<FileVideoConfig>,
    #[serde(default)]
    template: Option<FileTemplateConfig>,
    #[serde(default)]
    quality: Option<FileQualityConfig>,
    #[serde(default)]
    storage: Option<FileStorageConfig>,
}

impl FileConfig {
    fn into_domain(self, env: &EnvOverrides) -> anyhow::Result<AppConfig> {
        let output_dir = self
            .output_dir
            .or_else(|| env.output_dir.clone())
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        let max_concurrency = self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY);
        if max_concurrency == 0 {
            return Err(anyhow!("max_concurrency must be at least 1"));
        }

        let quality_threshold = self.quality_threshold.unwrap_or(DEFAULT_QUALITY_THRESHOLD);
        if !(0.0..=1.0).contains(&quality_threshold) {
            return Err(anyhow!(
                "quality_threshold must be within [0, 1], got {quality_threshold}"
            ));
        }

        let template = self
            .template
            .unwrap_or_default()
            .into_domain()
            .context("invalid [template] section")?;

        Ok(AppConfig {
            output_dir: PathBuf::from(output_dir),
            max_concurrency,
            quality_threshold,
            openai: self.openai.unwrap_or_default().into_domain(env),
            veo: self.veo.unwrap_or_default().into_domain(env),
            images: self.images.unwrap_or_default().into_domain(),
            video: self.video.unwrap_or_default().into_domain(),
            quality: self.quality.unwrap_or_default().into_domain(&template),
            template,
            storage: self.storage.unwrap_or_default().into_domain(env),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileOpenAiConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    image_model: Option<String>,
    #[serde(default)]
    edit_model: Option<String>,
    #[serde(default)]
    translation_model: Option<String>,
    #[serde(default)]
    request_timeout_seconds: Option<u64>,
}

impl FileOpenAiConfig {
    fn into_domain(self, env: &EnvOverrides) -> Option<OpenAiConfig> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env.openai_api_key.clone())?;

        Some(OpenAiConfig {
            api_key,
            base_url: self.base_url,
            image_model: self
                .image_model
                .unwrap_or_else(|| openai::DALL_E_3.to_string()),
            edit_model: self
                .edit_model
                .unwrap_or_else(|| DEFAULT_EDIT_MODEL.to_string()),
            translation_model: self
                .translation_model
                .unwrap_or_else(|| DEFAULT_TRANSLATION_MODEL.to_string()),
            request_timeout: Duration::from_secs(self.request_timeout_seconds.unwrap_or(60).max(1)),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileVeoConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    poll_interval_seconds: Option<u64>,
    #[serde(default)]
    max_wait_seconds: Option<u64>,
    #[serde(default)]
    request_timeout_seconds: Option<u64>,
}

impl FileVeoConfig {
    fn into_domain(self, env: &EnvOverrides) -> Option<VeoConfig> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env.google_api_key.clone())?;

        Some(VeoConfig {
            api_key,
            model: self.model.unwrap_or_else(|| DEFAULT_VEO_MODEL.to_string()),
            endpoint: self
                .endpoint
                .unwrap_or_else(|| DEFAULT_VEO_ENDPOINT.to_string()),
            poll_interval: Duration::from_secs(self.poll_interval_seconds.unwrap_or(10).max(1)),
            max_wait: Duration::from_secs(self.max_wait_seconds.unwrap_or(600)),
            request_timeout: Duration::from_secs(self.request_timeout_seconds.unwrap_or(60).max(1)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FileStockImage {
    keyword: String,
    url: String,
}

#[derive(Debug, Deserialize, Default)]
struct FileImageConfig {
    #[serde(default)]
    stock: Option<Vec<FileStockImage>>,
    #[serde(default)]
    stock_default_url: Option<String>,
    #[serde(default)]
    download_timeout_seconds: Option<u64>,
    #[serde(default)]
    jpeg_quality: Option<u8>,
}

impl FileImageConfig {
    fn into_domain(self) -> ImageSettings {
        let defaults = ImageSettings::default();

        let stock_images = match (self.stock, self.stock_default_url) {
            (None, None) => defaults.stock_images,
            (entries, default_url) => {
                let base = StockImageTable::default();
                let entries = entries
                    .map(|entries| {
                        entries
                            .into_iter()
                            .map(|entry| (entry.keyword.to_lowercase(), entry.url))
                            .collect()
                    })
                    .unwrap_or_else(|| base.entries().to_vec());
                StockImageTable::new(
                    entries,
                    default_url.unwrap_or_else(|| base.default_url().to_string()),
                )
            }
        };

        ImageSettings {
            stock_images,
            download_timeout: self
                .download_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.download_timeout),
            jpeg_quality: self.jpeg_quality.unwrap_or(defaults.jpeg_quality).clamp(1, 100),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileVideoConfig {
    #[serde(default)]
    duration_seconds: Option<u32>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    fps: Option<u32>,
    #[serde(default)]
    ffmpeg_path: Option<String>,
}

impl FileVideoConfig {
    fn into_domain(self) -> VideoSettings {
        let defaults = VideoSettings::default();
        VideoSettings {
            spec: VideoSpec {
                duration_secs: self
                    .duration_seconds
                    .unwrap_or(defaults.spec.duration_secs)
                    .max(1),
                width: self.width.unwrap_or(defaults.spec.width).max(16),
                height: self.height.unwrap_or(defaults.spec.height).max(16),
                fps: self.fps.unwrap_or(defaults.spec.fps).max(1),
            },
            ffmpeg_path: self
                .ffmpeg_path
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileTemplateConfig {
    #[serde(default)]
    font_path: Option<String>,
    #[serde(default)]
    primary_color: Option<String>,
    #[serde(default)]
    secondary_color: Option<String>,
    #[serde(default)]
    accent_color: Option<String>,
    #[serde(default)]
    text_color: Option<String>,
    #[serde(default)]
    outline_color: Option<String>,
    #[serde(default)]
    border_width: Option<u32>,
    #[serde(default)]
    jpeg_quality: Option<u8>,
}

impl FileTemplateConfig {
    fn into_domain(self) -> anyhow::Result<TemplateSettings> {
        let defaults = TemplateSettings::default();
        let color = |value: Option<String>, fallback: [u8; 3], field: &str| match value {
            Some(value) => parse_hex(&value)
                .ok_or_else(|| anyhow!("template.{field} is not a #rrggbb color: {value}")),
            None => Ok(fallback),
        };

        Ok(TemplateSettings {
            font_path: self.font_path.map(PathBuf::from),
            palette: BrandPalette {
                primary: color(self.primary_color, defaults.palette.primary, "primary_color")?,
                secondary: color(
                    self.secondary_color,
                    defaults.palette.secondary,
                    "secondary_color",
                )?,
                accent: color(self.accent_color, defaults.palette.accent, "accent_color")?,
            },
            text_color: color(self.text_color, defaults.text_color, "text_color")?,
            outline_color: color(self.outline_color, defaults.outline_color, "outline_color")?,
            border_width: self.border_width.unwrap_or(defaults.border_width),
            jpeg_quality: self.jpeg_quality.unwrap_or(defaults.jpeg_quality).clamp(1, 100),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileQualityConfig {
    #[serde(default)]
    max_file_size_bytes: Option<u64>,
    #[serde(default)]
    min_width: Option<u32>,
    #[serde(default)]
    min_height: Option<u32>,
    #[serde(default)]
    color_tolerance: Option<f64>,
    #[serde(default)]
    prohibited_words: Option<Vec<String>>,
}

impl FileQualityConfig {
    /// Brand colors follow the template palette so scoring matches what is drawn.
    fn into_domain(self, template: &TemplateSettings) -> QualitySettings {
        let defaults = QualitySettings::default();
        QualitySettings {
            max_file_size: self.max_file_size_bytes.unwrap_or(defaults.max_file_size),
            min_width: self.min_width.unwrap_or(defaults.min_width),
            min_height: self.min_height.unwrap_or(defaults.min_height),
            brand_colors: template.palette.colors().to_vec(),
            color_tolerance: self.color_tolerance.unwrap_or(defaults.color_tolerance),
            prohibited_words: self
                .prohibited_words
                .map(|words| words.into_iter().map(|word| word.to_lowercase()).collect())
                .unwrap_or(defaults.prohibited_words),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileStorageConfig {
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    endpoint_url: Option<String>,
    #[serde(default)]
    request_timeout_seconds: Option<u64>,
}

impl FileStorageConfig {
    fn into_domain(self, env: &EnvOverrides) -> Option<StorageConfig> {
        let bucket = self.bucket.or_else(|| env.s3_bucket.clone())?;

        Some(StorageConfig {
            bucket,
            region: self
                .region
                .or_else(|| env.s3_region.clone())
                .unwrap_or_else(|| DEFAULT_STORAGE_REGION.to_string()),
            prefix: self
                .prefix
                .map(|prefix| prefix.trim_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_STORAGE_PREFIX.to_string()),
            endpoint_url: self.endpoint_url,
            request_timeout: self
                .request_timeout_seconds
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(DEFAULT_STORAGE_TIMEOUT),
        })
    }
}

fn parse_hex(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.quality_threshold, 0.7);
        assert!(config.openai.is_none());
        assert!(config.veo.is_none());
        assert!(config.storage.is_none());
        assert_eq!(config.video.spec, VideoSpec::default());
        assert_eq!(config.quality.brand_colors.len(), 3);
    }

    #[test]
    fn sections_are_converted() {
        let config = AppConfig::from_toml(
            r##"
output_dir = "/tmp/creatives"
max_concurrency = 2

[openai]
api_key = "sk-test"
base_url = "http://localhost:8080/v1/"

[veo]
api_key = "g-test"
poll_interval_seconds = 5

[images]
stock_default_url = "http://127.0.0.1:9/default.jpg"

[[images.stock]]
keyword = "Sneaker"
url = "http://127.0.0.1:9/sneaker.jpg"

[video]
duration_seconds = 2
width = 320
height = 180
fps = 6

[template]
primary_color = "#000000"

[storage]
bucket = "assets"
prefix = "/campaigns/"
request_timeout_seconds = 5
"##,
        )
        .unwrap();

        let openai = config.openai.unwrap();
        assert_eq!(openai.image_model, "dall-e-3");
        assert_eq!(openai.edit_model, "gpt-image-1");
        assert_eq!(openai.api_base(), "http://localhost:8080/v1");

        let veo = config.veo.unwrap();
        assert_eq!(veo.model, "veo-3.0-generate-preview");
        assert_eq!(veo.poll_interval, Duration::from_secs(5));

        assert_eq!(
            config.images.stock_images.lookup("Red Sneaker X"),
            "http://127.0.0.1:9/sneaker.jpg"
        );
        assert_eq!(
            config.images.stock_images.lookup("Mystery"),
            "http://127.0.0.1:9/default.jpg"
        );

        assert_eq!(config.video.spec.fps, 6);
        assert_eq!(config.template.palette.primary, [0, 0, 0]);
        assert!(config.quality.brand_colors.contains(&[0, 0, 0]));

        let storage = config.storage.unwrap();
        assert_eq!(storage.prefix, "campaigns");
        assert_eq!(storage.region, "us-east-1");
        assert_eq!(storage.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn configured_threshold_reaches_the_request() {
        let config = AppConfig::from_toml("quality_threshold = 0.85").unwrap();
        let brief = crate::models::fixtures::brief(&["Trail Watch"]);

        let request = config.generation_request(brief.clone(), None);
        assert_eq!(request.quality_threshold, 0.85);

        let request = config.generation_request(brief.clone(), Some(0.5));
        assert_eq!(request.quality_threshold, 0.5);

        let request = config.generation_request(brief, Some(3.0));
        assert_eq!(request.quality_threshold, 1.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(AppConfig::from_toml("max_concurrency = 0").is_err());
        assert!(AppConfig::from_toml("quality_threshold = 1.5").is_err());
        assert!(AppConfig::from_toml("[template]\ntext_color = \"white\"").is_err());
    }

    #[test]
    fn shipped_sample_config_parses() {
        let config = AppConfig::from_toml(include_str!("../config/app_config.toml")).unwrap();
        assert!(config.openai.is_none());
        assert!(config.storage.is_none());
        assert_eq!(config.video.spec, VideoSpec::default());
        assert!(config.images.stock_images.lookup("Studio Headphones").contains("1505740420928"));
        assert_eq!(config.quality.prohibited_words.len(), 6);
    }
}
