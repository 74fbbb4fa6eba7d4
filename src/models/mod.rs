mod output;

pub use output::{
    CampaignOutput, GeneratedCreative, GeneratedVideo, GenerationSummary, Resolution, RunMetrics,
    success_rate,
};

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    brand::BrandPalette,
    errors::{PipelineError, Result},
};

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1", alias = "square")]
    Square,
    #[serde(rename = "9:16", alias = "portrait", alias = "vertical")]
    Portrait,
    #[serde(rename = "16:9", alias = "landscape", alias = "horizontal")]
    Landscape,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 3] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "16:9",
        }
    }

    /// Directory and filename form, e.g. `9x16`.
    pub fn slug(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1x1",
            AspectRatio::Portrait => "9x16",
            AspectRatio::Landscape => "16x9",
        }
    }

    /// Final pixel size every creative of this ratio is normalized to.
    pub fn target_size(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1080, 1080),
            AspectRatio::Portrait => (1080, 1920),
            AspectRatio::Landscape => (1920, 1080),
        }
    }

    /// Size requested from the image model.
    pub fn generation_size(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1024, 1024),
            AspectRatio::Portrait => (1024, 1792),
            AspectRatio::Landscape => (1792, 1024),
        }
    }

    pub fn style_descriptor(&self) -> &'static str {
        match self {
            AspectRatio::Square => {
                ", square composition suitable for social media, balanced layout"
            }
            AspectRatio::Portrait => {
                ", vertical composition suitable for mobile viewing, portrait orientation"
            }
            AspectRatio::Landscape => {
                ", horizontal composition suitable for desktop viewing, landscape orientation, product-focused"
            }
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    #[serde(alias = "IMAGE")]
    Image,
    #[serde(alias = "VIDEO")]
    Video,
    #[serde(alias = "BOTH")]
    Both,
}

impl ContentType {
    pub fn includes_images(&self) -> bool {
        matches!(self, ContentType::Image | ContentType::Both)
    }

    pub fn includes_video(&self) -> bool {
        matches!(self, ContentType::Video | ContentType::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    YoutubeShorts,
    InstagramReels,
    Tiktok,
    Story,
}

impl VideoFormat {
    pub const DEFAULTS: [VideoFormat; 2] = [VideoFormat::YoutubeShorts, VideoFormat::InstagramReels];

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::YoutubeShorts => "youtube_shorts",
            VideoFormat::InstagramReels => "instagram_reels",
            VideoFormat::Tiktok => "tiktok",
            VideoFormat::Story => "story",
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub target_demographic: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandGuidelines {
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
    #[serde(default)]
    pub font_family: Option<String>,
}

impl BrandGuidelines {
    /// Guideline colors that parse as `#rrggbb`.
    pub fn rgb_colors(&self) -> Vec<[u8; 3]> {
        [
            self.primary_color.as_deref(),
            self.secondary_color.as_deref(),
            self.accent_color.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter_map(parse_hex_color)
        .collect()
    }
}

fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetParams {
    /// Reference image of the person to keep consistent across portrait creatives.
    #[serde(default)]
    pub selected_avatar: Option<PathBuf>,
    #[serde(default)]
    pub selected_brand_logo: Option<PathBuf>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    /// Explicit palette; takes precedence over the registry entry for `brand`.
    #[serde(default)]
    pub brand_template: Option<BrandPalette>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignBrief {
    #[serde(alias = "id")]
    pub campaign_id: String,
    #[serde(alias = "name")]
    pub campaign_name: String,
    pub products: Vec<Product>,
    pub target_region: String,
    pub target_audience: String,
    pub campaign_message: String,
    #[serde(default)]
    pub brand_guidelines: Option<BrandGuidelines>,
    #[serde(default = "default_aspect_ratios")]
    pub aspect_ratios: Vec<AspectRatio>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub video_formats: Vec<VideoFormat>,
    #[serde(default = "default_true")]
    pub include_music: bool,
    #[serde(default = "default_true")]
    pub include_voice_over: bool,
    #[serde(default)]
    pub asset_params: Option<AssetParams>,
    #[serde(default)]
    pub additional_requirements: Option<Map<String, Value>>,
}

fn default_aspect_ratios() -> Vec<AspectRatio> {
    AspectRatio::ALL.to_vec()
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_true() -> bool {
    true
}

impl CampaignBrief {
    /// Reads a brief from a `.json`, `.yaml` or `.yml` file and validates it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let brief: CampaignBrief = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };
        brief.validate()?;
        Ok(brief)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("campaign_id", &self.campaign_id),
            ("campaign_name", &self.campaign_name),
            ("target_region", &self.target_region),
            ("target_audience", &self.target_audience),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(PipelineError::invalid_brief(format!("{field} must not be empty")));
            }
        }

        if self.products.is_empty() {
            return Err(PipelineError::invalid_brief("at least one product is required"));
        }

        Ok(())
    }

    pub fn asset_params(&self) -> Option<&AssetParams> {
        self.asset_params.as_ref()
    }

    pub fn is_english(&self) -> bool {
        let language = self.language.trim();
        language.is_empty() || language.eq_ignore_ascii_case(DEFAULT_LANGUAGE)
    }

    pub fn requested_video_formats(&self) -> Vec<VideoFormat> {
        if self.video_formats.is_empty() {
            VideoFormat::DEFAULTS.to_vec()
        } else {
            self.video_formats.clone()
        }
    }

    pub fn total_expected(&self) -> usize {
        self.products.len() * self.aspect_ratios.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub asset_id: String,
    pub asset_type: String,
    pub file_path: PathBuf,
    #[serde(default)]
    pub dimensions: Option<Resolution>,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub campaign_brief: CampaignBrief,
    #[serde(default)]
    pub input_assets: Vec<AssetInfo>,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
}

fn default_quality_threshold() -> f64 {
    DEFAULT_QUALITY_THRESHOLD
}

impl GenerationRequest {
    pub fn new(campaign_brief: CampaignBrief) -> Self {
        Self {
            campaign_brief,
            input_assets: Vec::new(),
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brief_defaults_fill_optional_fields() {
        let json = r#"{
            "id": "c-1",
            "name": "Launch",
            "products": [{"name": "Trail Watch"}],
            "target_region": "EU",
            "target_audience": "Runners",
            "campaign_message": "Run further than ever"
        }"#;
        let brief: CampaignBrief = serde_json::from_str(json).unwrap();

        assert_eq!(brief.campaign_id, "c-1");
        assert_eq!(brief.aspect_ratios, AspectRatio::ALL.to_vec());
        assert_eq!(brief.language, "en");
        assert_eq!(brief.content_type, ContentType::Image);
        assert!(brief.include_music);
        assert_eq!(brief.requested_video_formats(), VideoFormat::DEFAULTS.to_vec());
        assert!(brief.validate().is_ok());
    }

    #[test]
    fn yaml_brief_accepts_ratio_names() {
        let yaml = r#"
campaign_id: c-2
campaign_name: Autumn
products:
  - name: Laptop Pro
    description: Thin and light
    category: computers
target_region: APAC
target_audience: Students
campaign_message: Study smarter this autumn
aspect_ratios: [square, "9:16"]
content_type: both
"#;
        let brief: CampaignBrief = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            brief.aspect_ratios,
            vec![AspectRatio::Square, AspectRatio::Portrait]
        );
        assert!(brief.content_type.includes_images());
        assert!(brief.content_type.includes_video());
    }

    #[test]
    fn validation_rejects_missing_products() {
        let mut brief = fixtures::brief(&["A"]);
        brief.products.clear();
        assert!(matches!(
            brief.validate(),
            Err(PipelineError::InvalidBrief(_))
        ));

        let mut brief = fixtures::brief(&["A"]);
        brief.target_audience = "  ".to_string();
        assert!(brief.validate().is_err());
    }

    #[test]
    fn guideline_colors_parse_hex_only() {
        let guidelines = BrandGuidelines {
            primary_color: Some("#4682B4".to_string()),
            secondary_color: Some("navy".to_string()),
            accent_color: Some("#ffd700".to_string()),
            font_family: None,
        };
        assert_eq!(
            guidelines.rgb_colors(),
            vec![[70, 130, 180], [255, 215, 0]]
        );
    }

    #[test]
    fn aspect_ratio_sizes() {
        assert_eq!(AspectRatio::Square.target_size(), (1080, 1080));
        assert_eq!(AspectRatio::Portrait.target_size(), (1080, 1920));
        assert_eq!(AspectRatio::Landscape.target_size(), (1920, 1080));
        assert_eq!(AspectRatio::Portrait.slug(), "9x16");
    }
}
