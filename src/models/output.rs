use std::{collections::BTreeMap, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AspectRatio, VideoFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCreative {
    pub creative_id: String,
    pub product_name: String,
    pub aspect_ratio: AspectRatio,
    pub file_path: PathBuf,
    pub campaign_message: String,
    pub quality_score: f64,
    pub variation_num: u32,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub generation_metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedVideo {
    pub video_id: String,
    pub product_name: String,
    pub video_format: VideoFormat,
    pub file_path: PathBuf,
    pub file_size: Option<u64>,
    pub duration_secs: f64,
    pub resolution: Resolution,
    pub fps: u32,
    pub has_music: bool,
    pub has_voice_over: bool,
    pub quality_score: f64,
    pub generation_time_secs: f64,
    pub model_used: String,
    #[serde(default)]
    pub remote_url: Option<String>,
}

/// Written to `generation_summary.json` in the campaign directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub campaign_id: String,
    pub total_expected: usize,
    pub total_generated: usize,
    pub total_videos: usize,
    pub success_rate: f64,
    pub below_threshold: usize,
    pub errors: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Snapshot handed to external monitoring. Not needed for correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_expected: usize,
    pub creatives_generated: usize,
    pub videos_generated: usize,
    pub error_count: usize,
    pub success_rate: f64,
    pub average_quality: Option<f64>,
    pub image_stage_secs: f64,
    pub video_stage_secs: f64,
    pub persistence_secs: f64,
    pub total_secs: f64,
    pub image_sources: BTreeMap<String, usize>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignOutput {
    pub campaign_id: String,
    pub campaign_name: String,
    pub generated_creatives: Vec<GeneratedCreative>,
    pub generated_videos: Vec<GeneratedVideo>,
    pub summary: GenerationSummary,
    pub output_directory: PathBuf,
    pub metrics: RunMetrics,
}

impl CampaignOutput {
    pub fn success_rate(&self) -> f64 {
        self.summary.success_rate
    }

    pub fn errors(&self) -> &[String] {
        &self.summary.errors
    }
}

/// `generated / expected`, or 0 when nothing was expected.
pub fn success_rate(generated: usize, expected: usize) -> f64 {
    if expected == 0 {
        0.0
    } else {
        generated as f64 / expected as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_handles_zero_expected() {
        assert_eq!(success_rate(0, 0), 0.0);
        assert_eq!(success_rate(3, 6), 0.5);
        assert_eq!(success_rate(6, 6), 1.0);
    }
}
