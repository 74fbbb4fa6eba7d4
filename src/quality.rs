use std::path::Path;

use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::QualitySettings,
    errors::Result,
    models::{CampaignBrief, Product},
};

const TECHNICAL_WEIGHT: f64 = 0.3;
const BRAND_WEIGHT: f64 = 0.3;
const CONTENT_WEIGHT: f64 = 0.2;
const VISUAL_WEIGHT: f64 = 0.2;

const BRAND_COLOR_SHARE: f64 = 0.4;
const REQUIRED_ELEMENTS_SHARE: f64 = 0.6;
const PER_COLOR_MATCH: f64 = 0.33;

// Structural assumptions: the compositor always draws the message (0.5), a
// brand mark (0.3) and the product name (0.2), and its enhancement pass fixes
// contrast (0.3), sharpness (0.2) and saturation (0.2). None are measured.
const REQUIRED_ELEMENTS_SCORE: f64 = 0.5 + 0.3 + 0.2;
const ASSUMED_CONTRAST: f64 = 0.3;
const ASSUMED_SHARPNESS: f64 = 0.2;
const ASSUMED_SATURATION: f64 = 0.2;

const RECOMMEND_BELOW: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall: f64,
    pub technical: f64,
    pub brand: f64,
    pub content: f64,
    pub visual: f64,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Weighted composite over technical, brand, content and visual checks.
/// Never fails: a check that errors contributes 0.
pub struct QualityScorer {
    settings: QualitySettings,
}

impl QualityScorer {
    pub fn new(settings: QualitySettings) -> Self {
        Self { settings }
    }

    pub fn score(&self, image_path: &Path, brief: &CampaignBrief, product: &Product) -> f64 {
        self.report(image_path, brief, product).overall
    }

    pub fn report(&self, image_path: &Path, brief: &CampaignBrief, product: &Product) -> QualityReport {
        let mut issues = Vec::new();
        let decoded = decode(image_path);
        if let Err(err) = &decoded {
            issues.push(format!("image could not be decoded: {err}"));
        }

        let technical = self
            .technical(image_path, decoded.as_ref().ok(), &mut issues)
            .unwrap_or_else(|err| failed_check("technical", err));
        let brand = match decoded.as_ref() {
            Ok(image) => self.brand(image, brief, &mut issues),
            Err(_) => 0.0,
        };
        let content = self.content(brief, product, &mut issues);
        let visual = match decoded.as_ref() {
            Ok(image) => self.visual(image, &mut issues),
            Err(_) => 0.0,
        };

        let overall = (technical * TECHNICAL_WEIGHT
            + brand * BRAND_WEIGHT
            + content * CONTENT_WEIGHT
            + visual * VISUAL_WEIGHT)
            .clamp(0.0, 1.0);

        debug!(
            target: "quality",
            path = %image_path.display(),
            overall,
            technical,
            brand,
            content,
            visual,
            "quality check completed"
        );

        QualityReport {
            overall,
            technical,
            brand,
            content,
            visual,
            recommendations: recommendations(technical, brand, content, visual),
            issues,
        }
    }

    fn technical(
        &self,
        path: &Path,
        image: Option<&DynamicImage>,
        issues: &mut Vec<String>,
    ) -> Result<f64> {
        let file_size = std::fs::metadata(path)?.len();
        let mut score = 0.0;

        if file_size > self.settings.max_file_size {
            issues.push(format!("file too large: {file_size} bytes"));
            score -= 0.2;
        } else {
            score += 0.2;
        }

        let Some(image) = image else {
            return Ok(0.0);
        };

        let (width, height) = (image.width(), image.height());
        if width >= self.settings.min_width && height >= self.settings.min_height {
            score += 0.3;
        } else {
            issues.push(format!("resolution too low: {width}x{height}"));
            score -= 0.3;
        }

        let ratio = width as f64 / height.max(1) as f64;
        if (0.5..=2.0).contains(&ratio) {
            score += 0.2;
        } else {
            issues.push(format!("unusual aspect ratio: {ratio:.2}"));
            score -= 0.2;
        }

        if matches!(image, DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_)) {
            score += 0.1;
        } else {
            issues.push(format!("unsupported color mode: {:?}", image.color()));
            score -= 0.1;
        }

        // The file fully decoded, so integrity holds.
        score += 0.2;

        Ok(clamp_unit(score))
    }

    fn brand(&self, image: &DynamicImage, brief: &CampaignBrief, issues: &mut Vec<String>) -> f64 {
        let mean = mean_rgb(image);

        let mut colors = self.settings.brand_colors.clone();
        if let Some(guidelines) = brief.brand_guidelines.as_ref() {
            for color in guidelines.rgb_colors() {
                if !colors.contains(&color) {
                    colors.push(color);
                }
            }
        }

        let matches = colors
            .iter()
            .filter(|color| {
                let diff: f64 = (0..3).map(|i| (mean[i] - color[i] as f64).abs()).sum();
                diff < self.settings.color_tolerance
            })
            .count();
        if matches == 0 {
            issues.push("dominant color is far from every brand color".to_string());
        }

        let color_score = (matches as f64 * PER_COLOR_MATCH).min(1.0);
        clamp_unit(color_score * BRAND_COLOR_SHARE + REQUIRED_ELEMENTS_SCORE * REQUIRED_ELEMENTS_SHARE)
    }

    fn content(&self, brief: &CampaignBrief, product: &Product, issues: &mut Vec<String>) -> f64 {
        let mut score = 0.0;
        let message = &brief.campaign_message;

        if message.trim().is_empty() {
            issues.push("campaign message is empty".to_string());
            score -= 0.3;
        } else {
            score += 0.3;

            let lowered = message.to_lowercase();
            let prohibited: Vec<&str> = self
                .settings
                .prohibited_words
                .iter()
                .map(String::as_str)
                .filter(|word| lowered.contains(word))
                .collect();
            if prohibited.is_empty() {
                score += 0.2;
            } else {
                issues.push(format!("prohibited words in message: {}", prohibited.join(", ")));
                score -= 0.2;
            }

            let length = message.chars().count();
            if (10..=200).contains(&length) {
                score += 0.2;
            } else {
                issues.push(format!("campaign message length {length} outside 10..=200"));
                score -= 0.1;
            }
        }

        if product.name.trim().is_empty() {
            issues.push("product name is empty".to_string());
            score -= 0.2;
        } else {
            score += 0.2;
        }

        if product.description.trim().is_empty() {
            issues.push("product description is empty".to_string());
            score -= 0.1;
        } else {
            score += 0.1;
        }

        clamp_unit(score)
    }

    fn visual(&self, image: &DynamicImage, issues: &mut Vec<String>) -> f64 {
        let mean = mean_rgb(image);
        let brightness = (mean[0] + mean[1] + mean[2]) / 3.0;

        let mut score = 0.0;
        if (50.0..=200.0).contains(&brightness) {
            score += 0.3;
        } else {
            issues.push(format!("mean brightness {brightness:.0} outside 50..=200"));
            score -= 0.2;
        }

        clamp_unit(score + ASSUMED_CONTRAST + ASSUMED_SHARPNESS + ASSUMED_SATURATION)
    }
}

fn decode(path: &Path) -> Result<DynamicImage> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

fn mean_rgb(image: &DynamicImage) -> [f64; 3] {
    let rgb = image.to_rgb8();
    let count = (rgb.width() as f64 * rgb.height() as f64).max(1.0);
    let mut sums = [0.0f64; 3];
    for pixel in rgb.pixels() {
        for (sum, value) in sums.iter_mut().zip(pixel.0) {
            *sum += value as f64;
        }
    }
    sums.map(|sum| sum / count)
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn failed_check(name: &str, err: crate::errors::PipelineError) -> f64 {
    warn!(target: "quality", check = name, error = %err, "quality check failed");
    0.0
}

fn recommendations(technical: f64, brand: f64, content: f64, visual: f64) -> Vec<String> {
    let mut out = Vec::new();
    if technical < RECOMMEND_BELOW {
        out.push("Regenerate at the target resolution and keep the file under the size cap".to_string());
    }
    if brand < RECOMMEND_BELOW {
        out.push("Lean on the brand palette so the dominant color matches a brand color".to_string());
    }
    if content < RECOMMEND_BELOW {
        out.push("Tighten the campaign message to 10-200 characters and drop prohibited terms".to_string());
    }
    if visual < RECOMMEND_BELOW {
        out.push("Adjust exposure so mean brightness sits between 50 and 200".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{capabilities::image::write_jpeg, models::fixtures};
    use image::{Rgb, RgbImage};

    fn write_flat(dir: &Path, name: &str, size: (u32, u32), color: [u8; 3]) -> std::path::PathBuf {
        let path = dir.join(name);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(size.0, size.1, Rgb(color)));
        write_jpeg(&image, &path, 95).unwrap();
        path
    }

    #[test]
    fn all_pass_creative_scores_high() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_flat(dir.path(), "good.jpg", (1080, 1080), [70, 130, 160]);
        let brief = fixtures::brief(&["Trail Watch"]);
        let scorer = QualityScorer::new(QualitySettings::default());

        let report = scorer.report(&path, &brief, &brief.products[0]);
        assert!(report.overall >= 0.9, "{report:?}");
        for value in [report.technical, report.content, report.visual] {
            assert!((value - 1.0).abs() < 1e-9, "{report:?}");
        }
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn score_is_the_weighted_overall() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_flat(dir.path(), "mid.jpg", (900, 1200), [220, 220, 220]);
        let brief = fixtures::brief(&["Trail Watch"]);
        let scorer = QualityScorer::new(QualitySettings::default());

        let report = scorer.report(&path, &brief, &brief.products[0]);
        let score = scorer.score(&path, &brief, &brief.products[0]);
        assert_eq!(score, report.overall);

        let weighted = report.technical * 0.3 + report.brand * 0.3 + report.content * 0.2 + report.visual * 0.2;
        assert!((score - weighted).abs() < 1e-9, "{report:?}");
        assert!(score < 1.0);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_flat(dir.path(), "bad.jpg", (100, 400), [2, 2, 2]);
        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.campaign_message = "Win a FREE prize".to_string();
        let mut product = brief.products[0].clone();
        product.description.clear();
        let scorer = QualityScorer::new(QualitySettings::default());

        let report = scorer.report(&path, &brief, &product);
        for value in [report.overall, report.technical, report.brand, report.content, report.visual] {
            assert!((0.0..=1.0).contains(&value), "{report:?}");
        }
        assert!(report.overall < 0.7);
        assert!(report.issues.iter().any(|issue| issue.contains("prohibited")));
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn missing_file_scores_only_content() {
        let dir = tempfile::tempdir().unwrap();
        let brief = fixtures::brief(&["Trail Watch"]);
        let scorer = QualityScorer::new(QualitySettings::default());

        let report = scorer.report(&dir.path().join("missing.jpg"), &brief, &brief.products[0]);
        assert_eq!(report.technical, 0.0);
        assert_eq!(report.brand, 0.0);
        assert_eq!(report.visual, 0.0);
        assert!((report.overall - 0.2 * report.content).abs() < 1e-9);
    }

    #[test]
    fn empty_message_is_penalized() {
        let mut brief = fixtures::brief(&["Trail Watch"]);
        brief.campaign_message = String::new();
        let scorer = QualityScorer::new(QualitySettings::default());
        let mut issues = Vec::new();
        let content = scorer.content(&brief, &brief.products[0], &mut issues);
        assert!((content - 0.0).abs() < 1e-9);
        assert!(issues.iter().any(|issue| issue.contains("empty")));
    }
}
