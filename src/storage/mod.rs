mod s3;

pub use s3::S3ArtifactStore;

use async_trait::async_trait;

use crate::models::{CampaignBrief, CampaignOutput, GeneratedCreative, GeneratedVideo};

/// Durable persistence for a finished run. Every call is best effort: a
/// failure is logged by the implementation and reported as `None`, never as
/// an error, so local artifacts stay authoritative.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store_brief(&self, brief: &CampaignBrief) -> Option<String>;

    async fn store_output(&self, output: &CampaignOutput) -> Option<String>;

    async fn upload_creative(&self, campaign_id: &str, creative: &GeneratedCreative) -> Option<String>;

    async fn upload_video(&self, campaign_id: &str, video: &GeneratedVideo) -> Option<String>;
}

pub(crate) fn content_type_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for(Path::new("a/b.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("clip.gif")), "image/gif");
        assert_eq!(content_type_for(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }
}
