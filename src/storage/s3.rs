use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, timeout::TimeoutConfig};
use aws_sdk_s3::{Client, config::Region, primitives::ByteStream};
use tracing::{info, warn};

use super::{ArtifactStore, content_type_for};
use crate::{
    config::StorageConfig,
    errors::{PipelineError, Result},
    models::{AspectRatio, CampaignBrief, CampaignOutput, GeneratedCreative, GeneratedVideo, VideoFormat},
    util::slug,
};

pub struct S3ArtifactStore {
    client: Client,
    bucket: String,
    region: String,
    prefix: String,
}

impl S3ArtifactStore {
    /// Credentials come from the default AWS provider chain.
    pub async fn connect(config: &StorageConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.request_timeout)
                    .build(),
            )
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = config.endpoint_url.as_deref() {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::with_client(Client::from_conf(builder.build()), config)
    }

    pub fn with_client(client: Client, config: &StorageConfig) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            prefix: config.prefix.clone(),
        }
    }

    pub fn brief_key(&self, campaign_id: &str) -> String {
        format!("{}/campaigns/{campaign_id}/campaign_brief.json", self.prefix)
    }

    pub fn output_key(&self, campaign_id: &str) -> String {
        format!("{}/campaigns/{campaign_id}/campaign_output.json", self.prefix)
    }

    pub fn creative_key(
        &self,
        campaign_id: &str,
        product_name: &str,
        aspect_ratio: AspectRatio,
        file_name: &str,
    ) -> String {
        format!(
            "{}/creatives/{campaign_id}/{}/{}/{file_name}",
            self.prefix,
            slug(product_name),
            aspect_ratio.slug()
        )
    }

    pub fn video_key(&self, campaign_id: &str, product_name: &str, format: VideoFormat, file_name: &str) -> String {
        format!(
            "{}/videos/{campaign_id}/{}/{}/{file_name}",
            self.prefix,
            slug(product_name),
            format.as_str()
        )
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("https://{}.s3.{}.amazonaws.com/{key}", self.bucket, self.region)
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| PipelineError::Storage(format!("put {key}: {err}")))?;
        Ok(self.object_url(key))
    }

    async fn put_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<String> {
        let body = serde_json::to_vec_pretty(value)?;
        self.put(key, body, "application/json").await
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<String> {
        let body = tokio::fs::read(path).await?;
        self.put(key, body, content_type_for(path)).await
    }

    fn settle(&self, what: &str, result: Result<String>) -> Option<String> {
        match result {
            Ok(url) => {
                info!(target: "storage", %url, "{what} stored");
                Some(url)
            }
            Err(err) => {
                warn!(target: "storage", bucket = %self.bucket, error = %err, "{what} not stored");
                None
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact")
        .to_string()
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn store_brief(&self, brief: &CampaignBrief) -> Option<String> {
        let key = self.brief_key(&brief.campaign_id);
        self.settle("campaign brief", self.put_json(&key, brief).await)
    }

    async fn store_output(&self, output: &CampaignOutput) -> Option<String> {
        let key = self.output_key(&output.campaign_id);
        self.settle("campaign output", self.put_json(&key, output).await)
    }

    async fn upload_creative(&self, campaign_id: &str, creative: &GeneratedCreative) -> Option<String> {
        let key = self.creative_key(
            campaign_id,
            &creative.product_name,
            creative.aspect_ratio,
            &file_name(&creative.file_path),
        );
        self.settle("creative", self.put_file(&key, &creative.file_path).await)
    }

    async fn upload_video(&self, campaign_id: &str, video: &GeneratedVideo) -> Option<String> {
        let key = self.video_key(
            campaign_id,
            &video.product_name,
            video.video_format,
            &file_name(&video.file_path),
        );
        self.settle("video", self.put_file(&key, &video.file_path).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> S3ArtifactStore {
        let conf = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("eu-west-1"))
            .build();
        S3ArtifactStore::with_client(
            Client::from_conf(conf),
            &StorageConfig {
                bucket: "brand-assets".to_string(),
                region: "eu-west-1".to_string(),
                prefix: "campaigns".to_string(),
                endpoint_url: None,
                request_timeout: crate::config::DEFAULT_STORAGE_TIMEOUT,
            },
        )
    }

    #[test]
    fn keys_group_by_campaign_product_and_slot() {
        let store = store();
        assert_eq!(
            store.brief_key("summer-2025"),
            "campaigns/campaigns/summer-2025/campaign_brief.json"
        );
        assert_eq!(
            store.output_key("summer-2025"),
            "campaigns/campaigns/summer-2025/campaign_output.json"
        );
        assert_eq!(
            store.creative_key("summer-2025", "Trail Watch", AspectRatio::Portrait, "v2.jpg"),
            "campaigns/creatives/summer-2025/trail_watch/9x16/v2.jpg"
        );
        assert_eq!(
            store.video_key("summer-2025", "Trail Watch", VideoFormat::Tiktok, "clip.mp4"),
            "campaigns/videos/summer-2025/trail_watch/tiktok/clip.mp4"
        );
    }

    #[test]
    fn object_url_is_virtual_hosted() {
        assert_eq!(
            store().object_url("a/b.jpg"),
            "https://brand-assets.s3.eu-west-1.amazonaws.com/a/b.jpg"
        );
    }

    #[tokio::test]
    async fn missing_local_file_is_not_uploaded() {
        let store = store();
        let creative = GeneratedCreative {
            creative_id: "c".to_string(),
            product_name: "Trail Watch".to_string(),
            aspect_ratio: AspectRatio::Square,
            file_path: "/nonexistent/creative.jpg".into(),
            campaign_message: String::new(),
            quality_score: 0.0,
            variation_num: 1,
            remote_url: None,
            generation_metadata: Default::default(),
        };
        assert!(store.upload_creative("summer-2025", &creative).await.is_none());
    }
}
