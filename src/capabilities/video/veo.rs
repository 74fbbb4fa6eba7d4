use std::{path::Path, time::Duration};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{VideoClip, VideoContext, VideoSpec, VideoStrategy};
use crate::{
    capabilities::Cancellation,
    config::VeoConfig,
    errors::{PipelineError, Result},
};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Veo always returns 8 seconds of 720p at 24 fps.
const VEO_SPEC: VideoSpec = VideoSpec {
    duration_secs: 8,
    width: 1280,
    height: 720,
    fps: 24,
};

/// Long-running Veo generation over the Gemini REST API: submit, poll the
/// operation until done, then download the first generated sample.
pub struct VeoStrategy {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    poll_interval: Duration,
    max_wait: Duration,
    request_timeout: Duration,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
}

#[derive(Serialize)]
struct Instance<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<InlineImage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage {
    bytes_base64_encoded: String,
    mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: SampleVideo,
}

#[derive(Debug, Deserialize)]
struct SampleVideo {
    uri: String,
}

impl Operation {
    fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()
            .map(|sample| sample.video.uri.as_str())
    }
}

impl VeoStrategy {
    pub fn new(http: reqwest::Client, config: &VeoConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
            max_wait: config.max_wait,
            request_timeout: config.request_timeout,
        }
    }

    async fn starting_frame(path: Option<&Path>) -> Option<InlineImage> {
        let path = path?;
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                debug!(target: "video_composer", path = %path.display(), "using product image as starting frame");
                Some(InlineImage {
                    bytes_base64_encoded: BASE64_STANDARD.encode(bytes),
                    mime_type: "image/jpeg",
                })
            }
            Err(err) => {
                debug!(target: "video_composer", path = %path.display(), error = %err, "starting frame unreadable");
                None
            }
        }
    }

    async fn submit(&self, prompt: &str, image: Option<InlineImage>) -> Result<Operation> {
        let url = format!("{}/models/{}:predictLongRunning", self.endpoint, self.model);
        let body = PredictRequest {
            instances: [Instance { prompt, image }],
        };
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::other(format!("Veo returned status {status}: {body}")));
        }
        Ok(response.json().await?)
    }

    async fn poll(&self, mut operation: Operation, cancel: &Cancellation) -> Result<Operation> {
        while !operation.done {
            debug!(target: "video_composer", operation = %operation.name, "waiting for video generation");
            cancel
                .guard(tokio::time::sleep(self.poll_interval))
                .await
                .ok_or(PipelineError::Cancelled)?;
            operation = self
                .http
                .get(format!("{}/{}", self.endpoint, operation.name))
                .header(API_KEY_HEADER, &self.api_key)
                .timeout(self.request_timeout)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
        }
        Ok(operation)
    }

    async fn download(&self, uri: &str, target: &Path) -> Result<()> {
        let bytes = self
            .http
            .get(uri)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.request_timeout)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(target, &bytes).await?;
        Ok(())
    }

    async fn run(&self, ctx: &VideoContext<'_>) -> Result<VideoClip> {
        let image = Self::starting_frame(ctx.image_paths.first().map(|path| path.as_path())).await;
        let operation = self.submit(ctx.prompt, image).await?;
        info!(target: "video_composer", operation = %operation.name, model = %self.model, "video generation started");

        let operation = match tokio::time::timeout(self.max_wait, self.poll(operation, ctx.cancel)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PipelineError::other(format!(
                    "Veo operation not done after {}s",
                    self.max_wait.as_secs()
                )));
            }
        };

        if let Some(error) = operation.error.as_ref() {
            return Err(PipelineError::other(format!("Veo operation failed: {error}")));
        }
        let uri = operation
            .video_uri()
            .ok_or_else(|| PipelineError::other("Veo response has no generated video"))?;

        let path = ctx.output_path("mp4");
        ctx.cancel
            .guard(self.download(uri, &path))
            .await
            .ok_or(PipelineError::Cancelled)??;

        Ok(VideoClip {
            path,
            spec: VEO_SPEC,
            model: self.model.clone(),
            has_audio: true,
        })
    }
}

#[async_trait]
impl VideoStrategy for VeoStrategy {
    fn name(&self) -> &'static str {
        "veo"
    }

    async fn attempt(&self, ctx: &VideoContext<'_>) -> Result<Option<VideoClip>> {
        ctx.cancel
            .guard(self.run(ctx))
            .await
            .ok_or(PipelineError::Cancelled)?
            .map(Some)
    }
}
