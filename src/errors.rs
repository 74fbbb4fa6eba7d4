use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid campaign brief: {0}")]
    InvalidBrief(String),

    #[error("capability unavailable: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("image generation failed: {0}")]
    ImageGeneration(#[from] rig::image_generation::ImageGenerationError),

    #[error("LLM request failed: {0}")]
    Prompt(#[from] rig::completion::PromptError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Other(String),
}

impl PipelineError {
    pub fn invalid_brief(reason: impl Into<String>) -> Self {
        Self::InvalidBrief(reason.into())
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
