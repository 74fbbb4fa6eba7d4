pub mod brand;
pub mod capabilities;
pub mod compositor;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod quality;
pub mod storage;
pub mod util;

pub use errors::{PipelineError, Result};
pub use orchestrator::CampaignOrchestrator;
