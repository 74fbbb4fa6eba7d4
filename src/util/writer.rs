use std::path::PathBuf;

use serde::Serialize;
use tokio::fs;

use crate::{
    errors::Result,
    models::{CampaignOutput, GenerationSummary},
};

pub const SUMMARY_FILE: &str = "generation_summary.json";
pub const OUTPUT_FILE: &str = "campaign_output.json";

/// Writes the per-campaign JSON records next to the generated creatives.
pub struct RecordWriter {
    root: PathBuf,
}

impl RecordWriter {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub async fn write_summary(&self, summary: &GenerationSummary) -> Result<PathBuf> {
        self.write_json(SUMMARY_FILE, summary).await
    }

    pub async fn write_output(&self, output: &CampaignOutput) -> Result<PathBuf> {
        self.write_json(OUTPUT_FILE, output).await
    }

    async fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).await?;
        let path = self.root.join(file_name);
        fs::write(&path, serde_json::to_vec_pretty(value)?).await?;
        Ok(path)
    }
}
