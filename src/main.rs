use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use creative_pipeline::{
    CampaignOrchestrator,
    capabilities::Cancellation,
    config::AppConfig,
    models::CampaignBrief,
    util::{format_utc, now_utc},
};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

#[derive(Parser, Debug)]
#[command(name = "creative-pipeline")]
#[command(about = "Generate branded campaign creatives and short videos from a brief")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline for a brief
    Generate {
        /// Campaign brief (.json, .yaml or .yml)
        #[arg(long)]
        brief: PathBuf,

        /// Output root (overrides config)
        #[arg(long, env = "OUTPUT_DIR")]
        output: Option<PathBuf>,

        /// Minimum acceptable quality score (overrides config)
        #[arg(long)]
        quality_threshold: Option<f64>,
    },
    /// Load and validate a brief without generating anything
    Validate {
        #[arg(long)]
        brief: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { brief } => {
            let brief = CampaignBrief::from_path(&brief)
                .with_context(|| format!("invalid brief {}", brief.display()))?;
            info!(
                target: "orchestrator",
                campaign_id = %brief.campaign_id,
                products = brief.products.len(),
                expected_creatives = brief.total_expected(),
                "brief is valid"
            );
        }
        Command::Generate {
            brief,
            output,
            quality_threshold,
        } => {
            let brief_path = brief;
            let brief = CampaignBrief::from_path(&brief_path)
                .with_context(|| format!("invalid brief {}", brief_path.display()))?;

            let mut config = AppConfig::load()?;
            if let Some(output) = output {
                config.output_dir = output;
            }

            let request = config.generation_request(brief, quality_threshold);

            let orchestrator = CampaignOrchestrator::from_config(&config).await;
            let (handle, cancel) = Cancellation::new();
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!(target: "orchestrator", "interrupt received, cancelling run");
                    handle.cancel();
                }
            });

            let result = orchestrator.process_with_cancel(request, &cancel).await;
            ctrl_c.abort();

            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    error!(target: "orchestrator", error = %err, "campaign run rejected");
                    return Err(err.into());
                }
            };

            info!(
                target: "orchestrator",
                directory = %output.output_directory.display(),
                creatives = output.generated_creatives.len(),
                videos = output.generated_videos.len(),
                success_rate = %format!("{:.0}%", output.success_rate() * 100.0),
                "outputs written"
            );
            for message in output.errors() {
                warn!(target: "orchestrator", "{message}");
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .with_timer(UtcTimer)
        .init();
}

struct UtcTimer;

impl FormatTime for UtcTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", format_utc(&now_utc(), "%Y-%m-%d %H:%M:%S%:z"))
    }
}
