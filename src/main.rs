use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

mod campaign;
mod classifier;
mod config;
mod error;
mod logging;
mod models;
mod news;
mod pipeline;
mod report;
mod segment;
mod sentiment;
mod signals;
mod store;
mod trends;

use config::{ForestConfig, LabelRule, PipelineConfig, SegmentConfig, SignalConfig};
use pipeline::{AnalysisRequest, PipelineContext, PipelineOutput};
use report::RunSummary;

const DEFAULT_DATA_PATH: &str = "data/raw/donor_data.csv";

#[derive(Parser)]
#[command(name = "donorsync")]
#[command(about = "Crisis urgency scoring and donor persona segmentation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score crisis urgency and segment the donor base
    Analyze {
        #[arg(long)]
        crisis: String,
        #[arg(long, default_value = DEFAULT_DATA_PATH)]
        data: PathBuf,
        #[arg(long, default_value_t = 50.0)]
        min_gift: f64,
        #[arg(long, default_value_t = 50)]
        ask_amount: u32,
        /// Replace offline signals with simulated headlines
        #[arg(long)]
        simulate_offline: bool,
        /// Print the full annotated output as JSON
        #[arg(long)]
        json: bool,
        /// Write a markdown report to this path
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Collect crisis signals and score urgency only
    Urgency {
        #[arg(long)]
        crisis: String,
        #[arg(long)]
        json: bool,
    },
    /// Train the classifier and segment donors only
    Segment {
        #[arg(long, default_value = DEFAULT_DATA_PATH)]
        data: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Recent average gift above which a donor counts as likely
    #[arg(long, default_value_t = 10.0)]
    gift_threshold: f64,
    /// Months since last gift below which a donor counts as likely
    #[arg(long, default_value_t = 18.0)]
    recency_months: f64,
    #[arg(long, default_value_t = 50)]
    trees: usize,
    #[arg(long, default_value_t = 42)]
    forest_seed: u64,
    #[arg(long, default_value_t = 7)]
    clusters: usize,
    #[arg(long, default_value_t = 42)]
    kmeans_seed: u64,
}

impl ModelArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        config.label = LabelRule {
            gift_threshold: self.gift_threshold,
            recency_threshold_months: self.recency_months,
        };
        config.forest = ForestConfig {
            trees: self.trees,
            seed: self.forest_seed,
        };
        config.segment = SegmentConfig {
            clusters: self.clusters,
            seed: self.kmeans_seed,
            ..SegmentConfig::default()
        };
    }
}

#[derive(Serialize)]
struct AnalysisView<'a> {
    #[serde(flatten)]
    output: &'a PipelineOutput,
    summary: RunSummary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::configure_logging();
    let cli = Cli::parse();

    let mut config = PipelineConfig {
        signals: SignalConfig::from_env().context("invalid signal configuration")?,
        ..PipelineConfig::default()
    };

    match cli.command {
        Commands::Analyze {
            crisis,
            data,
            min_gift,
            ask_amount,
            simulate_offline,
            json,
            out,
            model,
        } => {
            model.apply(&mut config);
            let context = PipelineContext::new(config)?;
            let output = context
                .run(&AnalysisRequest {
                    crisis,
                    data_path: data,
                    simulate_offline,
                })
                .await
                .context("analysis failed")?;

            if let Some(path) = out {
                let report = report::build_report(&output, min_gift, ask_amount);
                std::fs::write(&path, report)
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
                eprintln!("Report written to {}.", path.display());
            }

            let summary = report::summarize_run(&output, min_gift, ask_amount);
            if json {
                let view = AnalysisView {
                    output: &output,
                    summary,
                };
                println!("{}", serde_json::to_string_pretty(&view)?);
                return Ok(());
            }

            println!("Crisis: {}", output.crisis);
            println!(
                "Urgency score {:.2} | search volume {} | signals {:?}",
                output.urgency.value, output.signals.trend_magnitude, output.provenance.signals
            );
            println!(
                "Qualified donors {} | est. pipeline value ${}",
                summary.qualified_donors, summary.estimated_pipeline_value
            );
            for persona in &summary.personas {
                println!(
                    "- Cluster {}: {} donors, avg probability {:.2}",
                    persona.cluster_id, persona.donor_count, persona.avg_probability
                );
            }
            println!();
            println!("{}", summary.copy.headline);
            println!("{}", summary.copy.body);
            println!("{}", summary.copy.ask);
        }
        Commands::Urgency { crisis, json } => {
            let context = PipelineContext::new(config)?;
            let (batch, urgency, source) = context.collect_signals(&crisis, false).await;

            if json {
                let view = serde_json::json!({
                    "signals": batch,
                    "urgency": urgency,
                    "source": source,
                });
                println!("{}", serde_json::to_string_pretty(&view)?);
                return Ok(());
            }

            println!(
                "Urgency for '{}': {:.2} ({} of {} snippets negative, search volume {}, {:?})",
                crisis, urgency.value, urgency.negative, urgency.scored, batch.trend_magnitude, source
            );
            for snippet in batch.snippets.iter().take(5) {
                println!("- {snippet}");
            }
        }
        Commands::Segment { data, model } => {
            model.apply(&mut config);
            let context = PipelineContext::new(config)?;
            let (table, source) = context.load_donors(&data)?;
            let table = context
                .analyze_donors(table)
                .context("failed to fit donor models")?;

            println!("Segmented {} donors from {:?}:", table.len(), source);
            for persona in segment::summarize(&table) {
                println!(
                    "- Cluster {}: {} donors (avg age {:.1}, avg lifetime ${:.2}, avg probability {:.2})",
                    persona.cluster_id,
                    persona.donor_count,
                    persona.avg_age,
                    persona.avg_lifetime_gift,
                    persona.avg_probability
                );
            }
        }
    }

    Ok(())
}
