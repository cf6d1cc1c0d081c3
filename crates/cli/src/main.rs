//! Botnet Detector CLI
//!
//! A command-line tool for scoring flows, running batch evaluations and
//! watching live detections against the botnet detector service.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{detection, monitor, samples};
use std::path::PathBuf;
use std::time::Duration;

/// Botnet Detector CLI
#[derive(Parser)]
#[command(name = "bdctl")]
#[command(author, version, about = "CLI for the Botnet Flow Detector", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via BDCTL_API_URL env var)
    #[arg(long, env = "BDCTL_API_URL")]
    pub api_url: Option<String>,

    /// Caller identity recorded with every prediction
    #[arg(long, env = "BDCTL_REQUESTED_BY")]
    pub requested_by: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the features the models expect, in order
    Features,

    /// Show which models are loaded
    Models,

    /// Score a single flow
    Detect {
        /// Model to use (sequence/lstm, graph/gcn, ensemble)
        #[arg(long, short, default_value = "ensemble")]
        model: String,

        /// JSON file with a feature map or a detect request body
        #[arg(long)]
        file: Option<PathBuf>,

        /// Feature value as NAME=VALUE; repeatable, overrides --file
        #[arg(long = "feature", short = 'F')]
        features: Vec<String>,

        /// Show both base predictions next to the ensemble verdict
        #[arg(long)]
        explain: bool,
    },

    /// Score random flows from the reference dataset
    Batch {
        /// Number of samples (1-100)
        #[arg(long, short, default_value_t = 10)]
        n: usize,

        /// Draw uniformly instead of half botnet, half normal
        #[arg(long)]
        unbalanced: bool,

        /// Model to use (sequence/lstm, graph/gcn, ensemble)
        #[arg(long, short, default_value = "ensemble")]
        model: String,
    },

    /// Inspect the reference dataset
    #[command(subcommand)]
    Samples(SamplesCommands),

    /// Live detection over replayed flows
    #[command(subcommand)]
    Monitor(MonitorCommands),
}

#[derive(Subcommand)]
pub enum SamplesCommands {
    /// Show dataset statistics
    Info,

    /// Draw random rows
    Random {
        /// Number of rows (1-100)
        #[arg(long, short, default_value_t = 5)]
        n: usize,

        /// Draw half botnet, half normal
        #[arg(long)]
        balanced: bool,
    },
}

#[derive(Subcommand)]
pub enum MonitorCommands {
    /// Run a monitoring session on the server and print the report
    Start {
        /// Session length in seconds (10-300)
        #[arg(long, default_value_t = 60)]
        duration: u64,

        /// Seconds between flows (0.5-10)
        #[arg(long, default_value_t = 2.0)]
        interval: f64,

        /// Minimum botnet probability that raises an alert (0.5-1.0)
        #[arg(long, default_value_t = 0.7)]
        threshold: f64,
    },

    /// Print live ensemble readings
    Stream {
        /// Number of readings
        #[arg(long, short, default_value_t = 10)]
        count: usize,

        /// Seconds between readings
        #[arg(long, default_value_t = 1.0)]
        interval: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = config::Config::load()?;
    let api_url = file_config.resolve_api_url(cli.api_url);
    let requested_by = file_config.resolve_requested_by(cli.requested_by);

    // Initialize client
    let client = client::ApiClient::new(&api_url, requested_by)?;

    // Execute command
    match cli.command {
        Commands::Features => detection::list_features(&client, cli.format).await?,
        Commands::Models => detection::list_models(&client, cli.format).await?,
        Commands::Detect {
            model,
            file,
            features,
            explain,
        } => {
            let features = detection::collect_features(file.as_deref(), &features)?;
            detection::detect(&client, &model, features, explain, cli.format).await?;
        }
        Commands::Batch {
            n,
            unbalanced,
            model,
        } => {
            let request = client::BatchRequest {
                n,
                balanced: !unbalanced,
                model,
            };
            detection::batch(&client, request, cli.format).await?;
        }
        Commands::Samples(samples_cmd) => match samples_cmd {
            SamplesCommands::Info => samples::info(&client, cli.format).await?,
            SamplesCommands::Random { n, balanced } => {
                samples::random(&client, n, balanced, cli.format).await?;
            }
        },
        Commands::Monitor(monitor_cmd) => match monitor_cmd {
            MonitorCommands::Start {
                duration,
                interval,
                threshold,
            } => {
                let request = client::MonitorRequest {
                    duration_secs: duration,
                    interval_secs: interval,
                    alert_threshold: threshold,
                };
                monitor::start(&client, request, cli.format).await?;
            }
            MonitorCommands::Stream { count, interval } => {
                let interval = Duration::try_from_secs_f64(interval.max(0.0))?;
                monitor::stream(&client, count, interval, cli.format).await?;
            }
        },
    }

    Ok(())
}
