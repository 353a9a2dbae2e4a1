use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use serde::Serialize;
use std::path::PathBuf;

use crate::api::{self, CalculateRoiRequest, ErrorResponse, RawRepositoryId};
use crate::auth::Token;
use crate::config::RoiConfig;
use crate::monitor::RequestMonitor;
use crate::source::{HttpMetricsSource, InMemoryMetricsSource, MetricsSource};

#[derive(Parser)]
#[command(name = "roilens")]
#[command(author, version, about = "Engineering ROI and Bottleneck Tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    source: SourceArgs,

    /// JSON configuration file overriding the built-in constants
    #[arg(short, long, global = true, env = "ROILENS_CONFIG")]
    config: Option<PathBuf>,

    /// Developer cost per hour in USD
    #[arg(long, global = true, env = "ROILENS_HOURLY_COST")]
    hourly_cost: Option<f64>,

    /// Output file path (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Args)]
struct SourceArgs {
    /// Base URL of the metrics store API
    #[arg(short, long, global = true, env = "ROILENS_SOURCE_URL")]
    source_url: Option<String>,

    /// JSON file with raw repository records to compute from (takes precedence over --source-url)
    #[arg(short, long, global = true)]
    fixture: Option<PathBuf>,

    /// Metrics store API token (optional)
    #[arg(short, long, global = true, env = "ROILENS_TOKEN")]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate cost and time savings for a repository
    Roi {
        /// Repository ID
        #[arg(short, long)]
        repository: String,

        /// Lookback window in days (defaults to the configured timeframe)
        #[arg(short, long, allow_negative_numbers = true)]
        days: Option<i64>,
    },
    /// Detect engineering bottlenecks for a repository
    Bottlenecks {
        /// Repository ID
        #[arg(short, long)]
        repository: String,
    },
}

impl SourceArgs {
    fn build(&self, config: &RoiConfig) -> Result<Box<dyn MetricsSource>> {
        if let Some(path) = &self.fixture {
            let source = InMemoryMetricsSource::from_fixture(path, config.defaults.clone())
                .with_context(|| format!("Failed to load fixture {}", path.display()))?;
            return Ok(Box::new(source));
        }

        let url = self
            .source_url
            .as_deref()
            .context("Either --source-url or --fixture is required")?;
        let token = Token::from_optional(self.token.as_deref());
        info!("Using metrics source at {url}");

        Ok(Box::new(HttpMetricsSource::new(
            url,
            token,
            config.defaults.clone(),
        )?))
    }
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let config = RoiConfig::load(self.config.as_deref(), self.hourly_cost)?;
        let source = self.source.build(&config)?;
        let monitor = RequestMonitor::default();
        let started_at = chrono::Utc::now();

        let outcome = match &self.command {
            Commands::Roi { repository, days } => {
                info!("Calculating ROI for repository: {repository}");

                let request = CalculateRoiRequest {
                    repository_id: RawRepositoryId::Text(repository.clone()),
                    timeframe_days: *days,
                };
                let result = api::calculate_roi(source.as_ref(), &config, &monitor, &request).await;
                self.render(result)
            }
            Commands::Bottlenecks { repository } => {
                info!("Detecting bottlenecks for repository: {repository}");

                let result =
                    api::bottlenecks(source.as_ref(), &config, &monitor, repository).await;
                self.render(result)
            }
        };

        for sample in monitor.query(started_at) {
            debug!(
                "{} {} took {:.1} ms (success: {})",
                sample.operation,
                sample.repository_id.as_deref().unwrap_or("-"),
                sample.duration_ms,
                sample.success
            );
        }
        let stats = monitor.snapshot_stats();
        info!(
            "Handled {} requests ({} failed), average {:.1} ms, {} retained at most",
            stats.total_requests,
            stats.error_count,
            stats.avg_duration_ms,
            monitor.capacity()
        );

        outcome
    }

    /// Write the response, or the error body, and fail on error.
    fn render<T: Serialize>(&self, result: crate::error::Result<T>) -> Result<()> {
        match result {
            Ok(body) => self.write_json(&body),
            Err(e) => {
                self.write_json(&ErrorResponse::from(&e))?;
                Err(e.into())
            }
        }
    }

    fn write_json<T: Serialize>(&self, body: &T) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(body)?
        } else {
            serde_json::to_string(body)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_roi_with_fixture() {
        let cli = Cli::try_parse_from([
            "roilens",
            "--fixture",
            "records.json",
            "roi",
            "--repository",
            "acme/widgets",
            "--days",
            "14",
        ])
        .unwrap();

        assert_eq!(cli.source.fixture, Some(PathBuf::from("records.json")));
        match cli.command {
            Commands::Roi { repository, days } => {
                assert_eq!(repository, "acme/widgets");
                assert_eq!(days, Some(14));
            }
            Commands::Bottlenecks { .. } => panic!("expected roi command"),
        }
    }

    #[test]
    fn test_missing_source_is_error() {
        let args = SourceArgs {
            source_url: None,
            fixture: None,
            token: None,
        };

        assert!(args.build(&RoiConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_source_url_is_error() {
        let args = SourceArgs {
            source_url: Some("not a url".to_string()),
            fixture: None,
            token: None,
        };

        assert!(args.build(&RoiConfig::default()).is_err());
    }

    #[test]
    fn test_parse_bottlenecks_with_hourly_cost() {
        let cli = Cli::try_parse_from([
            "roilens",
            "--source-url",
            "https://metrics.example.com",
            "--hourly-cost",
            "90",
            "bottlenecks",
            "--repository",
            "42",
        ])
        .unwrap();

        assert_eq!(cli.hourly_cost, Some(90.0));
        assert!(matches!(cli.command, Commands::Bottlenecks { .. }));
    }
}
