mod api;
mod auth;
mod bottlenecks;
mod cli;
mod config;
mod error;
mod models;
mod monitor;
mod roi;
mod source;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting ROILens - Engineering ROI Tool");
    cli.execute().await?;

    Ok(())
}
