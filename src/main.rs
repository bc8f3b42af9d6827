use anyhow::Result;
use clap::Parser;
use gps_track_sim::chart;
use gps_track_sim::cli::{self, Cli};
use gps_track_sim::simulator;
use gps_track_sim::tail;

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command() {
        cli::Command::Run(args) => simulator::run_with_config(args.into()).await,
        cli::Command::Tail(args) => tail::run(args).await,
        cli::Command::Chart(args) => chart::run(args).await,
    }
}
