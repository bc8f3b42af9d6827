use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::chart::ChartArgs;
use crate::constants::{
    DEVICE_ID, SOCKET_PATH, START_LATITUDE, START_LONGITUDE, STEP_DEGREES, TICK_INTERVAL_MS,
};
use crate::geo::{BoundaryPolicy, Coordinate};
use crate::simulator::{SimulatorConfig, SinkFailurePolicy};
use crate::tail::TailArgs;

#[derive(Debug, Parser)]
#[command(author, version, about = "Synthetic GPS track generator")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(self) -> Command {
        self.command.unwrap_or_default()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the track generator and socket publisher
    Run(RunArgs),
    /// Subscribe to the unix socket and print incoming samples
    Tail(TailArgs),
    /// Collect samples and render an ASCII chart of the track
    Chart(ChartArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Run(RunArgs::default())
    }
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Starting latitude in decimal degrees
    #[arg(long, default_value_t = START_LATITUDE, allow_negative_numbers = true)]
    pub lat: f64,

    /// Starting longitude in decimal degrees
    #[arg(long, default_value_t = START_LONGITUDE, allow_negative_numbers = true)]
    pub lon: f64,

    /// Identifier stamped on every sample
    #[arg(short, long, default_value = DEVICE_ID)]
    pub device_id: String,

    /// Milliseconds between samples
    #[arg(short, long, default_value_t = TICK_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Largest per-axis step of the random walk, in degrees
    #[arg(long, default_value_t = STEP_DEGREES)]
    pub step: f64,

    /// Seed the walk for a reproducible track
    #[arg(long)]
    pub seed: Option<u64>,

    /// Stop after emitting this many samples
    #[arg(short = 'n', long)]
    pub max_samples: Option<u64>,

    /// How to treat coordinates that leave the valid range
    #[arg(long, value_enum, default_value_t = BoundaryPolicy::Clamp)]
    pub boundary: BoundaryPolicy,

    /// What to do when a sample cannot be delivered
    #[arg(long, value_enum, default_value_t = SinkFailurePolicy::Continue)]
    pub on_sink_error: SinkFailurePolicy,

    /// Unix socket to publish samples on
    #[arg(long, default_value = SOCKET_PATH)]
    pub socket: PathBuf,

    /// Do not open the unix socket publisher
    #[arg(long)]
    pub no_socket: bool,

    /// Print every sample to stdout as a JSON line
    #[arg(long)]
    pub stdout: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            lat: START_LATITUDE,
            lon: START_LONGITUDE,
            device_id: DEVICE_ID.to_string(),
            interval_ms: TICK_INTERVAL_MS,
            step: STEP_DEGREES,
            seed: None,
            max_samples: None,
            boundary: BoundaryPolicy::default(),
            on_sink_error: SinkFailurePolicy::default(),
            socket: PathBuf::from(SOCKET_PATH),
            no_socket: false,
            stdout: false,
        }
    }
}

impl From<RunArgs> for SimulatorConfig {
    fn from(args: RunArgs) -> Self {
        SimulatorConfig {
            device_id: args.device_id,
            start: Coordinate::new(args.lat, args.lon),
            tick_interval: Duration::from_millis(args.interval_ms),
            step_degrees: args.step,
            seed: args.seed,
            boundary: args.boundary,
            on_sink_error: args.on_sink_error,
            max_samples: args.max_samples,
            socket_path: args.socket,
            enable_socket: !args.no_socket,
            echo_stdout: args.stdout,
        }
    }
}
