mod generator;
mod walk;

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, watch};

use crate::constants::{
    DEVICE_ID, SAMPLE_CHANNEL_CAPACITY, SOCKET_PATH, START_LATITUDE, START_LONGITUDE,
    STEP_DEGREES, TICK_INTERVAL_MS,
};
use crate::error::TrackError;
use crate::geo::{BoundaryPolicy, Coordinate};
use crate::logging;
use crate::sample::Sample;
use crate::sink::{self, BroadcastSink, FanoutSink, JsonLinesSink, SampleSink};

pub use generator::{RunSummary, StopReason, TrackGenerator};
pub use walk::{RandomWalk, Step, TrackState};

/// What the worker does when the sink returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SinkFailurePolicy {
    /// Log the failure and carry on with the next tick.
    #[default]
    Continue,
    /// Log the failure and end the track.
    Stop,
}

impl fmt::Display for SinkFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SinkFailurePolicy::Continue => "continue",
            SinkFailurePolicy::Stop => "stop",
        })
    }
}

#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    pub device_id: String,
    pub start: Coordinate,
    pub tick_interval: Duration,
    pub step_degrees: f64,
    pub seed: Option<u64>,
    pub boundary: BoundaryPolicy,
    pub on_sink_error: SinkFailurePolicy,
    pub max_samples: Option<u64>,
    pub socket_path: PathBuf,
    pub enable_socket: bool,
    pub echo_stdout: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            device_id: DEVICE_ID.to_string(),
            start: Coordinate::new(START_LATITUDE, START_LONGITUDE),
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            step_degrees: STEP_DEGREES,
            seed: None,
            boundary: BoundaryPolicy::default(),
            on_sink_error: SinkFailurePolicy::default(),
            max_samples: None,
            socket_path: PathBuf::from(SOCKET_PATH),
            enable_socket: true,
            echo_stdout: false,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.device_id.trim().is_empty() {
            return Err(TrackError::InvalidConfig("device id must not be empty".into()));
        }
        if self.tick_interval.is_zero() {
            return Err(TrackError::InvalidConfig(
                "tick interval must be greater than zero".into(),
            ));
        }
        walk::check_step(self.step_degrees)?;
        if self.max_samples == Some(0) {
            return Err(TrackError::InvalidConfig(
                "max samples must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShutdownSignal {
    None,
    Graceful,
    Immediate,
}

/// Runs the generator with the unix-socket publisher until a signal or the sample budget ends it.
pub async fn run_with_config(config: SimulatorConfig) -> Result<()> {
    run_with_sink(config, FanoutSink::new()).await
}

/// Runs the publisher like [`run_with_config`], also handing every sample to `extra`.
pub async fn run_with_sink(config: SimulatorConfig, extra: impl SampleSink) -> Result<()> {
    let config = Arc::new(config);
    let generator = TrackGenerator::new(SimulatorConfig::clone(&config))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(ShutdownSignal::None);
    let (sample_sender, _) = broadcast::channel::<Sample>(SAMPLE_CHANNEL_CAPACITY);

    let mut sink = FanoutSink::new()
        .with(BroadcastSink::new(sample_sender.clone()))
        .with(extra);
    let mut stdout_forwarder = None;
    if config.echo_stdout {
        let (queued, forwarder) =
            sink::decoupled(JsonLinesSink::stdout(), SAMPLE_CHANNEL_CAPACITY)?;
        sink = sink.with(queued);
        stdout_forwarder = Some(forwarder);
    }
    generator
        .start(config.start, sink)
        .context("failed to start track generator")?;

    let signals_task = tokio::spawn(handle_signals(shutdown_tx.clone()));

    let shutdown_for_socket = shutdown_rx.clone();
    let shutdown_for_track = shutdown_rx;

    let socket_future = async {
        if config.enable_socket {
            run_socket_server(Arc::clone(&config), sample_sender, shutdown_for_socket).await
        } else {
            Ok(())
        }
    };

    let (socket_result, track_result) = tokio::join!(
        socket_future,
        supervise_generator(&generator, shutdown_tx.clone(), shutdown_for_track)
    );

    signals_task.abort();
    let _ = signals_task.await;

    // the finished worker dropped its queue handle, so the forwarder drains and exits
    if let Some(forwarder) = stdout_forwarder {
        tokio::task::spawn_blocking(move || forwarder.join())
            .await?
            .map_err(|_| anyhow!("stdout forwarder panicked"))?;
    }

    track_result?;
    socket_result?;
    Ok(())
}

async fn handle_signals(shutdown_tx: watch::Sender<ShutdownSignal>) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                logging::info(
                    "signal.received",
                    "SIGTERM received, initiating graceful shutdown",
                    json!({ "signal": "SIGTERM" })
                );
                if shutdown_tx.send(ShutdownSignal::Graceful).is_err() {
                    break;
                }
            }
            _ = sigint.recv() => {
                logging::warn(
                    "signal.received",
                    "SIGINT received, forcing immediate shutdown",
                    json!({ "signal": "SIGINT" })
                );
                let _ = shutdown_tx.send(ShutdownSignal::Immediate);
                break;
            }
        }
    }

    Ok(())
}

/// Keeps the generator and the shutdown channel in step: a signal stops the
/// track, and a track that ends on its own shuts the publisher down.
async fn supervise_generator(
    generator: &TrackGenerator,
    shutdown_tx: watch::Sender<ShutdownSignal>,
    mut shutdown_rx: watch::Receiver<ShutdownSignal>,
) -> Result<()> {
    let finished = generator.wait();
    tokio::pin!(finished);

    let outcome = loop {
        tokio::select! {
            result = &mut finished => break result,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || !matches!(*shutdown_rx.borrow(), ShutdownSignal::None) {
                    generator.stop();
                }
            }
        }
    };

    // the publisher has to wind down and remove its socket even when the track failed
    let _ = shutdown_tx.send(ShutdownSignal::Graceful);

    if let Some(summary) = outcome? {
        logging::info(
            "simulator.track_finished",
            "Track finished",
            json!({
                "samples": summary.samples,
                "sink_failures": summary.sink_failures,
                "reason": format!("{:?}", summary.reason),
            }),
        );
    }
    Ok(())
}

async fn run_socket_server(
    config: Arc<SimulatorConfig>,
    sender: broadcast::Sender<Sample>,
    mut shutdown: watch::Receiver<ShutdownSignal>,
) -> Result<()> {
    let socket_path = config.socket_path.clone();
    cleanup_socket_path(&socket_path)?;
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("failed to bind unix socket at {:?}", socket_path))?;
    logging::info(
        "socket.bind",
        "Listening for sample subscribers",
        json!({ "path": socket_path.display().to_string() }),
    );

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, _) = accept_result?;
                let mut receiver = sender.subscribe();
                tokio::spawn(async move {
                    if let Err(err) = forward_samples_to_client(stream, &mut receiver).await {
                        logging::warn(
                            "socket.stream_error",
                            "Sample stream task ended with error",
                            json!({ "error": format!("{err:?}") })
                        );
                    }
                });
            }
            _ = shutdown.changed() => {
                match *shutdown.borrow() {
                    ShutdownSignal::None => continue,
                    ShutdownSignal::Graceful => {
                        logging::info_simple("socket.shutdown", "Socket server shutting down gracefully");
                        break;
                    }
                    ShutdownSignal::Immediate => {
                        logging::warn_simple("socket.shutdown", "Socket server stopping immediately");
                        break;
                    }
                }
            }
        }
    }

    drop(sender);
    cleanup_socket_path(&socket_path)?;
    logging::info(
        "socket.cleanup",
        "Socket removed after shutdown",
        json!({ "path": socket_path.display().to_string() }),
    );
    Ok(())
}

async fn forward_samples_to_client(
    mut stream: UnixStream,
    receiver: &mut broadcast::Receiver<Sample>,
) -> Result<()> {
    loop {
        match receiver.recv().await {
            Ok(sample) => {
                let mut payload = serde_json::to_vec(&sample)?;
                payload.push(b'\n');
                if let Err(err) = stream.write_all(&payload).await {
                    if is_disconnect(&err) {
                        logging::info(
                            "socket.client_disconnect",
                            "Sample subscriber disconnected",
                            json!({ "reason": err.kind().to_string() }),
                        );
                        break;
                    }
                    return Err(err.into());
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                logging::warn(
                    "socket.lagged",
                    "Subscriber lagged sample messages",
                    json!({ "skipped": skipped }),
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

fn cleanup_socket_path(socket_path: &Path) -> Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)
            .with_context(|| format!("failed to remove old socket at {:?}", socket_path))?;
    }
    Ok(())
}

pub mod testkit {
    use super::*;

    /// Runs a generator at `config.start` and returns its first `count` samples.
    pub async fn collect_samples(mut config: SimulatorConfig, count: usize) -> Result<Vec<Sample>> {
        config.enable_socket = false;
        config.max_samples = None;

        let start = config.start;
        let generator = TrackGenerator::new(config)?;
        let (sample_sender, _) = broadcast::channel::<Sample>(SAMPLE_CHANNEL_CAPACITY);
        let mut receiver = sample_sender.subscribe();

        generator.start(start, BroadcastSink::new(sample_sender))?;

        let mut collected = Vec::with_capacity(count);
        while collected.len() < count {
            collected.push(receiver.recv().await?);
        }

        generator.shutdown().await?;
        Ok(collected)
    }
}
