use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::TrackError;
use crate::geo::Coordinate;
use crate::logging;
use crate::sample::Sample;
use crate::sink::SampleSink;

use super::walk::{RandomWalk, TrackState};
use super::{SimulatorConfig, SinkFailurePolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    SampleLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub samples: u64,
    pub sink_failures: u64,
    pub reason: StopReason,
}

/// Drives one random-walk track on a background tokio task.
///
/// `start` while a track is live and `stop` while idle are both no-ops. The
/// controlling side only ever flips the run flag; position state lives on
/// the worker.
pub struct TrackGenerator {
    config: Arc<SimulatorConfig>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    running: watch::Sender<bool>,
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<RunSummary, TrackError>>>,
}

impl Worker {
    fn is_live(&self) -> bool {
        *self.running.borrow() && self.active.load(Ordering::Acquire)
    }
}

/// Clears the worker's `active` flag however the task ends, panics included.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TrackGenerator {
    pub fn new(config: SimulatorConfig) -> Result<Self, TrackError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            worker: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker().as_ref().is_some_and(Worker::is_live)
    }

    /// Begins emitting samples from `initial` into `sink`.
    ///
    /// Must be called from within a tokio runtime. Out-of-range coordinates
    /// are rejected before anything is spawned.
    pub fn start<S: SampleSink>(&self, initial: Coordinate, sink: S) -> Result<(), TrackError> {
        let mut slot = self.lock_worker();
        if slot.as_ref().is_some_and(Worker::is_live) {
            logging::info(
                "generator.already_running",
                "Start ignored, a track is already running",
                json!({ "device_id": self.config.device_id }),
            );
            return Ok(());
        }

        initial.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TrackError::NoRuntime)?;
        let walk = RandomWalk::new(self.config.step_degrees, self.config.boundary, self.config.seed)?;

        let (running_tx, running_rx) = watch::channel(true);
        let active = Arc::new(AtomicBool::new(true));
        let handle = runtime.spawn(run_track(
            Arc::clone(&self.config),
            initial,
            walk,
            sink,
            running_rx,
            ActiveGuard(Arc::clone(&active)),
        ));

        logging::info(
            "generator.start",
            "Track generator started",
            json!({
                "device_id": self.config.device_id,
                "latitude": initial.latitude,
                "longitude": initial.longitude,
                "interval_ms": self.config.tick_interval.as_millis() as u64,
                "seed": self.config.seed,
                "boundary": self.config.boundary.to_string(),
            }),
        );

        *slot = Some(Worker {
            running: running_tx,
            active,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Asks the worker to finish. It exits at its next wake-up without emitting again.
    pub fn stop(&self) {
        if let Some(worker) = self.lock_worker().as_ref() {
            if worker.is_live() {
                worker.running.send_replace(false);
            }
        }
    }

    /// Waits for the current worker to end on its own (sample limit, sink failure, or `stop`).
    pub async fn wait(&self) -> Result<Option<RunSummary>, TrackError> {
        let handle = self
            .lock_worker()
            .as_mut()
            .and_then(|worker| worker.handle.take());
        match handle {
            Some(handle) => Ok(Some(handle.await??)),
            None => Ok(None),
        }
    }

    /// `stop` followed by `wait`.
    pub async fn shutdown(&self) -> Result<Option<RunSummary>, TrackError> {
        self.stop();
        self.wait().await
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        // the slot holds plain handles, a poisoned lock is still consistent
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_track<S: SampleSink>(
    config: Arc<SimulatorConfig>,
    initial: Coordinate,
    mut walk: RandomWalk,
    mut sink: S,
    mut running: watch::Receiver<bool>,
    _active: ActiveGuard,
) -> Result<RunSummary, TrackError> {
    let interval = config.tick_interval;
    let started = Instant::now();
    let mut state = TrackState::new(initial, started);

    let mut ticker = time::interval_at(started + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut samples: u64 = 0;
    let mut sink_failures: u64 = 0;
    let mut reason = StopReason::Requested;

    loop {
        if !*running.borrow() {
            break;
        }

        tokio::select! {
            biased;
            changed = running.changed() => {
                if changed.is_err() || !*running.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let step = state.advance(&mut walk, Instant::now());
        let sample = Sample::new(
            config.device_id.as_str(),
            Utc::now(),
            step.position,
            step.speed_mps,
            step.heading_deg,
        );
        samples += 1;

        if let Err(err) = sink.deliver(sample) {
            sink_failures += 1;
            match config.on_sink_error {
                SinkFailurePolicy::Continue => {
                    logging::warn(
                        "generator.sink_error",
                        "Sink rejected sample, continuing with next tick",
                        json!({ "tick": samples, "error": format!("{err:#}") }),
                    );
                }
                SinkFailurePolicy::Stop => {
                    logging::error(
                        "generator.sink_error",
                        "Sink rejected sample, stopping track",
                        json!({ "tick": samples, "error": format!("{err:#}") }),
                    );
                    return Err(TrackError::Sink(err));
                }
            }
        }

        if config.max_samples.is_some_and(|max| samples >= max) {
            logging::info(
                "generator.limit",
                "Track generator reached its sample budget",
                json!({ "max_samples": config.max_samples }),
            );
            reason = StopReason::SampleLimit;
            break;
        }
    }

    logging::info(
        "generator.stop",
        "Track generator stopped",
        json!({
            "device_id": config.device_id,
            "samples": samples,
            "sink_failures": sink_failures,
            "last_latitude": state.current().latitude,
            "last_longitude": state.current().longitude,
        }),
    );

    Ok(RunSummary {
        samples,
        sink_failures,
        reason,
    })
}
