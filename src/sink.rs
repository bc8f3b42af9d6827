//! Where samples go once the generator has built them.
//!
//! The generator calls [`SampleSink::deliver`] once per tick on its worker
//! task. Anything that can run off the controlling thread qualifies: a
//! closure, a broadcast channel, a writer, or a bounded queue in front of a
//! slow consumer.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};

use crate::logging;
use crate::sample::Sample;

pub trait SampleSink: Send + 'static {
    fn deliver(&mut self, sample: Sample) -> Result<()>;
}

impl<F> SampleSink for F
where
    F: FnMut(Sample) -> Result<()> + Send + 'static,
{
    fn deliver(&mut self, sample: Sample) -> Result<()> {
        self(sample)
    }
}

/// Publishes into a broadcast channel. Having no subscribers is not a failure.
#[derive(Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<Sample>,
}

impl BroadcastSink {
    pub fn new(sender: broadcast::Sender<Sample>) -> Self {
        Self { sender }
    }
}

impl SampleSink for BroadcastSink {
    fn deliver(&mut self, sample: Sample) -> Result<()> {
        let _ = self.sender.send(sample);
        Ok(())
    }
}

/// Newline-delimited JSON, flushed per sample.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> SampleSink for JsonLinesSink<W> {
    fn deliver(&mut self, sample: Sample) -> Result<()> {
        let mut line = serde_json::to_vec(&sample).context("serialize sample")?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Hands each sample to every inner sink in order.
///
/// All sinks see the sample even if an earlier one fails; the first error is returned.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn SampleSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl SampleSink) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl SampleSink for FanoutSink {
    fn deliver(&mut self, sample: Sample) -> Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(err) = sink.deliver(sample.clone()) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Front half of [`decoupled`]: never blocks, drops samples when the queue is full.
#[derive(Clone)]
pub struct QueuedSink {
    sender: mpsc::Sender<Sample>,
    dropped: Arc<AtomicU64>,
}

impl QueuedSink {
    /// Samples discarded so far because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SampleSink for QueuedSink {
    fn deliver(&mut self, sample: Sample) -> Result<()> {
        match self.sender.try_send(sample) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                logging::warn(
                    "sink.queue_full",
                    "Sample queue full, dropping sample",
                    json!({ "dropped_total": dropped }),
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(anyhow!("sample forwarder is no longer running"))
            }
        }
    }
}

/// Puts a bounded queue between the generator and a slow `inner` sink.
///
/// `inner` runs on its own thread; the returned handle finishes once every
/// clone of the [`QueuedSink`] has been dropped and the queue is drained.
pub fn decoupled<S: SampleSink>(
    mut inner: S,
    capacity: usize,
) -> Result<(QueuedSink, JoinHandle<()>)> {
    let (sender, mut receiver) = mpsc::channel::<Sample>(capacity.max(1));
    let handle = std::thread::Builder::new()
        .name("sample-forwarder".into())
        .spawn(move || {
            while let Some(sample) = receiver.blocking_recv() {
                if let Err(err) = inner.deliver(sample) {
                    logging::warn(
                        "sink.forward_error",
                        "Queued sink failed to deliver sample",
                        json!({ "error": format!("{err:#}") }),
                    );
                }
            }
        })
        .context("failed to spawn sample forwarder thread")?;

    Ok((
        QueuedSink {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        handle,
    ))
}
