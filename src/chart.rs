use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Args, ValueEnum};
use textplots::{Chart, Plot, Shape};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{self, Instant};

use crate::constants::SOCKET_PATH;
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Metric {
    /// Latitude against longitude
    Track,
    /// Speed in m/s over time
    Speed,
    /// Heading in degrees over time
    Heading,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::Track => "track",
            Metric::Speed => "speed",
            Metric::Heading => "heading",
        })
    }
}

#[derive(Debug, Args, Clone)]
pub struct ChartArgs {
    /// Number of seconds to collect data before plotting
    #[arg(short, long, default_value_t = 30)]
    pub duration_secs: u64,

    /// Plot only samples from this device
    #[arg(long)]
    pub device: Option<String>,

    /// What to plot
    #[arg(short, long, value_enum, default_value_t = Metric::Track)]
    pub metric: Metric,

    /// Chart width in characters
    #[arg(long, default_value_t = 120)]
    pub width: u32,

    /// Chart height in characters
    #[arg(long, default_value_t = 30)]
    pub height: u32,

    /// Unix socket the generator publishes on
    #[arg(long, default_value = SOCKET_PATH)]
    pub socket: PathBuf,
}

pub async fn run(args: ChartArgs) -> Result<()> {
    let duration = Duration::from_secs(args.duration_secs);
    let collected = collect_samples(&args.socket, duration, args.device.as_deref()).await?;

    if collected.len() < 2 {
        bail!("not enough samples collected; ensure the generator is running and emitting data");
    }

    let points = series(&collected, args.metric);
    render_chart(args.metric, &points, args.width, args.height);
    Ok(())
}

async fn collect_samples(
    socket: &Path,
    duration: Duration,
    device_filter: Option<&str>,
) -> Result<Vec<Sample>> {
    let stream = UnixStream::connect(socket).await.with_context(|| {
        format!(
            "failed to connect to socket {:?}; run `gps-track-sim run` first",
            socket
        )
    })?;

    let mut lines = BufReader::new(stream).lines();
    let deadline = Instant::now() + duration;
    let mut samples = Vec::new();

    println!(
        "Collecting samples for {}s{}...",
        duration.as_secs(),
        device_filter
            .map(|device| format!(" (filtering for {device})"))
            .unwrap_or_default()
    );

    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break;
        };
        if remaining.is_zero() {
            break;
        }

        match time::timeout(remaining, lines.next_line()).await {
            Ok(line_result) => match line_result? {
                Some(line) => {
                    let sample: Sample = serde_json::from_str(&line)?;
                    if device_filter.is_some_and(|device| device != sample.device_id) {
                        continue;
                    }
                    samples.push(sample);
                }
                None => break,
            },
            Err(_) => break,
        }
    }

    Ok(samples)
}

/// Turns samples into `(x, y)` pairs; time-based metrics use seconds since the first sample.
fn series(samples: &[Sample], metric: Metric) -> Vec<(f64, f64)> {
    if metric == Metric::Track {
        return samples
            .iter()
            .map(|sample| (sample.longitude, sample.latitude))
            .collect();
    }

    let origin = samples
        .first()
        .and_then(|sample| DateTime::parse_from_rfc3339(&sample.timestamp).ok());
    samples
        .iter()
        .enumerate()
        .map(|(idx, sample)| {
            let elapsed = match (origin, DateTime::parse_from_rfc3339(&sample.timestamp)) {
                (Some(origin), Ok(at)) => {
                    (at - origin).num_microseconds().unwrap_or_default() as f64 / 1e6
                }
                _ => idx as f64,
            };
            let value = match metric {
                Metric::Speed => sample.speed,
                _ => sample.heading,
            };
            (elapsed, value)
        })
        .collect()
}

fn render_chart(metric: Metric, points: &[(f64, f64)], width: u32, height: u32) {
    let (x_min, x_max) = bounds(points.iter().map(|(x, _)| *x));
    let (y_min, y_max) = bounds(points.iter().map(|(_, y)| *y));

    match metric {
        Metric::Track => {
            println!("Rendering track ({} samples)", points.len());
            println!("Longitude: {x_min:.6} → {x_max:.6}");
            println!("Latitude:  {y_min:.6} → {y_max:.6}");
        }
        Metric::Speed => {
            println!("Rendering speed over ~{x_max:.0}s ({} samples)", points.len());
            println!("Speed range: {y_min:.2} → {y_max:.2} m/s");
        }
        Metric::Heading => {
            println!("Rendering heading over ~{x_max:.0}s ({} samples)", points.len());
            println!("Heading range: {y_min:.2}° → {y_max:.2}°");
        }
    }

    // textplots works in f32; shift the track to its own origin so tiny steps survive
    let samples: Vec<(f32, f32)> = points
        .iter()
        .map(|(x, y)| ((x - x_min) as f32, (y - y_min) as f32))
        .collect();
    let span = ((x_max - x_min) as f32).max(1e-6);

    let plot_width = width.max(40);
    let plot_height = height.max(10);

    Chart::new(plot_width, plot_height, 0.0, span)
        .lineplot(&Shape::Lines(&samples))
        .display();
    println!();
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
        (lo.min(value), hi.max(value))
    })
}
