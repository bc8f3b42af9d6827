use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::net::UnixStream;

use crate::constants::SOCKET_PATH;
use crate::sample::Sample;

#[derive(Debug, Args, Clone)]
pub struct TailArgs {
    /// Only print samples from this device
    #[arg(short, long)]
    pub device: Option<String>,

    /// Stop after printing this many samples
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Unix socket the generator publishes on
    #[arg(long, default_value = SOCKET_PATH)]
    pub socket: PathBuf,
}

pub async fn run(args: TailArgs) -> Result<()> {
    let stream = UnixStream::connect(&args.socket).await.with_context(|| {
        format!(
            "failed to connect to socket {:?}; run `gps-track-sim run` first",
            args.socket
        )
    })?;

    println!("Connected to {}; streaming samples...", args.socket.display());
    let mut lines = BufReader::new(stream).lines();
    stream_rows(&mut lines, args.device.as_deref(), args.limit, |sample| {
        println!("{}", format_row(sample));
    })
    .await?;
    Ok(())
}

/// Reads samples until the stream ends or `limit` rows have been emitted.
async fn stream_rows<R>(
    lines: &mut Lines<R>,
    device: Option<&str>,
    limit: Option<usize>,
    mut emit: impl FnMut(&Sample),
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut printed = 0usize;
    while limit.map_or(true, |limit| printed < limit) {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let sample: Sample = serde_json::from_str(&line)?;
        if device.is_some_and(|device| device != sample.device_id) {
            continue;
        }
        emit(&sample);
        printed += 1;
    }
    Ok(printed)
}

fn format_row(sample: &Sample) -> String {
    format!(
        "{:>27} | {:>16} | {:>11.6} | {:>11.6} | {:>7.2} m/s | {:>6.2}°",
        sample.timestamp,
        sample.device_id,
        sample.latitude,
        sample.longitude,
        sample.speed,
        sample.heading
    )
}
