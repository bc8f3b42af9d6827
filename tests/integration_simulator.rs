use std::time::Duration;

use gps_track_sim::geo::Coordinate;
use gps_track_sim::logging;
use gps_track_sim::simulator::{self, SimulatorConfig, SinkFailurePolicy};
use gps_track_sim::Sample;

fn fractional_digits(value: f64) -> usize {
    value
        .to_string()
        .split_once('.')
        .map_or(0, |(_, frac)| frac.len())
}

fn fast_config(seed: Option<u64>) -> SimulatorConfig {
    SimulatorConfig {
        tick_interval: Duration::from_millis(5),
        enable_socket: false,
        seed,
        ..SimulatorConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simulator_generates_samples_without_socket() {
    logging::set_silent(true);

    let samples = simulator::testkit::collect_samples(fast_config(None), 32)
        .await
        .expect("collect samples");

    assert_eq!(samples.len(), 32, "expected to capture 32 samples");
    let mut last_timestamp = String::new();
    let mut previous = SimulatorConfig::default().start;
    for sample in samples {
        assert_eq!(sample.device_id, "mock_tracker_01");
        assert!(sample.timestamp.ends_with('Z'));
        assert!(
            sample.timestamp > last_timestamp,
            "timestamps should be strictly increasing"
        );
        last_timestamp = sample.timestamp.clone();

        assert!(sample.speed.is_finite() && sample.speed >= 0.0);
        assert!((0.0..360.0).contains(&sample.heading));
        assert!(fractional_digits(sample.latitude) <= 6);
        assert!(fractional_digits(sample.longitude) <= 6);
        assert!(fractional_digits(sample.speed) <= 2);
        assert!(fractional_digits(sample.heading) <= 2);

        let position = sample.position();
        assert!((position.latitude - previous.latitude).abs() <= 0.0001 + 2e-6);
        assert!((position.longitude - previous.longitude).abs() <= 0.0001 + 2e-6);
        previous = position;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn seeded_tracks_are_reproducible() {
    logging::set_silent(true);

    let first = simulator::testkit::collect_samples(fast_config(Some(0xBADF00D)), 16)
        .await
        .expect("first run");
    let second = simulator::testkit::collect_samples(fast_config(Some(0xBADF00D)), 16)
        .await
        .expect("second run");

    let track = |samples: &[gps_track_sim::Sample]| -> Vec<Coordinate> {
        samples.iter().map(|sample| sample.position()).collect()
    };
    assert_eq!(track(&first), track(&second));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_track_shuts_down_the_publisher() {
    logging::set_silent(true);

    let socket_path =
        std::env::temp_dir().join(format!("gps-track-sim-{}.sock", std::process::id()));
    let config = SimulatorConfig {
        tick_interval: Duration::from_millis(10),
        on_sink_error: SinkFailurePolicy::Stop,
        socket_path: socket_path.clone(),
        enable_socket: true,
        ..SimulatorConfig::default()
    };
    let failing = |_: Sample| -> anyhow::Result<()> { Err(anyhow::anyhow!("disk full")) };

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        simulator::run_with_sink(config, failing),
    )
    .await
    .expect("runner should return once the track fails");

    assert!(outcome.is_err(), "sink failure should surface from the runner");
    assert!(!socket_path.exists(), "socket should be removed on the way out");
}
