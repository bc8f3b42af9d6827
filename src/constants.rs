pub const SOCKET_PATH: &str = "gps_samples.sock";
pub const TICK_INTERVAL_MS: u64 = 1_000;
pub const STEP_DEGREES: f64 = 0.0001;
pub const MAX_STEP_DEGREES: f64 = 90.0;
pub const DEVICE_ID: &str = "mock_tracker_01";
pub const START_LATITUDE: f64 = 12.9356;
pub const START_LONGITUDE: f64 = 77.6145;
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const SAMPLE_CHANNEL_CAPACITY: usize = 1_024;
