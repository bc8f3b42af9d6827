use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

const COORDINATE_DECIMALS: i32 = 6;
const MOTION_DECIMALS: i32 = 2;

/// One emitted location report, already rounded for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub device_id: String,
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: f64,
}

impl Sample {
    pub fn new(
        device_id: impl Into<String>,
        emitted_at: DateTime<Utc>,
        position: Coordinate,
        speed: f64,
        heading: f64,
    ) -> Self {
        let heading = round_to(heading, MOTION_DECIMALS);
        Self {
            device_id: device_id.into(),
            timestamp: format_timestamp(emitted_at),
            latitude: round_to(position.latitude, COORDINATE_DECIMALS),
            longitude: round_to(position.longitude, COORDINATE_DECIMALS),
            speed: round_to(speed, MOTION_DECIMALS),
            // 359.996 rounds up to 360.00, which is north again
            heading: if heading >= 360.0 { 0.0 } else { heading },
        }
    }

    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// ISO-8601 UTC with microsecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
