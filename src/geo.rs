//! Great-circle helpers on a spherical Earth.
//!
//! Everything here is pure: degrees in, metres or degrees out.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::constants::EARTH_RADIUS_M;
use crate::error::TrackError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(TrackError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Haversine distance in metres.
///
/// Uses `asin(sqrt(h))` rather than the spherical law of cosines so that
/// sub-metre separations keep their precision.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // rounding can push h a hair past 1 for antipodal points
    EARTH_RADIUS_M * 2.0 * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Initial great-circle bearing from `a` towards `b`, in `[0, 360)`.
///
/// Identical points yield `atan2(0, 0) == 0`, so the degenerate case reads as north.
pub fn bearing_degrees(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let x = d_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    (x.atan2(y).to_degrees() + 360.0) % 360.0
}

/// What to do when the walk leaves the valid latitude/longitude ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Pin latitude at the poles; longitude wraps across the antimeridian.
    #[default]
    Clamp,
    /// Walk over the pole: latitude reflects and longitude flips by 180°.
    Wrap,
    /// No correction at all.
    Unbounded,
}

impl BoundaryPolicy {
    pub fn apply(self, coordinate: Coordinate) -> Coordinate {
        match self {
            BoundaryPolicy::Unbounded => coordinate,
            BoundaryPolicy::Clamp => Coordinate::new(
                coordinate.latitude.clamp(-90.0, 90.0),
                wrap_longitude(coordinate.longitude),
            ),
            BoundaryPolicy::Wrap => {
                let (latitude, longitude) = if coordinate.latitude > 90.0 {
                    (180.0 - coordinate.latitude, coordinate.longitude + 180.0)
                } else if coordinate.latitude < -90.0 {
                    (-180.0 - coordinate.latitude, coordinate.longitude + 180.0)
                } else {
                    (coordinate.latitude, coordinate.longitude)
                };
                Coordinate::new(latitude, wrap_longitude(longitude))
            }
        }
    }
}

impl fmt::Display for BoundaryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BoundaryPolicy::Clamp => "clamp",
            BoundaryPolicy::Wrap => "wrap",
            BoundaryPolicy::Unbounded => "unbounded",
        };
        f.write_str(label)
    }
}

fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        return longitude;
    }
    (longitude + 180.0).rem_euclid(360.0) - 180.0
}
