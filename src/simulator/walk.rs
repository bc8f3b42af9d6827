use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Uniform;
use tokio::time::Instant;

use crate::constants::MAX_STEP_DEGREES;
use crate::error::TrackError;
use crate::geo::{bearing_degrees, distance_meters, BoundaryPolicy, Coordinate};

/// Independent uniform perturbation of each axis, `±step_degrees` per tick.
pub struct RandomWalk {
    step: Uniform<f64>,
    boundary: BoundaryPolicy,
    rng: StdRng,
}

impl RandomWalk {
    pub fn new(
        step_degrees: f64,
        boundary: BoundaryPolicy,
        seed: Option<u64>,
    ) -> Result<Self, TrackError> {
        check_step(step_degrees)?;

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            step: Uniform::new_inclusive(-step_degrees, step_degrees),
            boundary,
            rng,
        })
    }

    pub fn perturb(&mut self, from: Coordinate) -> Coordinate {
        let latitude = from.latitude + self.rng.sample(&self.step);
        let longitude = from.longitude + self.rng.sample(&self.step);
        self.boundary.apply(Coordinate::new(latitude, longitude))
    }
}

/// A single step may cross a pole at most once, which keeps every boundary policy in range.
pub(crate) fn check_step(step_degrees: f64) -> Result<(), TrackError> {
    if step_degrees.is_finite() && (0.0..=MAX_STEP_DEGREES).contains(&step_degrees) {
        Ok(())
    } else {
        Err(TrackError::InvalidConfig(format!(
            "step size must be between 0 and {MAX_STEP_DEGREES} degrees (got {step_degrees})"
        )))
    }
}

/// Motion derived for a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub position: Coordinate,
    pub elapsed: Duration,
    pub distance_m: f64,
    pub speed_mps: f64,
    pub heading_deg: f64,
}

/// Position memory of one running track. Only the worker owns and mutates it.
#[derive(Debug, Clone)]
pub struct TrackState {
    current: Coordinate,
    previous: Coordinate,
    last_tick: Instant,
}

impl TrackState {
    pub fn new(initial: Coordinate, now: Instant) -> Self {
        Self {
            current: initial,
            previous: initial,
            last_tick: now,
        }
    }

    pub fn current(&self) -> Coordinate {
        self.current
    }

    pub fn previous(&self) -> Coordinate {
        self.previous
    }

    pub fn advance(&mut self, walk: &mut RandomWalk, now: Instant) -> Step {
        self.current = walk.perturb(self.current);

        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;

        let distance_m = distance_meters(self.previous, self.current);
        let seconds = elapsed.as_secs_f64();
        let speed_mps = if seconds > 0.0 {
            distance_m / seconds
        } else {
            0.0
        };
        let heading_deg = bearing_degrees(self.previous, self.current);

        self.previous = self.current;

        Step {
            position: self.current,
            elapsed,
            distance_m,
            speed_mps,
            heading_deg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::STEP_DEGREES;

    const START: Coordinate = Coordinate::new(12.9356, 77.6145);

    fn walk(seed: u64) -> RandomWalk {
        RandomWalk::new(STEP_DEGREES, BoundaryPolicy::Clamp, Some(seed)).expect("valid walk")
    }

    fn positions(seed: u64, ticks: usize) -> Vec<Coordinate> {
        let mut walk = walk(seed);
        let origin = Instant::now();
        let mut state = TrackState::new(START, origin);
        (1..=ticks)
            .map(|tick| {
                state
                    .advance(&mut walk, origin + Duration::from_secs(tick as u64))
                    .position
            })
            .collect()
    }

    #[test]
    fn seeded_walk_is_reproducible() {
        let first = positions(0x5EED, 64);
        let second = positions(0x5EED, 64);
        assert_eq!(first, second);

        let other = positions(0xF00D, 64);
        assert_ne!(first, other);
    }

    #[test]
    fn each_axis_moves_at_most_one_step() {
        let mut walk = walk(7);
        let mut position = START;
        for _ in 0..1_000 {
            let next = walk.perturb(position);
            assert!((next.latitude - position.latitude).abs() <= STEP_DEGREES + 1e-12);
            assert!((next.longitude - position.longitude).abs() <= STEP_DEGREES + 1e-12);
            position = next;
        }
    }

    #[test]
    fn speed_is_distance_over_elapsed() {
        let mut walk = walk(42);
        let origin = Instant::now();
        let mut state = TrackState::new(START, origin);

        let step = state.advance(&mut walk, origin + Duration::from_secs(2));
        assert_eq!(step.elapsed, Duration::from_secs(2));
        assert!((step.speed_mps - step.distance_m / 2.0).abs() < 1e-12);
        assert!((0.0..360.0).contains(&step.heading_deg));
        assert_eq!(step.distance_m, distance_meters(START, step.position));
    }

    #[test]
    fn zero_elapsed_tick_reports_zero_speed() {
        let mut walk = walk(42);
        let origin = Instant::now();
        let mut state = TrackState::new(START, origin);

        let step = state.advance(&mut walk, origin);
        assert_eq!(step.elapsed, Duration::ZERO);
        assert_eq!(step.speed_mps, 0.0);
        assert!(step.speed_mps.is_finite());
    }

    #[test]
    fn previous_is_a_copy_of_current() {
        let mut walk = walk(3);
        let origin = Instant::now();
        let mut state = TrackState::new(START, origin);
        assert_eq!(state.previous(), START);

        let step = state.advance(&mut walk, origin + Duration::from_secs(1));
        assert_eq!(state.previous(), step.position);
        assert_eq!(state.current(), step.position);

        let after = state.advance(&mut walk, origin + Duration::from_secs(2));
        assert_eq!(state.previous(), after.position);
        assert_ne!(step.position, after.position);
    }

    #[test]
    fn zero_step_stands_still() {
        let mut walk = RandomWalk::new(0.0, BoundaryPolicy::Unbounded, Some(1)).unwrap();
        let origin = Instant::now();
        let mut state = TrackState::new(START, origin);
        let step = state.advance(&mut walk, origin + Duration::from_secs(1));
        assert_eq!(step.position, START);
        assert_eq!(step.distance_m, 0.0);
        assert_eq!(step.speed_mps, 0.0);
        assert_eq!(step.heading_deg, 0.0);
    }

    #[test]
    fn rejects_invalid_step() {
        assert!(RandomWalk::new(-0.1, BoundaryPolicy::Clamp, None).is_err());
        assert!(RandomWalk::new(f64::NAN, BoundaryPolicy::Clamp, None).is_err());
        assert!(RandomWalk::new(90.5, BoundaryPolicy::Wrap, None).is_err());
        assert!(matches!(
            RandomWalk::new(1e308, BoundaryPolicy::Clamp, None),
            Err(TrackError::InvalidConfig(_))
        ));
        assert!(RandomWalk::new(MAX_STEP_DEGREES, BoundaryPolicy::Clamp, None).is_ok());
    }

    #[test]
    fn widest_step_stays_in_range_for_bounded_policies() {
        for policy in [BoundaryPolicy::Clamp, BoundaryPolicy::Wrap] {
            let mut walk = RandomWalk::new(MAX_STEP_DEGREES, policy, Some(1)).unwrap();
            let mut position = Coordinate::new(89.0, 179.0);
            for tick in 0..1_000 {
                position = walk.perturb(position);
                assert!(position.is_valid(), "{policy} tick {tick}: {position}");
            }
        }
    }

    #[test]
    fn clamp_keeps_walk_inside_valid_range_near_pole() {
        let mut walk = walk(11);
        let origin = Instant::now();
        let mut state = TrackState::new(Coordinate::new(89.99995, 179.99995), origin);
        for tick in 1..=500u64 {
            let step = state.advance(&mut walk, origin + Duration::from_secs(tick));
            assert!(step.position.is_valid(), "tick {tick}: {}", step.position);
        }
    }
}
