use crate::trajectory::{Trajectory, TrajectoryError};
use thiserror::Error;
use uom::si::{angle::degree, f64::Angle};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HeadingError {
    #[error("trajectory `{key}` has {samples} sample(s), a heading needs at least two")]
    InsufficientTrajectoryData { key: String, samples: usize },
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

/// A compass bearing, clockwise from north.
///
/// The angle is always on the range [0, 360) degrees.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Heading {
    degrees: f64,
}

impl Heading {
    /// Creates a new `Heading` from `degrees` wrapped onto [0, 360).
    pub fn from_degrees_wrapped(degrees: f64) -> Self {
        let mut degrees = degrees.rem_euclid(360.0);

        // Tiny negative inputs round up to exactly 360.
        if degrees >= 360.0 {
            degrees = 0.0;
        }

        Self { degrees }
    }

    /// Like [`Heading::from_degrees_wrapped`] but rejects NaN and infinities.
    pub fn try_from_degrees(degrees: f64) -> Option<Self> {
        match degrees.is_finite() {
            true => Some(Self::from_degrees_wrapped(degrees)),
            false => None,
        }
    }

    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    /// Returns the signed shortest rotation from `self` to `other` in degrees.
    ///
    /// The result is on the range (-180, 180], positive clockwise.
    pub fn signed_offset_to(&self, other: Heading) -> f64 {
        let delta = (other.degrees - self.degrees).rem_euclid(360.0);
        match delta > 180.0 {
            true => delta - 360.0,
            false => delta,
        }
    }

    /// Returns the unsigned angle between `self` and `other` in degrees.
    pub fn angle_to(&self, other: Heading) -> f64 {
        self.signed_offset_to(other).abs()
    }
}

impl std::ops::Add<Angle> for Heading {
    type Output = Self;

    fn add(self, other: Angle) -> Self::Output {
        Self::from_degrees_wrapped(self.degrees + other.get::<degree>())
    }
}

impl std::ops::Sub<Angle> for Heading {
    type Output = Self;

    fn sub(self, other: Angle) -> Self::Output {
        Self::from_degrees_wrapped(self.degrees - other.get::<degree>())
    }
}

impl std::ops::Sub for Heading {
    type Output = Angle;

    /// Signed shortest rotation that takes `other` onto `self`.
    fn sub(self, other: Self) -> Self::Output {
        Angle::new::<degree>(other.signed_offset_to(self))
    }
}

impl std::fmt::Display for Heading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}°", self.degrees)
    }
}

/// Estimates the direction of travel along a trajectory.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeadingEstimator {
    window: usize,
}

impl HeadingEstimator {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Bearing from the first to the last sample within `window` frames of
    /// `frame_number`, with the span clamped to the trajectory.
    ///
    /// A span that collapses to one sample is widened to the nearest
    /// two-sample span.
    pub fn heading(
        &self,
        trajectory: &Trajectory,
        frame_number: usize,
    ) -> Result<Heading, HeadingError> {
        trajectory.checked_sample(frame_number)?;

        let len = trajectory.len();
        if len < 2 {
            return Err(HeadingError::InsufficientTrajectoryData {
                key: trajectory.key().to_owned(),
                samples: len,
            });
        }

        let mut first = frame_number.saturating_sub(self.window);
        let mut last = frame_number.saturating_add(self.window).min(len - 1);
        if first == last {
            match last + 1 < len {
                true => last += 1,
                false => first -= 1,
            }
        }

        let from = trajectory.samples()[first].position();
        let to = trajectory.samples()[last].position();
        Ok(from.bearing_to(&to))
    }
}
