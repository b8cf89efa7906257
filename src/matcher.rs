use crate::{
    footprint::{Footprint, ObjectId},
    geo::{GeoPoint, LocalOffset},
    heading::Heading,
    trajectory::Trajectory,
};
use rayon::prelude::*;
use std::borrow::Borrow;
use tracing::debug;
use uom::si::{f64::Angle, f64::Length, length::meter};

/// Distances closer than this are treated as equal, in meters.
const DISTANCE_TOLERANCE_M: f64 = 1e-9;

/// A footprint paired with the trajectory sample nearest to it.
#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub object_id: ObjectId,
    pub centroid: GeoPoint,
    pub matched_file: String,
    pub frame_number: usize,
    /// Meters east from the vehicle to the centroid.
    pub vehicle_x: f64,
    /// Meters north from the vehicle to the centroid.
    pub vehicle_y: f64,
}

impl Match {
    pub fn vehicle_offset(&self) -> LocalOffset {
        LocalOffset::new(self.vehicle_x, self.vehicle_y)
    }

    pub fn with_orientation(self, orientation: Heading) -> OrientedMatch {
        OrientedMatch {
            matched: self,
            orientation,
        }
    }
}

/// A [`Match`] with the vehicle heading at its frame.
#[derive(Clone, Debug, PartialEq)]
pub struct OrientedMatch {
    pub matched: Match,
    pub orientation: Heading,
}

impl OrientedMatch {
    /// Direction of the footprint relative to the direction of travel,
    /// positive clockwise.
    pub fn view_direction(&self) -> Angle {
        self.matched.vehicle_offset().bearing() - self.orientation
    }
}

/// Outcome of matching a batch of footprints.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchReport {
    pub matches: Vec<Match>,
    /// Footprints with no trajectory sample inside the buffer.
    pub unmatched: Vec<ObjectId>,
}

struct Candidate<'a> {
    key: &'a str,
    frame_number: usize,
    position: GeoPoint,
    distance_m: f64,
}

impl Candidate<'_> {
    fn is_better_than(&self, other: &Candidate) -> bool {
        match (self.distance_m - other.distance_m).abs() <= DISTANCE_TOLERANCE_M {
            true => (self.key, self.frame_number) < (other.key, other.frame_number),
            false => self.distance_m < other.distance_m,
        }
    }
}

/// Pairs footprints with the closest trajectory sample within a buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FootprintMatcher {
    buffer: Length,
}

impl FootprintMatcher {
    pub fn new(buffer: Length) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> Length {
        self.buffer
    }

    /// Finds the sample nearest to `footprint` across `trajectories`.
    ///
    /// Equidistant samples resolve to the smallest trajectory key, then the
    /// smallest frame number. Returns `None` if the nearest sample is
    /// farther than the buffer.
    pub fn match_footprint<T: Borrow<Trajectory>>(
        &self,
        footprint: &Footprint,
        trajectories: &[T],
    ) -> Option<Match> {
        let mut best: Option<Candidate> = None;
        for trajectory in trajectories {
            let trajectory = trajectory.borrow();
            for sample in trajectory.samples() {
                let candidate = Candidate {
                    key: trajectory.key(),
                    frame_number: sample.frame_number(),
                    position: sample.position(),
                    distance_m: sample
                        .position()
                        .distance_to(&footprint.centroid)
                        .get::<meter>(),
                };

                if best.as_ref().is_none_or(|best| candidate.is_better_than(best)) {
                    best = Some(candidate);
                }
            }
        }

        let best = best?;
        if best.distance_m > self.buffer.get::<meter>() {
            return None;
        }

        let offset = best.position.offset_to(&footprint.centroid);
        Some(Match {
            object_id: footprint.object_id.clone(),
            centroid: footprint.centroid,
            matched_file: best.key.to_owned(),
            frame_number: best.frame_number,
            vehicle_x: offset.east,
            vehicle_y: offset.north,
        })
    }

    /// Matches every footprint in parallel, keeping input order.
    pub fn match_all<T: Borrow<Trajectory> + Sync>(
        &self,
        footprints: &[Footprint],
        trajectories: &[T],
    ) -> MatchReport {
        let outcomes: Vec<Result<Match, ObjectId>> = footprints
            .par_iter()
            .map(|footprint| {
                self.match_footprint(footprint, trajectories)
                    .ok_or_else(|| footprint.object_id.clone())
            })
            .collect();

        let mut report = MatchReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(matched) => report.matches.push(matched),
                Err(object_id) => {
                    debug!(%object_id, "no trajectory sample within buffer");
                    report.unmatched.push(object_id);
                }
            }
        }

        report
    }
}
