use crate::{
    error::Error,
    frames::{FrameRequest, FrameSource},
    heading::{Heading, HeadingEstimator},
    matcher::OrientedMatch,
    projection::{ProjectionEngine, RectilinearFrame},
    trajectory::{Trajectory, TrajectoryError},
};
use tracing::debug;
use uom::si::{angle::degree, f64::Angle};

/// Misalignments closer than this, in degrees, are ties.
const MISALIGNMENT_TOLERANCE: f64 = 1e-9;

/// The frame chosen to render a footprint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    pub frame_number: usize,
    pub heading: Heading,
    /// Direction of the footprint relative to travel at this frame.
    pub view_direction: Angle,
    /// Angle between the panorama's optical axis and the footprint, in
    /// degrees.
    pub misalignment: f64,
    /// True if no neighbouring frame could be scored.
    pub fallback: bool,
}

impl Selection {
    fn is_better_than(&self, other: &Selection, matched_frame: usize) -> bool {
        match (self.misalignment - other.misalignment).abs() <= MISALIGNMENT_TOLERANCE {
            true => {
                let rank = |s: &Selection| (s.frame_number.abs_diff(matched_frame), s.frame_number);
                rank(self) < rank(other)
            }
            false => self.misalignment < other.misalignment,
        }
    }
}

/// Picks the frame near a match whose panorama best faces the footprint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameWindowSelector {
    estimator: HeadingEstimator,
    search_radius: usize,
}

impl FrameWindowSelector {
    pub fn new(estimator: HeadingEstimator, search_radius: usize) -> Self {
        Self {
            estimator,
            search_radius,
        }
    }

    pub fn search_radius(&self) -> usize {
        self.search_radius
    }

    /// Scores every frame within the search radius of the matched frame.
    ///
    /// The optical axis of the panorama points along `heading - yaw_offset`;
    /// a frame's misalignment is the angle between that axis and the bearing
    /// from the frame's own position to the footprint. Frames without a
    /// heading are skipped. If none remain the match itself is returned.
    pub fn select(
        &self,
        trajectory: &Trajectory,
        oriented: &OrientedMatch,
        yaw_offset: Angle,
    ) -> Result<Selection, TrajectoryError> {
        let matched_frame = oriented.matched.frame_number;
        trajectory.checked_sample(matched_frame)?;

        let centroid = oriented.matched.centroid;
        let first = matched_frame.saturating_sub(self.search_radius);
        let last = matched_frame
            .saturating_add(self.search_radius)
            .min(trajectory.len() - 1);

        let mut best: Option<Selection> = None;
        for sample in &trajectory.samples()[first..=last] {
            let Ok(heading) = self.estimator.heading(trajectory, sample.frame_number()) else {
                continue;
            };

            let bearing = sample.position().offset_to(&centroid).bearing();
            let candidate = Selection {
                frame_number: sample.frame_number(),
                heading,
                view_direction: bearing - heading,
                misalignment: (heading - yaw_offset).angle_to(bearing),
                fallback: false,
            };

            if best
                .as_ref()
                .is_none_or(|best| candidate.is_better_than(best, matched_frame))
            {
                best = Some(candidate);
            }
        }

        Ok(best.unwrap_or_else(|| {
            let bearing = oriented.matched.vehicle_offset().bearing();
            Selection {
                frame_number: matched_frame,
                heading: oriented.orientation,
                view_direction: oriented.view_direction(),
                misalignment: (oriented.orientation - yaw_offset).angle_to(bearing),
                fallback: true,
            }
        }))
    }

    /// Selects a frame and renders it with its own view direction.
    pub fn select_and_project<F: FrameSource + ?Sized>(
        &self,
        trajectory: &Trajectory,
        oriented: &OrientedMatch,
        engine: &ProjectionEngine,
        frames: &F,
    ) -> Result<(Selection, RectilinearFrame), Error> {
        let yaw_offset = Angle::new::<degree>(engine.config().yaw_offset);
        let selection = self.select(trajectory, oriented, yaw_offset)?;
        let object_id = &oriented.matched.object_id;

        debug!(
            %object_id,
            matched_frame = oriented.matched.frame_number,
            selected_frame = selection.frame_number,
            misalignment = selection.misalignment,
            fallback = selection.fallback,
            "selected frame"
        );

        let request = FrameRequest {
            video: &oriented.matched.matched_file,
            frame_number: selection.frame_number,
            object_id: (selection.frame_number == oriented.matched.frame_number)
                .then_some(object_id),
        };
        let panorama = frames.frame(&request)?;
        let image = engine.render(panorama, selection.view_direction)?;

        Ok((selection, RectilinearFrame::new(object_id.clone(), image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        footprint::ObjectId,
        geo::{GeoPoint, LocalOffset},
        matcher::Match,
    };
    use approx::assert_abs_diff_eq;

    fn at(east: f64, north: f64) -> GeoPoint {
        GeoPoint::new(0.0, 0.0).translate(LocalOffset::new(east, north))
    }

    /// North for 50 m in 5 m steps, then a right turn heading east.
    fn right_turn() -> Trajectory {
        let north = (0..=10).map(|k| at(0.0, 5.0 * k as f64));
        let east = (11..=20).map(|k| at(5.0 * (k - 10) as f64, 50.0));
        Trajectory::from_positions("GS010001", north.chain(east))
    }

    fn oriented(trajectory: &Trajectory, frame_number: usize, centroid: GeoPoint) -> OrientedMatch {
        let position = trajectory.samples()[frame_number].position();
        let offset = position.offset_to(&centroid);
        let heading = HeadingEstimator::new(1)
            .heading(trajectory, frame_number)
            .unwrap();

        Match {
            object_id: ObjectId::new("1"),
            centroid,
            matched_file: trajectory.key().to_owned(),
            frame_number,
            vehicle_x: offset.east,
            vehicle_y: offset.north,
        }
        .with_orientation(heading)
    }

    fn degrees(angle: f64) -> Angle {
        Angle::new::<degree>(angle)
    }

    #[test]
    fn selects_aligned_frame_after_turn() {
        let trajectory = right_turn();
        let matched = oriented(&trajectory, 10, at(10.0, 20.0));
        let selector = FrameWindowSelector::new(HeadingEstimator::new(1), 5);

        let fixed = selector.select(&trajectory, &matched, degrees(-90.0)).unwrap();
        assert_eq!(fixed.frame_number, 12);
        assert!(fixed.misalignment < 2.0, "{}", fixed.misalignment);
        assert!(!fixed.fallback);

        let original = (matched.orientation - degrees(-90.0))
            .angle_to(matched.matched.vehicle_offset().bearing());
        assert!(original > 20.0, "{original}");
    }

    #[test]
    fn winner_view_direction_faces_footprint() {
        let trajectory = right_turn();
        let matched = oriented(&trajectory, 10, at(10.0, 20.0));
        let selection = FrameWindowSelector::new(HeadingEstimator::new(1), 5)
            .select(&trajectory, &matched, degrees(-90.0))
            .unwrap();

        // Heading east with the building due south puts it 90 degrees right.
        assert_abs_diff_eq!(selection.view_direction.get::<degree>(), 90.0, epsilon = 0.5);
    }

    #[test]
    fn zero_radius_keeps_matched_frame() {
        let trajectory = right_turn();
        let matched = oriented(&trajectory, 10, at(10.0, 20.0));
        let selection = FrameWindowSelector::new(HeadingEstimator::new(1), 0)
            .select(&trajectory, &matched, degrees(-90.0))
            .unwrap();
        assert_eq!(selection.frame_number, 10);
    }

    #[test]
    fn ties_prefer_nearest_frame() {
        // Looking backwards along a straight road at a footprint on the road
        // itself: every later frame faces it exactly.
        let trajectory =
            Trajectory::from_positions("GS010001", (0..10).map(|k| at(0.0, 5.0 * k as f64)));
        let matched = oriented(&trajectory, 5, at(0.0, 25.0));
        let selection = FrameWindowSelector::new(HeadingEstimator::new(1), 3)
            .select(&trajectory, &matched, degrees(180.0))
            .unwrap();
        assert_eq!(selection.frame_number, 6);
        assert_eq!(selection.misalignment, 0.0);
    }

    #[test]
    fn falls_back_without_headings() {
        let trajectory = Trajectory::from_positions("GS010001", [at(0.0, 0.0)]);
        let matched = Match {
            object_id: ObjectId::new("1"),
            centroid: at(10.0, 0.0),
            matched_file: "GS010001".into(),
            frame_number: 0,
            vehicle_x: 10.0,
            vehicle_y: 0.0,
        }
        .with_orientation(Heading::from_degrees_wrapped(0.0));

        let selection = FrameWindowSelector::new(HeadingEstimator::new(1), 5)
            .select(&trajectory, &matched, degrees(-90.0))
            .unwrap();
        assert!(selection.fallback);
        assert_eq!(selection.frame_number, 0);
        assert_abs_diff_eq!(selection.misalignment, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn stale_frame_is_rejected() {
        let trajectory = right_turn();
        let mut matched = oriented(&trajectory, 10, at(10.0, 20.0));
        matched.matched.frame_number = 40;
        assert!(matches!(
            FrameWindowSelector::new(HeadingEstimator::new(1), 5).select(
                &trajectory,
                &matched,
                degrees(-90.0)
            ),
            Err(TrajectoryError::FrameOutOfRange { frame_number: 40, .. })
        ));
    }
}
