//! Batch stages: match footprints, orient matches, dewarp frames.
//!
//! Items are processed in parallel and independently. Errors that only
//! affect one item are logged and the item is skipped; any other error
//! aborts the stage.

use crate::{
    config::PipelineConfig,
    error::Error,
    footprint::{Footprint, ObjectId},
    frames::{FrameRequest, FrameSource},
    heading::HeadingEstimator,
    matcher::{FootprintMatcher, Match, MatchReport, OrientedMatch},
    projection::{ProjectionEngine, RectilinearFrame},
    records::{OrientedMatchRecord, check_unique_ids},
    selector::FrameWindowSelector,
    trajectory::TrajectoryIndex,
};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// An item left out of a stage's output.
#[derive(Clone, Debug, PartialEq)]
pub struct Skipped {
    pub object_id: ObjectId,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrientReport {
    /// One row per match, in input order. Skipped matches have no
    /// orientation.
    pub records: Vec<OrientedMatchRecord>,
    pub skipped: Vec<Skipped>,
}

impl OrientReport {
    pub fn oriented(&self) -> usize {
        self.records.len() - self.skipped.len()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DewarpMode {
    /// Render the matched frame.
    #[default]
    Plain,
    /// Render the best aligned frame near the matched frame.
    Smart,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DewarpOptions {
    pub mode: DewarpMode,
    /// Leave footprints whose view was already written untouched.
    pub skip_existing: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DewarpReport {
    pub written: Vec<PathBuf>,
    pub existing: Vec<ObjectId>,
    pub skipped: Vec<Skipped>,
}

enum Rendered {
    Written(PathBuf),
    Existing(ObjectId),
}

/// Records a per-item failure as skipped, or returns it if it is fatal.
fn skip(object_id: &ObjectId, err: Error) -> Result<Skipped, Error> {
    if err.is_fatal() {
        return Err(err);
    }

    warn!(%object_id, reason = %err, "skipping");
    Ok(Skipped {
        object_id: object_id.clone(),
        reason: err.to_string(),
    })
}

/// Runs the stages with one configuration.
#[derive(Clone, Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    engine: ProjectionEngine,
}

impl Pipeline {
    /// Validates `config` before any item is processed.
    pub fn new(config: PipelineConfig) -> Result<Self, Error> {
        config.validate()?;
        let engine = ProjectionEngine::new(config.dewarp)?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn estimator(&self) -> HeadingEstimator {
        HeadingEstimator::new(self.config.window)
    }

    /// Matches `footprints` against every trajectory in `index`.
    pub fn match_footprints(
        &self,
        footprints: &[Footprint],
        index: &TrajectoryIndex,
    ) -> Result<MatchReport, Error> {
        let trajectories = index.load_all()?;
        let report =
            FootprintMatcher::new(self.config.buffer()).match_all(footprints, &trajectories);

        info!(
            footprints = footprints.len(),
            trajectories = trajectories.len(),
            matched = report.matches.len(),
            unmatched = report.unmatched.len(),
            "matched footprints"
        );
        Ok(report)
    }

    /// Estimates the heading at every matched frame.
    pub fn orient(&self, matches: &[Match], index: &TrajectoryIndex) -> Result<OrientReport, Error> {
        check_unique_ids(matches.iter().map(|matched| &matched.object_id))?;
        let estimator = self.estimator();
        let outcomes: Vec<Result<OrientedMatch, Error>> = matches
            .par_iter()
            .map(|matched| -> Result<OrientedMatch, Error> {
                let trajectory = index.load(&matched.matched_file)?;
                let heading = estimator.heading(&trajectory, matched.frame_number)?;
                Ok(matched.clone().with_orientation(heading))
            })
            .collect();

        let mut records = Vec::with_capacity(matches.len());
        let mut skipped = Vec::new();
        for (matched, outcome) in matches.iter().zip(outcomes) {
            match outcome {
                Ok(oriented) => records.push(OrientedMatchRecord::from(&oriented)),
                Err(err) => {
                    skipped.push(skip(&matched.object_id, err)?);
                    records.push(OrientedMatchRecord::unoriented(matched));
                }
            }
        }

        let report = OrientReport { records, skipped };
        info!(
            matches = matches.len(),
            oriented = report.oriented(),
            skipped = report.skipped.len(),
            "oriented matches"
        );
        Ok(report)
    }

    /// Renders one view per oriented row into `output_dir`.
    ///
    /// Rows without an orientation are skipped. Each ObjectId may appear
    /// only once.
    pub fn dewarp<F: FrameSource + ?Sized>(
        &self,
        records: &[OrientedMatchRecord],
        index: &TrajectoryIndex,
        frames: &F,
        output_dir: &Path,
        options: DewarpOptions,
    ) -> Result<DewarpReport, Error> {
        check_unique_ids(records.iter().map(|record| &record.object_id))?;
        std::fs::create_dir_all(output_dir).map_err(Error::io(output_dir))?;

        let mut skipped = Vec::new();
        let oriented: Vec<OrientedMatch> = records
            .iter()
            .filter_map(|record| match record.clone().into_oriented() {
                Some(oriented) => Some(oriented),
                None => {
                    warn!(object_id = %record.object_id, "skipping row without orientation");
                    skipped.push(Skipped {
                        object_id: record.object_id.clone(),
                        reason: "no orientation".into(),
                    });
                    None
                }
            })
            .collect();

        let outcomes: Vec<Result<Rendered, Error>> = oriented
            .par_iter()
            .map(|oriented| self.render_one(oriented, index, frames, output_dir, options))
            .collect();

        let mut report = DewarpReport::default();
        for (oriented, outcome) in oriented.iter().zip(outcomes) {
            match outcome {
                Ok(Rendered::Written(path)) => report.written.push(path),
                Ok(Rendered::Existing(object_id)) => report.existing.push(object_id),
                Err(err) => skipped.push(skip(&oriented.matched.object_id, err)?),
            }
        }
        report.skipped = skipped;

        info!(
            rows = records.len(),
            written = report.written.len(),
            existing = report.existing.len(),
            skipped = report.skipped.len(),
            mode = ?options.mode,
            "dewarped frames"
        );
        Ok(report)
    }

    fn render_one<F: FrameSource + ?Sized>(
        &self,
        oriented: &OrientedMatch,
        index: &TrajectoryIndex,
        frames: &F,
        output_dir: &Path,
        options: DewarpOptions,
    ) -> Result<Rendered, Error> {
        let object_id = &oriented.matched.object_id;
        if options.skip_existing && output_dir.join(object_id.image_file_name()).is_file() {
            return Ok(Rendered::Existing(object_id.clone()));
        }

        let trajectory = index.load(&oriented.matched.matched_file)?;
        let frame = match options.mode {
            DewarpMode::Plain => {
                trajectory.checked_sample(oriented.matched.frame_number)?;
                let request = FrameRequest {
                    video: &oriented.matched.matched_file,
                    frame_number: oriented.matched.frame_number,
                    object_id: Some(object_id),
                };
                let image = self
                    .engine
                    .render(frames.frame(&request)?, oriented.view_direction())?;
                RectilinearFrame::new(object_id.clone(), image)
            }
            DewarpMode::Smart => {
                let selector = FrameWindowSelector::new(self.estimator(), self.config.search_radius);
                let (_, frame) =
                    selector.select_and_project(&trajectory, oriented, &self.engine, frames)?;
                frame
            }
        };

        Ok(Rendered::Written(frame.write_to(output_dir)?))
    }
}
