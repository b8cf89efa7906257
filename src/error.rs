use crate::{
    footprint::FootprintError, frames::FrameError, heading::HeadingError,
    projection::ProjectionError, records::RecordError, trajectory::TrajectoryError,
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
    #[error(transparent)]
    Footprint(#[from] FootprintError),
    #[error(transparent)]
    Heading(#[from] HeadingError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("invalid config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
    #[error("unable to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    /// Returns false for gaps in the data of a single item, which are
    /// skipped while the rest of the batch continues.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Trajectory(err) | Error::Heading(HeadingError::Trajectory(err)) => {
                !matches!(err, TrajectoryError::MissingTrajectory { .. })
            }
            Error::Heading(HeadingError::InsufficientTrajectoryData { .. }) => false,
            Error::Frame(_) => false,
            Error::Projection(ProjectionError::EmptySource) => false,
            Error::Projection(_) => true,
            Error::Footprint(_) | Error::Record(_) | Error::Config { .. } | Error::Io { .. } => {
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TrajectoryError::MissingTrajectory { key: "GS010001".into(), dir: "gps".into() }.into(), false)]
    #[case(HeadingError::InsufficientTrajectoryData { key: "GS010001".into(), samples: 1 }.into(), false)]
    #[case(FrameError::Unavailable { video: "GS010001".into(), frame_number: 3 }.into(), false)]
    #[case(TrajectoryError::FrameOutOfRange { key: "GS010001".into(), frame_number: 9, len: 3 }.into(), true)]
    #[case(HeadingError::Trajectory(TrajectoryError::FrameOutOfRange { key: "GS010001".into(), frame_number: 9, len: 3 }).into(), true)]
    #[case(TrajectoryError::UnreadableDirectory { dir: "gps".into(), reason: "gone".into() }.into(), true)]
    #[case(FootprintError::UnrecognizedColumns { found: vec!["a".into()] }.into(), true)]
    #[case(ProjectionError::InvalidWidth.into(), true)]
    fn fatal_errors(#[case] err: Error, #[case] fatal: bool) {
        assert_eq!(err.is_fatal(), fatal, "{err}");
    }
}
