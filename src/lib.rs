//! Facade views of buildings from drive-through panoramic video and GPS.
//!
//! Footprints are matched to the nearest frame of a GPS trajectory, the
//! vehicle heading at that frame is estimated, and a rectilinear view facing
//! the footprint is cut from the equirectangular frame.

pub mod config;
pub mod error;
pub mod footprint;
pub mod frames;
pub mod geo;
pub mod heading;
pub mod matcher;
pub mod pipeline;
pub mod projection;
pub mod records;
pub mod selector;
pub mod trajectory;

pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::error::Error;
    pub use crate::footprint::{Footprint, ObjectId, read_footprints, read_footprints_file};
    pub use crate::frames::{FrameDirectory, FrameError, FrameRequest, FrameSource};
    pub use crate::geo::{GeoPoint, LocalOffset};
    pub use crate::heading::{Heading, HeadingEstimator};
    pub use crate::matcher::{FootprintMatcher, Match, MatchReport, OrientedMatch};
    pub use crate::pipeline::{DewarpMode, DewarpOptions, Pipeline};
    pub use crate::projection::{AspectRatio, DewarpConfig, ProjectionEngine, RectilinearFrame};
    pub use crate::records::{
        OrientedMatchRecord, read_matches, read_oriented_matches, write_matches,
        write_oriented_matches,
    };
    pub use crate::selector::{FrameWindowSelector, Selection};
    pub use crate::trajectory::{Trajectory, TrajectoryIndex};
}
