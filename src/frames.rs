//! Access to panoramic frames written by the external frame extractor.

use crate::{footprint::ObjectId, trajectory::swapped_device_code};
use image::{ImageReader, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Accepted video file extensions, in lookup order.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "MP4", "mov", "MOV"];

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame {frame_number} of video `{video}` is unavailable")]
    Unavailable { video: String, frame_number: usize },
    #[error("unable to decode frame {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
}

/// Identifies one panoramic frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameRequest<'a> {
    pub video: &'a str,
    pub frame_number: usize,
    /// Set when the frame is the one matched to this footprint.
    pub object_id: Option<&'a ObjectId>,
}

/// Supplies decoded panoramic frames.
pub trait FrameSource: Sync {
    fn frame(&self, request: &FrameRequest) -> Result<RgbImage, FrameError>;
}

/// Frames stored as JPEG files under a root directory.
///
/// A frame is read from `<root>/<video>/<frame_number>.jpg`. The matched
/// frame of a footprint may instead be stored as `<root>/<ObjectId>.jpg`.
#[derive(Clone, Debug)]
pub struct FrameDirectory {
    root: PathBuf,
}

impl FrameDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frame_path(&self, video: &str, frame_number: usize) -> PathBuf {
        self.root.join(video).join(format!("{frame_number}.jpg"))
    }

    fn candidates(&self, request: &FrameRequest) -> Vec<PathBuf> {
        let mut paths = vec![self.frame_path(request.video, request.frame_number)];
        if let Some(object_id) = request.object_id {
            paths.push(self.root.join(object_id.image_file_name()));
        }
        paths
    }
}

impl FrameSource for FrameDirectory {
    fn frame(&self, request: &FrameRequest) -> Result<RgbImage, FrameError> {
        let path = self
            .candidates(request)
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| FrameError::Unavailable {
                video: request.video.to_owned(),
                frame_number: request.frame_number,
            })?;

        let decode_error = |reason: String| FrameError::Decode {
            path: path.clone(),
            reason,
        };
        let image = ImageReader::open(&path)
            .map_err(|err| decode_error(err.to_string()))?
            .decode()
            .map_err(|err| decode_error(err.to_string()))?;

        Ok(image.into_rgb8())
    }
}

/// Finds the video file for `name` in `root`.
///
/// Tries each accepted extension, then the same with the device code
/// swapped.
pub fn locate_video(root: &Path, name: &str) -> Option<PathBuf> {
    let stem = VIDEO_EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(&format!(".{ext}")))
        .unwrap_or(name);

    std::iter::once(stem.to_owned())
        .chain(swapped_device_code(stem))
        .flat_map(|candidate| {
            VIDEO_EXTENSIONS
                .iter()
                .map(move |ext| root.join(format!("{candidate}.{ext}")))
        })
        .find(|path| path.is_file())
}
