use crate::{error::Error, projection::DewarpConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uom::si::{f64::Length, length::meter};

/// Parameters for a whole pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Largest distance in meters between a footprint and its matched sample.
    pub buffer_m: f64,
    /// Frames on either side of a frame used to estimate its heading.
    pub window: usize,
    /// Frames on either side of the matched frame considered by smart dewarp.
    pub search_radius: usize,
    pub dewarp: DewarpConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_m: 25.0,
            window: 15,
            search_radius: 5,
            dewarp: DewarpConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(Error::io(path))?;
        serde_json::from_str(&contents).map_err(|err| Error::Config {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    /// Rejects a buffer that is negative or not finite.
    pub fn validate(&self) -> Result<(), Error> {
        match self.buffer_m.is_finite() && self.buffer_m >= 0.0 {
            true => Ok(()),
            false => Err(Error::Config {
                path: PathBuf::from("buffer_m"),
                reason: format!(
                    "expected a finite, non-negative buffer in meters but got: {}",
                    self.buffer_m
                ),
            }),
        }
    }

    pub fn buffer(&self) -> Length {
        Length::new::<meter>(self.buffer_m)
    }
}
