use crate::footprint::ObjectId;
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use nalgebra::{Rotation3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;
use uom::si::{
    angle::{degree, radian},
    f64::Angle,
};

/// JPEG quality of written views.
pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("expected aspect ratio as `W:H` with positive terms but got: {0:?}")]
    InvalidAspect(String),
    #[error("expected horizontal field of view in range (0, 180) degrees but got: {0}")]
    InvalidFieldOfView(f64),
    #[error("expected finite {name} but got: {value}")]
    NonFiniteAngle { name: &'static str, value: f64 },
    #[error("output width must be positive")]
    InvalidWidth,
    #[error("source panorama is empty")]
    EmptySource,
    #[error("unable to write view for ObjectId `{object_id}` to {}: {reason}", path.display())]
    Write {
        object_id: ObjectId,
        path: PathBuf,
        reason: String,
    },
}

/// Width to height ratio of the output view, written as `W:H`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    width: f64,
    height: f64,
}

impl AspectRatio {
    pub fn new(width: f64, height: f64) -> Result<Self, ProjectionError> {
        match width.is_finite() && height.is_finite() && width > 0. && height > 0. {
            true => Ok(Self { width, height }),
            false => Err(ProjectionError::InvalidAspect(format!("{width}:{height}"))),
        }
    }

    pub fn ratio(&self) -> f64 {
        self.width / self.height
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self {
            width: 16.,
            height: 9.,
        }
    }
}

impl FromStr for AspectRatio {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProjectionError::InvalidAspect(s.to_owned());
        let (width, height) = s.split_once(':').ok_or_else(invalid)?;
        let width = width.trim().parse::<f64>().map_err(|_| invalid())?;
        let height = height.trim().parse::<f64>().map_err(|_| invalid())?;
        Self::new(width, height).map_err(|_| invalid())
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = ProjectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(aspect: AspectRatio) -> Self {
        aspect.to_string()
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Parameters of the rectilinear view cut from a panorama.
///
/// Angles are in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DewarpConfig {
    /// Horizontal field of view.
    pub h_fov: f64,
    /// Elevation of the view above the horizon.
    pub pitch: f64,
    /// Output width in pixels.
    pub width: u32,
    pub aspect: AspectRatio,
    /// Added to the view direction to account for how the camera is
    /// mounted relative to the direction of travel.
    pub yaw_offset: f64,
}

impl Default for DewarpConfig {
    fn default() -> Self {
        Self {
            h_fov: 90.,
            pitch: 0.,
            width: 1920,
            aspect: AspectRatio::default(),
            yaw_offset: -90.,
        }
    }
}

impl DewarpConfig {
    pub fn validate(&self) -> Result<(), ProjectionError> {
        if !(self.h_fov > 0. && self.h_fov < 180.) {
            return Err(ProjectionError::InvalidFieldOfView(self.h_fov));
        }

        for (name, value) in [("pitch", self.pitch), ("yaw_offset", self.yaw_offset)] {
            if !value.is_finite() {
                return Err(ProjectionError::NonFiniteAngle { name, value });
            }
        }

        match self.width > 0 {
            true => Ok(()),
            false => Err(ProjectionError::InvalidWidth),
        }
    }

    pub fn output_height(&self) -> u32 {
        ((self.width as f64 / self.aspect.ratio()).round() as u32).max(1)
    }

    /// Vertical field of view for square output pixels.
    pub fn v_fov(&self) -> f64 {
        let half = (self.h_fov / 2.).to_radians().tan() / self.aspect.ratio();
        2. * half.atan().to_degrees()
    }
}

/// Wraps `degrees` onto (-180, 180].
pub fn normalize_yaw(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.);
    match wrapped > 180. {
        true => wrapped - 360.,
        false => wrapped,
    }
}

/// Returns true if `image` is wide enough to hold a full equirectangular
/// sweep.
pub fn is_equirectangular(image: &RgbImage) -> bool {
    let (width, height) = image.dimensions();
    height > 0 && width >= 2 * height
}

/// Cuts rectilinear views out of equirectangular panoramas.
#[derive(Clone, Debug)]
pub struct ProjectionEngine {
    config: DewarpConfig,
    height: u32,
    tan_half_h: f64,
    tan_half_v: f64,
}

impl ProjectionEngine {
    pub fn new(config: DewarpConfig) -> Result<Self, ProjectionError> {
        config.validate()?;

        Ok(Self {
            height: config.output_height(),
            tan_half_h: (config.h_fov / 2.).to_radians().tan(),
            tan_half_v: (config.v_fov() / 2.).to_radians().tan(),
            config,
        })
    }

    pub fn config(&self) -> &DewarpConfig {
        &self.config
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.config.width, self.height)
    }

    /// Target yaw in the panorama for a view direction `orientation`.
    pub fn target_yaw(&self, orientation: Angle) -> Angle {
        Angle::new::<degree>(normalize_yaw(
            orientation.get::<degree>() + self.config.yaw_offset,
        ))
    }

    /// Renders the view looking along `orientation` plus the yaw offset.
    ///
    /// Yaw wraps around the panorama seam and pitch clamps to the top and
    /// bottom rows.
    pub fn project(
        &self,
        panorama: &RgbImage,
        orientation: Angle,
    ) -> Result<RgbImage, ProjectionError> {
        if panorama.width() == 0 || panorama.height() == 0 {
            return Err(ProjectionError::EmptySource);
        }

        let yaw = self.target_yaw(orientation).get::<radian>();
        let pitch = self.config.pitch.to_radians();

        // Camera frame is x right, y up, z forward.
        let camera_to_sphere = Rotation3::from_axis_angle(&Vector3::y_axis(), yaw)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), -pitch);

        let (width, height) = self.output_size();
        let mut output = RgbImage::new(width, height);
        let row_len = width as usize * 3;

        output
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(row, pixels)| {
                let y = (1. - 2. * (row as f64 + 0.5) / height as f64) * self.tan_half_v;
                for (col, pixel) in pixels.chunks_exact_mut(3).enumerate() {
                    let x = (2. * (col as f64 + 0.5) / width as f64 - 1.) * self.tan_half_h;
                    let ray = camera_to_sphere * Vector3::new(x, y, 1.);

                    let ray_yaw = ray.x.atan2(ray.z).to_degrees();
                    let ray_pitch = ray.y.atan2(ray.x.hypot(ray.z)).to_degrees();

                    pixel.copy_from_slice(&sample_bilinear(panorama, ray_yaw, ray_pitch));
                }
            });

        Ok(output)
    }

    /// Like [`ProjectionEngine::project`] but returns frames narrower than
    /// 2:1 unchanged, since they are not equirectangular.
    pub fn render(&self, frame: RgbImage, orientation: Angle) -> Result<RgbImage, ProjectionError> {
        match is_equirectangular(&frame) {
            true => self.project(&frame, orientation),
            false => {
                debug!(
                    width = frame.width(),
                    height = frame.height(),
                    "frame is not equirectangular, passing through"
                );
                Ok(frame)
            }
        }
    }
}

/// Samples the panorama at spherical coordinates in degrees.
fn sample_bilinear(panorama: &RgbImage, yaw: f64, pitch: f64) -> [u8; 3] {
    let (width, height) = panorama.dimensions();
    let u = (yaw + 180.) / 360. * width as f64;
    let v = ((90. - pitch) / 180. * height as f64).clamp(0., (height - 1) as f64);

    let u_floor = u.floor();
    let frac_u = u - u_floor;
    let u0 = (u_floor as i64).rem_euclid(width as i64) as u32;
    let u1 = (u0 + 1) % width;

    let v0 = v.floor() as u32;
    let frac_v = v - v0 as f64;
    let v1 = (v0 + 1).min(height - 1);

    let p00 = panorama.get_pixel(u0, v0).0;
    let p01 = panorama.get_pixel(u1, v0).0;
    let p10 = panorama.get_pixel(u0, v1).0;
    let p11 = panorama.get_pixel(u1, v1).0;

    let mut pixel = [0u8; 3];
    for c in 0..3 {
        let value = p00[c] as f64 * (1. - frac_u) * (1. - frac_v)
            + p01[c] as f64 * frac_u * (1. - frac_v)
            + p10[c] as f64 * (1. - frac_u) * frac_v
            + p11[c] as f64 * frac_u * frac_v;
        pixel[c] = value.round().clamp(0., 255.) as u8;
    }

    pixel
}

/// A rendered view for one footprint.
#[derive(Clone, Debug)]
pub struct RectilinearFrame {
    pub object_id: ObjectId,
    pub image: RgbImage,
}

impl RectilinearFrame {
    pub fn new(object_id: ObjectId, image: RgbImage) -> Self {
        Self { object_id, image }
    }

    /// Writes `<ObjectId>.jpg` into `dir` and returns its path.
    ///
    /// The image is encoded to a temporary file first and then renamed, so
    /// the final path never holds a partial image.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ProjectionError> {
        let path = dir.join(self.object_id.image_file_name());
        let temp = dir.join(format!(".{}.tmp", self.object_id.image_file_name()));

        let written = self
            .encode(&temp)
            .and_then(|()| std::fs::rename(&temp, &path).map_err(|err| err.to_string()));

        match written {
            Ok(()) => Ok(path),
            Err(reason) => {
                let _ = std::fs::remove_file(&temp);
                Err(ProjectionError::Write {
                    object_id: self.object_id.clone(),
                    path,
                    reason,
                })
            }
        }
    }

    fn encode(&self, path: &Path) -> Result<(), String> {
        let file = File::create(path).map_err(|err| err.to_string())?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
            .encode_image(&self.image)
            .map_err(|err| err.to_string())?;
        writer.flush().map_err(|err| err.to_string())
    }
}
