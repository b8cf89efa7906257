use crate::geo::GeoPoint;
use std::{
    collections::HashMap,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};
use thiserror::Error;
use tracing::debug;

/// File name suffix of a per-video GPS trace.
pub const GPS_TRACE_SUFFIX: &str = "_GoPro Max-GPS5.csv";
pub const LONGITUDE_COLUMN: &str = "GPS (Long.) [deg]";
pub const LATITUDE_COLUMN: &str = "GPS (Lat.) [deg]";

/// Two-letter device codes that name the same capture.
const DEVICE_CODE_SWAPS: [(&str, &str); 3] = [("GH", "GL"), ("GL", "GH"), ("GS", "GL")];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrajectoryError {
    #[error("no GPS trace for video `{key}` in {}", dir.display())]
    MissingTrajectory { key: String, dir: PathBuf },
    #[error("malformed GPS trace {}: {reason}", path.display())]
    MalformedTrajectory { path: PathBuf, reason: String },
    #[error("frame {frame_number} is out of range for trajectory `{key}` with {len} samples")]
    FrameOutOfRange {
        key: String,
        frame_number: usize,
        len: usize,
    },
    #[error("unable to read GPS directory {}: {reason}", dir.display())]
    UnreadableDirectory { dir: PathBuf, reason: String },
}

/// A GPS fix recorded alongside one video frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrajectorySample {
    frame_number: usize,
    position: GeoPoint,
}

impl TrajectorySample {
    pub fn frame_number(&self) -> usize {
        self.frame_number
    }

    pub fn position(&self) -> GeoPoint {
        self.position
    }
}

/// The GPS trace of one video, one sample per frame.
///
/// A sample's frame number is its index in the trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    key: String,
    samples: Vec<TrajectorySample>,
}

impl Trajectory {
    /// Creates a `Trajectory` from positions in frame order.
    pub fn from_positions(
        key: impl Into<String>,
        positions: impl IntoIterator<Item = GeoPoint>,
    ) -> Self {
        let samples = positions
            .into_iter()
            .enumerate()
            .map(|(frame_number, position)| TrajectorySample {
                frame_number,
                position,
            })
            .collect();

        Self {
            key: key.into(),
            samples,
        }
    }

    /// Reads a GPS trace CSV where each row is one frame.
    pub fn from_csv_reader<R: Read>(key: impl Into<String>, reader: R) -> Result<Self, String> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers().map_err(|err| err.to_string())?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or_else(|| format!("missing required column `{name}`"))
        };
        let (lon_idx, lat_idx) = (column(LONGITUDE_COLUMN)?, column(LATITUDE_COLUMN)?);

        let mut positions = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|err| err.to_string())?;
            let value = |idx: usize, name: &str| {
                let raw = record.get(idx).unwrap_or_default().trim();
                raw.parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| format!("row {row}: `{name}` is not a number: {raw:?}"))
            };
            positions.push(GeoPoint::new(
                value(lon_idx, LONGITUDE_COLUMN)?,
                value(lat_idx, LATITUDE_COLUMN)?,
            ));
        }

        Ok(Self::from_positions(key, positions))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    pub fn get(&self, frame_number: usize) -> Option<&TrajectorySample> {
        self.samples.get(frame_number)
    }

    /// Returns the sample at `frame_number` or a `FrameOutOfRange` error.
    pub fn checked_sample(&self, frame_number: usize) -> Result<&TrajectorySample, TrajectoryError> {
        self.get(frame_number)
            .ok_or_else(|| TrajectoryError::FrameOutOfRange {
                key: self.key.clone(),
                frame_number,
                len: self.len(),
            })
    }
}

/// Returns the file name of the GPS trace recorded for `key`.
pub fn gps_trace_file_name(key: &str) -> String {
    format!("{key}{GPS_TRACE_SUFFIX}")
}

/// Returns `key` with its two-letter device code swapped, if it has one.
pub fn swapped_device_code(key: &str) -> Option<String> {
    DEVICE_CODE_SWAPS.iter().find_map(|(from, to)| {
        key.strip_prefix(from)
            .map(|rest| format!("{to}{rest}"))
    })
}

type Slot = Arc<OnceLock<Result<Arc<Trajectory>, TrajectoryError>>>;

/// Loads GPS traces from a directory, at most once per video key.
///
/// Concurrent loads of the same key wait for the first one to finish.
/// Failed loads are remembered as well.
#[derive(Debug)]
pub struct TrajectoryIndex {
    dir: PathBuf,
    slots: Mutex<HashMap<String, Slot>>,
}

impl TrajectoryIndex {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, TrajectoryError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(TrajectoryError::UnreadableDirectory {
                reason: "not a directory".into(),
                dir,
            });
        }

        Ok(Self {
            dir,
            slots: Mutex::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lists the video keys of every GPS trace in the directory, sorted.
    pub fn keys(&self) -> Result<Vec<String>, TrajectoryError> {
        let entries =
            std::fs::read_dir(&self.dir).map_err(|err| TrajectoryError::UnreadableDirectory {
                dir: self.dir.clone(),
                reason: err.to_string(),
            })?;

        let mut keys: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(GPS_TRACE_SUFFIX).map(str::to_owned)
            })
            .collect();

        keys.sort();
        Ok(keys)
    }

    /// Loads the trajectory for `key`, retrying with the swapped device
    /// code if no trace exists under the primary name.
    pub fn load(&self, key: &str) -> Result<Arc<Trajectory>, TrajectoryError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.to_owned()).or_default().clone()
        };

        slot.get_or_init(|| self.read(key)).clone()
    }

    /// Loads every trajectory in the directory in key order.
    pub fn load_all(&self) -> Result<Vec<Arc<Trajectory>>, TrajectoryError> {
        self.keys()?.iter().map(|key| self.load(key)).collect()
    }

    fn locate(&self, key: &str) -> Option<PathBuf> {
        std::iter::once(key.to_owned())
            .chain(swapped_device_code(key))
            .map(|candidate| self.dir.join(gps_trace_file_name(&candidate)))
            .find(|path| path.is_file())
    }

    fn read(&self, key: &str) -> Result<Arc<Trajectory>, TrajectoryError> {
        let path = self
            .locate(key)
            .ok_or_else(|| TrajectoryError::MissingTrajectory {
                key: key.to_owned(),
                dir: self.dir.clone(),
            })?;

        let malformed = |reason: String| TrajectoryError::MalformedTrajectory {
            path: path.clone(),
            reason,
        };
        let file = File::open(&path).map_err(|err| malformed(err.to_string()))?;
        let trajectory = Trajectory::from_csv_reader(key, file).map_err(malformed)?;

        debug!(video = key, path = %path.display(), samples = trajectory.len(), "loaded GPS trace");
        Ok(Arc::new(trajectory))
    }
}
