use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs::File, io::Read, path::Path};
use thiserror::Error;

/// Header spellings accepted for the footprint identifier.
pub const OBJECT_ID_COLUMNS: [&str; 3] = ["ObjectId", "objectid", "object_id"];

/// Coordinate column pairs in priority order, (longitude, latitude).
pub const COORDINATE_SCHEMAS: [(&str, &str); 4] = [
    ("long", "lat"),
    ("longitude", "latitude"),
    ("x", "y"),
    ("Center_Longitude", "Center_Latitude"),
];

#[derive(Debug, Error)]
pub enum FootprintError {
    #[error(
        "no recognized coordinate columns in [{}], expected one of {}",
        found.join(", "),
        expected_schemas()
    )]
    UnrecognizedColumns { found: Vec<String> },
    #[error("malformed footprint row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },
    #[error("duplicate ObjectId `{0}`")]
    DuplicateObjectId(ObjectId),
    #[error("malformed footprint CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("unable to open footprint CSV: {0}")]
    Io(#[from] std::io::Error),
}

fn expected_schemas() -> String {
    COORDINATE_SCHEMAS
        .iter()
        .map(|(lon, lat)| format!("({lon}, {lat})"))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Identifies a building parcel.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the rectilinear view written for this footprint.
    pub fn image_file_name(&self) -> String {
        format!("{}.jpg", self.0)
    }
}

impl From<usize> for ObjectId {
    fn from(id: usize) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A building centroid keyed by its `ObjectId`.
#[derive(Clone, Debug, PartialEq)]
pub struct Footprint {
    pub object_id: ObjectId,
    pub centroid: GeoPoint,
}

impl Footprint {
    pub fn new(object_id: ObjectId, centroid: GeoPoint) -> Self {
        Self {
            object_id,
            centroid,
        }
    }
}

struct Columns {
    object_id: Option<usize>,
    lon: usize,
    lat: usize,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, FootprintError> {
        let names: Vec<&str> = headers.iter().map(str::trim).collect();
        let find = |name: &str| names.iter().position(|header| *header == name);

        let (lon, lat) = COORDINATE_SCHEMAS
            .iter()
            .find_map(|(lon, lat)| Some((find(lon)?, find(lat)?)))
            .ok_or_else(|| FootprintError::UnrecognizedColumns {
                found: names.iter().map(|name| name.to_string()).collect(),
            })?;

        Ok(Self {
            object_id: OBJECT_ID_COLUMNS.iter().find_map(|name| find(name)),
            lon,
            lat,
        })
    }
}

/// Reads footprints from CSV.
///
/// Coordinates come from the first recognized column pair in
/// [`COORDINATE_SCHEMAS`]. Without an `ObjectId` column, footprints are
/// numbered from 1 in file order.
pub fn read_footprints<R: Read>(reader: R) -> Result<Vec<Footprint>, FootprintError> {
    let mut reader = csv::Reader::from_reader(reader);
    let columns = Columns::resolve(reader.headers()?)?;

    let mut seen = HashSet::new();
    let mut footprints = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let coordinate = |idx: usize| {
            let raw = record.get(idx).unwrap_or_default().trim();
            raw.parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| FootprintError::MalformedRow {
                    row,
                    reason: format!("coordinate is not a number: {raw:?}"),
                })
        };
        let centroid = GeoPoint::new(coordinate(columns.lon)?, coordinate(columns.lat)?);

        let object_id = match columns.object_id {
            Some(idx) => match record.get(idx).map(str::trim) {
                Some(id) if !id.is_empty() => ObjectId::new(id),
                _ => {
                    return Err(FootprintError::MalformedRow {
                        row,
                        reason: "empty ObjectId".into(),
                    });
                }
            },
            None => ObjectId::from(row + 1),
        };

        if !seen.insert(object_id.clone()) {
            return Err(FootprintError::DuplicateObjectId(object_id));
        }

        footprints.push(Footprint::new(object_id, centroid));
    }

    Ok(footprints)
}

pub fn read_footprints_file(path: impl AsRef<Path>) -> Result<Vec<Footprint>, FootprintError> {
    read_footprints(File::open(path)?)
}
