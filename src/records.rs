//! CSV rows exchanged between the match, orient and dewarp stages.

use crate::{
    footprint::ObjectId,
    geo::GeoPoint,
    heading::Heading,
    matcher::{Match, OrientedMatch},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    io::{Read, Write},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("duplicate ObjectId `{0}`")]
    DuplicateObjectId(ObjectId),
    #[error("malformed record CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One row of the matches CSV.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "ObjectId", alias = "objectid", alias = "object_id")]
    pub object_id: ObjectId,
    #[serde(rename = "Center_Longitude")]
    pub center_longitude: f64,
    #[serde(rename = "Center_Latitude")]
    pub center_latitude: f64,
    pub vehicle_x: f64,
    pub vehicle_y: f64,
    pub matched_file: String,
    pub frame_number: usize,
}

impl From<&Match> for MatchRecord {
    fn from(matched: &Match) -> Self {
        Self {
            object_id: matched.object_id.clone(),
            center_longitude: matched.centroid.lon(),
            center_latitude: matched.centroid.lat(),
            vehicle_x: matched.vehicle_x,
            vehicle_y: matched.vehicle_y,
            matched_file: matched.matched_file.clone(),
            frame_number: matched.frame_number,
        }
    }
}

impl From<MatchRecord> for Match {
    fn from(record: MatchRecord) -> Self {
        Self {
            object_id: record.object_id,
            centroid: GeoPoint::new(record.center_longitude, record.center_latitude),
            matched_file: record.matched_file,
            frame_number: record.frame_number,
            vehicle_x: record.vehicle_x,
            vehicle_y: record.vehicle_y,
        }
    }
}

/// One row of the oriented matches CSV.
///
/// `orientation` is empty for matches whose heading could not be estimated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientedMatchRecord {
    #[serde(rename = "ObjectId", alias = "objectid", alias = "object_id")]
    pub object_id: ObjectId,
    #[serde(rename = "Center_Longitude")]
    pub center_longitude: f64,
    #[serde(rename = "Center_Latitude")]
    pub center_latitude: f64,
    pub vehicle_x: f64,
    pub vehicle_y: f64,
    pub matched_file: String,
    pub frame_number: usize,
    #[serde(
        alias = "bearing",
        alias = "heading",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    pub orientation: Option<f64>,
}

impl OrientedMatchRecord {
    pub fn unoriented(matched: &Match) -> Self {
        MatchRecord::from(matched).with_orientation(None)
    }

    /// Returns `None` when the row carries no usable orientation.
    pub fn into_oriented(self) -> Option<OrientedMatch> {
        let orientation = self.orientation.and_then(Heading::try_from_degrees)?;
        let record = MatchRecord {
            object_id: self.object_id,
            center_longitude: self.center_longitude,
            center_latitude: self.center_latitude,
            vehicle_x: self.vehicle_x,
            vehicle_y: self.vehicle_y,
            matched_file: self.matched_file,
            frame_number: self.frame_number,
        };

        Some(Match::from(record).with_orientation(orientation))
    }
}

impl MatchRecord {
    fn with_orientation(self, orientation: Option<f64>) -> OrientedMatchRecord {
        OrientedMatchRecord {
            object_id: self.object_id,
            center_longitude: self.center_longitude,
            center_latitude: self.center_latitude,
            vehicle_x: self.vehicle_x,
            vehicle_y: self.vehicle_y,
            matched_file: self.matched_file,
            frame_number: self.frame_number,
            orientation,
        }
    }
}

impl From<&OrientedMatch> for OrientedMatchRecord {
    fn from(oriented: &OrientedMatch) -> Self {
        MatchRecord::from(&oriented.matched).with_orientation(Some(oriented.orientation.degrees()))
    }
}

/// Fails on the first ObjectId that appears twice.
pub fn check_unique_ids<'a>(
    object_ids: impl IntoIterator<Item = &'a ObjectId>,
) -> Result<(), RecordError> {
    let mut seen = HashSet::new();
    for object_id in object_ids {
        if !seen.insert(object_id) {
            return Err(RecordError::DuplicateObjectId(object_id.clone()));
        }
    }
    Ok(())
}

pub fn read_matches<R: Read>(reader: R) -> Result<Vec<Match>, RecordError> {
    let matches = csv::Reader::from_reader(reader)
        .deserialize::<MatchRecord>()
        .map(|record| Ok(Match::from(record?)))
        .collect::<Result<Vec<_>, RecordError>>()?;

    check_unique_ids(matches.iter().map(|matched| &matched.object_id))?;
    Ok(matches)
}

pub fn write_matches<W: Write>(writer: W, matches: &[Match]) -> Result<(), RecordError> {
    let mut writer = csv::Writer::from_writer(writer);
    for matched in matches {
        writer.serialize(MatchRecord::from(matched))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_oriented_matches<R: Read>(reader: R) -> Result<Vec<OrientedMatchRecord>, RecordError> {
    let records = csv::Reader::from_reader(reader)
        .deserialize::<OrientedMatchRecord>()
        .map(|record| Ok(record?))
        .collect::<Result<Vec<_>, RecordError>>()?;

    check_unique_ids(records.iter().map(|record| &record.object_id))?;
    Ok(records)
}

pub fn write_oriented_matches<W: Write>(
    writer: W,
    records: &[OrientedMatchRecord],
) -> Result<(), RecordError> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
