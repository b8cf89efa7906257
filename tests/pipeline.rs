use image::{Rgb, RgbImage};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tempfile::TempDir;
use vrtoolkit::{
    prelude::*,
    trajectory::{TrajectoryError, gps_trace_file_name},
};

fn at(east: f64, north: f64) -> GeoPoint {
    GeoPoint::new(0.0, 0.0).translate(LocalOffset::new(east, north))
}

/// A GPS folder holding one trace driving east in 5 m steps.
fn gps_dir(samples: usize) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from("cts,GPS (Lat.) [deg],GPS (Long.) [deg]\n");
    for k in 0..samples {
        let p = at(5.0 * k as f64, 0.0);
        csv.push_str(&format!("{},{},{}\n", k as f64 * 33.3, p.lat(), p.lon()));
    }
    fs::write(dir.path().join(gps_trace_file_name("GS010001")), csv).unwrap();
    dir
}

fn footprints(rows: &[(&str, f64, f64)]) -> Vec<Footprint> {
    let mut csv = String::from("ObjectId,long,lat\n");
    for (id, east, north) in rows {
        let p = at(*east, *north);
        csv.push_str(&format!("{id},{},{}\n", p.lon(), p.lat()));
    }
    read_footprints(csv.as_bytes()).unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig {
        window: 2,
        dewarp: DewarpConfig {
            width: 64,
            aspect: "2:1".parse().unwrap(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Serves the same uniform frame for every request and records requests.
struct UniformFrames {
    size: (u32, u32),
    requests: Mutex<Vec<(String, usize, bool)>>,
}

impl UniformFrames {
    fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            requests: Mutex::default(),
        }
    }

    fn requested_frames(&self) -> Vec<usize> {
        let mut frames: Vec<usize> = self
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, frame_number, _)| *frame_number)
            .collect();
        frames.sort();
        frames
    }
}

impl FrameSource for UniformFrames {
    fn frame(&self, request: &FrameRequest) -> Result<RgbImage, FrameError> {
        self.requests.lock().unwrap().push((
            request.video.to_owned(),
            request.frame_number,
            request.object_id.is_some(),
        ));
        Ok(RgbImage::from_pixel(self.size.0, self.size.1, Rgb([90, 90, 90])))
    }
}

fn oriented_records(pipeline: &Pipeline, index: &TrajectoryIndex, rows: &[(&str, f64, f64)]) -> Vec<OrientedMatchRecord> {
    let report = pipeline.match_footprints(&footprints(rows), index).unwrap();
    pipeline.orient(&report.matches, index).unwrap().records
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[test]
fn far_footprint_is_excluded() {
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();

    let report = pipeline
        .match_footprints(
            &footprints(&[("1", 50.0, -15.0), ("2", 50.0, 1000.0), ("3", 0.0, -10.0)]),
            &index,
        )
        .unwrap();

    let matched: Vec<&str> = report.matches.iter().map(|m| m.object_id.as_str()).collect();
    assert_eq!(matched, vec!["1", "3"]);
    assert_eq!(report.unmatched, vec![ObjectId::new("2")]);
    assert_eq!(report.matches[0].frame_number, 10);
    assert_eq!(report.matches[1].frame_number, 0);
}

#[test]
fn orient_marks_missing_trajectories_as_skipped() {
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();

    let mut matches = pipeline
        .match_footprints(&footprints(&[("1", 50.0, -15.0), ("2", 20.0, 5.0)]), &index)
        .unwrap()
        .matches;
    matches[1].matched_file = "GS019999".into();

    let report = pipeline.orient(&matches, &index).unwrap();
    assert_eq!(report.oriented(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].object_id, ObjectId::new("2"));
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[1].orientation, None);

    let heading = report.records[0].orientation.unwrap();
    assert!((heading - 90.0).abs() < 0.5, "{heading}");
}

#[test]
fn orient_rejects_stale_frame_numbers() {
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();

    let mut matches = pipeline
        .match_footprints(&footprints(&[("1", 50.0, -15.0)]), &index)
        .unwrap()
        .matches;
    matches[0].frame_number = 500;

    let err = pipeline.orient(&matches, &index).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        Error::Heading(vrtoolkit::heading::HeadingError::Trajectory(
            TrajectoryError::FrameOutOfRange { frame_number: 500, .. }
        ))
    ));
}

#[test]
fn plain_dewarp_reads_frames_by_object_id() {
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();
    let records = oriented_records(&pipeline, &index, &[("1", 50.0, -15.0), ("3", 0.0, -10.0)]);

    let frames_dir = tempfile::tempdir().unwrap();
    for id in ["1", "3"] {
        RgbImage::from_pixel(256, 128, Rgb([200, 30, 30]))
            .save(frames_dir.path().join(format!("{id}.jpg")))
            .unwrap();
    }
    let out = tempfile::tempdir().unwrap();

    let report = pipeline
        .dewarp(
            &records,
            &index,
            &FrameDirectory::new(frames_dir.path()),
            out.path(),
            DewarpOptions::default(),
        )
        .unwrap();

    assert_eq!(report.written.len(), 2);
    assert_eq!(file_names(out.path()), vec!["1.jpg", "3.jpg"]);
    let view = image::open(out.path().join("1.jpg")).unwrap();
    assert_eq!((view.width(), view.height()), (64, 32));
}

#[test]
fn dewarp_skips_data_gaps_and_keeps_going() {
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();
    let mut records = oriented_records(&pipeline, &index, &[("1", 50.0, -15.0), ("2", 20.0, -5.0)]);
    records[1].matched_file = "GS019999".into();
    records.push(OrientedMatchRecord {
        orientation: None,
        object_id: ObjectId::new("4"),
        ..records[0].clone()
    });

    let out = tempfile::tempdir().unwrap();
    let report = pipeline
        .dewarp(
            &records,
            &index,
            &UniformFrames::new(128, 64),
            out.path(),
            DewarpOptions::default(),
        )
        .unwrap();

    assert_eq!(file_names(out.path()), vec!["1.jpg"]);
    let mut skipped: Vec<&str> = report.skipped.iter().map(|s| s.object_id.as_str()).collect();
    skipped.sort();
    assert_eq!(skipped, vec!["2", "4"]);
}

#[test]
fn dewarp_rejects_stale_frame_numbers() {
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();
    let mut records = oriented_records(&pipeline, &index, &[("1", 50.0, -15.0)]);
    records[0].frame_number = 21;

    let out = tempfile::tempdir().unwrap();
    let err = pipeline
        .dewarp(
            &records,
            &index,
            &UniformFrames::new(128, 64),
            out.path(),
            DewarpOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Trajectory(TrajectoryError::FrameOutOfRange { frame_number: 21, .. })
    ));
}

#[test]
fn skip_existing_leaves_views_alone() {
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();
    let records = oriented_records(&pipeline, &index, &[("1", 50.0, -15.0), ("3", 0.0, -10.0)]);
    let out = tempfile::tempdir().unwrap();
    fs::write(out.path().join("1.jpg"), b"earlier run").unwrap();

    let frames = UniformFrames::new(128, 64);
    let options = DewarpOptions {
        skip_existing: true,
        ..Default::default()
    };
    let report = pipeline
        .dewarp(&records, &index, &frames, out.path(), options)
        .unwrap();

    assert_eq!(report.existing, vec![ObjectId::new("1")]);
    assert_eq!(report.written, vec![out.path().join("3.jpg")]);
    assert_eq!(fs::read(out.path().join("1.jpg")).unwrap(), b"earlier run");
    assert_eq!(frames.requested_frames(), vec![0]);
}

#[test]
fn rerunning_reproduces_outputs() {
    let gps = gps_dir(21);
    let run = |out: &Path| -> (Vec<OrientedMatchRecord>, Vec<PathBuf>) {
        let index = TrajectoryIndex::open(gps.path()).unwrap();
        let pipeline = Pipeline::new(config()).unwrap();
        let records = oriented_records(&pipeline, &index, &[("1", 50.0, -15.0), ("3", 0.0, -10.0)]);
        let report = pipeline
            .dewarp(
                &records,
                &index,
                &UniformFrames::new(128, 64),
                out,
                DewarpOptions::default(),
            )
            .unwrap();
        (records, report.written)
    };

    let (first_out, second_out) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let (first_records, first_written) = run(first_out.path());
    let (second_records, second_written) = run(second_out.path());

    assert_eq!(first_records, second_records);
    assert_eq!(first_written.len(), second_written.len());
    for name in ["1.jpg", "3.jpg"] {
        assert_eq!(
            fs::read(first_out.path().join(name)).unwrap(),
            fs::read(second_out.path().join(name)).unwrap()
        );
    }
}

#[test]
fn smart_dewarp_keeps_a_well_aligned_match() {
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();
    let records = oriented_records(&pipeline, &index, &[("1", 50.0, -15.0)]);

    let frames = UniformFrames::new(128, 64);
    let out = tempfile::tempdir().unwrap();
    let options = DewarpOptions {
        mode: DewarpMode::Smart,
        ..Default::default()
    };
    pipeline
        .dewarp(&records, &index, &frames, out.path(), options)
        .unwrap();

    assert_eq!(frames.requested_frames(), vec![10]);
    assert!(frames.requests.lock().unwrap()[0].2);
}

#[test]
fn smart_dewarp_breaks_ties_toward_earlier_frames() {
    // The footprint sits on the side the camera faces away from, so the
    // frames at either end of the search window score equally.
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();
    let records = oriented_records(&pipeline, &index, &[("1", 50.0, 15.0)]);
    assert_eq!(records[0].frame_number, 10);

    let frames = UniformFrames::new(128, 64);
    let out = tempfile::tempdir().unwrap();
    let options = DewarpOptions {
        mode: DewarpMode::Smart,
        ..Default::default()
    };
    pipeline
        .dewarp(&records, &index, &frames, out.path(), options)
        .unwrap();

    assert_eq!(frames.requested_frames(), vec![5]);
    assert!(!frames.requests.lock().unwrap()[0].2);
}

#[test]
fn invalid_dewarp_config_fails_before_any_work() {
    let mut config = config();
    config.dewarp.h_fov = 200.;
    let err = Pipeline::new(config).unwrap_err();
    assert!(err.is_fatal());
    insta::assert_snapshot!(
        err,
        @"expected horizontal field of view in range (0, 180) degrees but got: 200"
    );
}

#[rstest::rstest]
#[case(f64::NAN)]
#[case(f64::NEG_INFINITY)]
#[case(-5.0)]
fn invalid_buffer_fails_before_matching(#[case] buffer_m: f64) {
    let config = PipelineConfig {
        buffer_m,
        ..config()
    };
    let err = Pipeline::new(config).unwrap_err();
    assert!(matches!(err, Error::Config { .. }), "{err}");
    assert!(err.is_fatal());
}

#[test]
fn repeated_object_ids_are_rejected() {
    let gps = gps_dir(21);
    let index = TrajectoryIndex::open(gps.path()).unwrap();
    let pipeline = Pipeline::new(config()).unwrap();
    let records = oriented_records(&pipeline, &index, &[("1", 50.0, -15.0)]);
    let repeated = vec![records[0].clone(); 4];

    let frames = UniformFrames::new(128, 64);
    let out = tempfile::tempdir().unwrap();
    let err = pipeline
        .dewarp(&repeated, &index, &frames, out.path(), DewarpOptions::default())
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(frames.requested_frames().is_empty());
    assert!(file_names(out.path()).is_empty());

    let matches = pipeline
        .match_footprints(&footprints(&[("1", 50.0, -15.0)]), &index)
        .unwrap()
        .matches;
    let repeated = vec![matches[0].clone(); 2];
    assert!(pipeline.orient(&repeated, &index).unwrap_err().is_fatal());
}
