use clap::Parser;
use std::{fs::File, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use vrtoolkit::{error::Error, prelude::*};

#[derive(Parser)]
#[command(version, about = "Cut facade views out of panoramic frames", long_about = None)]
struct Args {
    /// Oriented matches CSV written by `orient`.
    #[arg(long)]
    oriented: PathBuf,

    #[arg(long)]
    gps_dir: PathBuf,

    /// Root of the extracted panoramic frames.
    #[arg(long)]
    frames_dir: PathBuf,

    /// Directory to write `<ObjectId>.jpg` views to.
    #[arg(short, long)]
    output_dir: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Horizontal field of view in degrees.
    #[arg(long)]
    h_fov: Option<f64>,

    /// Pitch in degrees.
    #[arg(long, allow_negative_numbers = true)]
    pitch: Option<f64>,

    /// Output width in pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Output aspect ratio as `W:H`.
    #[arg(long)]
    aspect: Option<AspectRatio>,

    /// Yaw offset in degrees.
    #[arg(long, allow_negative_numbers = true)]
    yaw_offset: Option<f64>,

    /// Search neighbouring frames for the best aligned view.
    #[arg(long)]
    smart: bool,

    #[arg(long)]
    search_radius: Option<usize>,

    #[arg(long)]
    window: Option<usize>,

    /// Keep views that already exist in the output directory.
    #[arg(long)]
    skip_existing: bool,
}

fn run(args: Args) -> Result<(), Error> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    let dewarp = &mut config.dewarp;
    dewarp.h_fov = args.h_fov.unwrap_or(dewarp.h_fov);
    dewarp.pitch = args.pitch.unwrap_or(dewarp.pitch);
    dewarp.width = args.width.unwrap_or(dewarp.width);
    dewarp.aspect = args.aspect.unwrap_or(dewarp.aspect);
    dewarp.yaw_offset = args.yaw_offset.unwrap_or(dewarp.yaw_offset);
    config.search_radius = args.search_radius.unwrap_or(config.search_radius);
    config.window = args.window.unwrap_or(config.window);

    let pipeline = Pipeline::new(config)?;
    let file = File::open(&args.oriented).map_err(Error::io(&args.oriented))?;
    let records = read_oriented_matches(file)?;
    let index = TrajectoryIndex::open(&args.gps_dir)?;
    let frames = FrameDirectory::new(&args.frames_dir);

    let options = DewarpOptions {
        mode: match args.smart {
            true => DewarpMode::Smart,
            false => DewarpMode::Plain,
        },
        skip_existing: args.skip_existing,
    };
    let report = pipeline.dewarp(&records, &index, &frames, &args.output_dir, options)?;

    info!(
        output_dir = %args.output_dir.display(),
        written = report.written.len(),
        "wrote views"
    );
    Ok(())
}

fn main() -> ExitCode {
    // Register an event subscriber that prints events to STDOUT.
    let subscriber = tracing_subscriber::FmtSubscriber::new();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already set");
    }

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
