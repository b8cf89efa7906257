use clap::Parser;
use std::{fs::File, io::BufWriter, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use vrtoolkit::{error::Error, prelude::*};

#[derive(Parser)]
#[command(version, about = "Match building footprints to GPS trajectory frames", long_about = None)]
struct Args {
    /// CSV of footprint centroids.
    #[arg(long)]
    footprints: PathBuf,

    /// Directory of `*_GoPro Max-GPS5.csv` traces.
    #[arg(long)]
    gps_dir: PathBuf,

    /// Path to write the matches CSV to.
    #[arg(short, long)]
    output: PathBuf,

    /// Optional pipeline config as JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the match buffer in meters.
    #[arg(long)]
    buffer: Option<f64>,
}

fn run(args: Args) -> Result<(), Error> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(buffer) = args.buffer {
        config.buffer_m = buffer;
    }

    let pipeline = Pipeline::new(config)?;
    let footprints = read_footprints_file(&args.footprints)?;
    let index = TrajectoryIndex::open(&args.gps_dir)?;
    let report = pipeline.match_footprints(&footprints, &index)?;

    let file = File::create(&args.output).map_err(Error::io(&args.output))?;
    write_matches(BufWriter::new(file), &report.matches)?;

    info!(path = %args.output.display(), rows = report.matches.len(), "wrote matches");
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
