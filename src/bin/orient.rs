use clap::Parser;
use std::{fs::File, io::BufWriter, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use vrtoolkit::{error::Error, prelude::*};

#[derive(Parser)]
#[command(version, about = "Estimate the vehicle heading at each matched frame", long_about = None)]
struct Args {
    /// Matches CSV written by `match_footprints`.
    #[arg(long)]
    matches: PathBuf,

    #[arg(long)]
    gps_dir: PathBuf,

    /// Path to write the oriented matches CSV to.
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the heading window in frames.
    #[arg(long)]
    window: Option<usize>,
}

fn run(args: Args) -> Result<(), Error> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(window) = args.window {
        config.window = window;
    }

    let pipeline = Pipeline::new(config)?;
    let file = File::open(&args.matches).map_err(Error::io(&args.matches))?;
    let matches = read_matches(file)?;
    let index = TrajectoryIndex::open(&args.gps_dir)?;
    let report = pipeline.orient(&matches, &index)?;

    let file = File::create(&args.output).map_err(Error::io(&args.output))?;
    write_oriented_matches(BufWriter::new(file), &report.records)?;

    info!(path = %args.output.display(), oriented = report.oriented(), "wrote oriented matches");
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
