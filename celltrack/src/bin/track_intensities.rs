//! Segment, track and tabulate every position of an experiment.
//!
//! Reads frames from `<input>/pos<N>/<channel>/` and writes
//! `trajectories_<label>_<N>.json` and `intensities_<label>_<N>.json` for each
//! reporter channel into the output directory.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin track_intensities -- \
//!     --input /data/experiment --output results --config pipeline.json
//!
//! # Override the most-tuned knobs without editing the config
//! cargo run --release --bin track_intensities -- \
//!     --input /data/experiment --output results --memory 4 --long-min-frames 20
//! ```

use std::path::PathBuf;

use celltrack::io::{DirectorySource, JsonDirectorySink};
use celltrack::pipeline::run_experiment;
use celltrack::shared_args::SharedPipelineArgs;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(
    name = "Track Intensities",
    about = "Segments nuclei, tracks cells and extracts reporter intensities per position",
    long_about = None
)]
struct Args {
    /// Experiment directory containing pos<N>/<channel>/ frame folders
    #[arg(long)]
    input: PathBuf,

    /// Directory the trajectory and intensity tables are written to
    #[arg(long, default_value = "celltrack_output")]
    output: PathBuf,

    /// Write the effective configuration here and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    #[command(flatten)]
    pipeline: SharedPipelineArgs,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = args.pipeline.resolve_config()?;
    if let Some(path) = &args.dump_config {
        config.save(path)?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    let source = DirectorySource::new(&args.input);
    let sink = JsonDirectorySink::new(&args.output)?;

    let positions = celltrack::io::StackSource::positions(&source)?;
    let bar = ProgressBar::new(positions.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} positions {msg}")?,
    );

    let outcomes = run_experiment(&config, &source, &sink, |outcome| {
        bar.set_message(format!("(pos{} done)", outcome.position));
        bar.inc(1);
    })?;
    bar.finish();

    let mut failures = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => {
                for channel in &report.channels {
                    println!(
                        "pos{:<4} {:<8} {:>6} detections {:>5} particles {:>5} long",
                        report.position,
                        channel.label,
                        channel.detections,
                        channel.particles,
                        channel.long_particles
                    );
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("pos{}: {}", outcome.position, e);
            }
        }
    }

    println!(
        "Processed {} positions ({} failed), results in {}",
        outcomes.len(),
        failures,
        sink.root().display()
    );
    Ok(())
}
