//! Reduce one observing night.
//!
//! Moves the night's raw frames into `raw/`, builds bias, dark and flat
//! masters, corrects the science frames into `preprocessed/` and updates the
//! provenance ledger.
//!
//! Usage:
//! ```
//! cargo run --release --bin reduce_night -- /data/2015-10-27
//! cargo run --release --bin reduce_night -- --dir /data/2015-10-27 --output /reduced/2015-10-27 --jobs 8
//! cargo run --release --bin reduce_night -- /data/2015-10-27 --config casleo.yaml --high-sigma 2.5
//! ```
//!
//! Exit codes: 0 on success, 2 when the run cannot be set up (bad
//! configuration, missing input, uncreatable output directories), 1 for any
//! other failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use ccdred::{FitsFrameIo, Pipeline, PipelineError, RunConfig};
use clap::Parser;

const EXIT_FAILURE: u8 = 1;
const EXIT_SETUP: u8 = 2;

#[derive(Parser)]
#[command(name = "reduce_night")]
#[command(about = "Calibrate one night of CCD frames and record their provenance")]
#[command(version)]
struct Args {
    /// Directory holding the night's raw frames
    #[arg(value_name = "DIR", required_unless_present_any = ["dir", "config"])]
    input: Option<PathBuf>,

    /// Same as the positional directory
    #[arg(long, conflicts_with = "input")]
    dir: Option<PathBuf>,

    /// Root for raw/ and preprocessed/ (default: the input directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML run configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Provenance ledger file (.yaml or .json)
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Log filter, e.g. "info" or "ccdred=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Lower rejection threshold in sigma
    #[arg(long, value_name = "SIGMA")]
    low_sigma: Option<f32>,

    /// Upper rejection threshold in sigma
    #[arg(long, value_name = "SIGMA")]
    high_sigma: Option<f32>,

    /// Science frames corrected concurrently
    #[arg(short, long)]
    jobs: Option<usize>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_yaml_file(path)
                .with_context(|| format!("Loading run configuration {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(input) = self.input.or(self.dir) {
            config.input_dir = input;
        }
        if let Some(output) = self.output {
            config.output_root = Some(output);
        }
        if let Some(ledger) = self.ledger {
            config.ledger_path = Some(ledger);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(low) = self.low_sigma {
            config.clip.low_sigma = low;
        }
        if let Some(high) = self.high_sigma {
            config.clip.high_sigma = high;
        }
        if let Some(jobs) = self.jobs {
            config.max_concurrent = jobs;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(EXIT_SETUP);
        }
    };

    // checked before logging, which creates directories under the output root
    if !config.input_dir.is_dir() {
        eprintln!(
            "error: input directory '{}' does not exist",
            config.input_dir.display()
        );
        return ExitCode::from(EXIT_SETUP);
    }

    let log_dir = config.output_root().join("logs");
    if let Err(err) = common::log_setup::setup_logging(&config.log_level, &log_dir, "reduce_night") {
        eprintln!("error: {err:#}");
        return ExitCode::from(EXIT_SETUP);
    }

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_setup() => {
            tracing::error!(error = %err, "Run could not be set up");
            ExitCode::from(EXIT_SETUP)
        }
        Err(err) => {
            tracing::error!(error = %err, "Run failed");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(config: RunConfig) -> Result<(), PipelineError> {
    let io = FitsFrameIo::new();
    let summary = Pipeline::new(config, &io).run()?;

    println!("Ingested:  {}", summary.ingested);
    println!(
        "Roles:     {} bias, {} dark, {} flat, {} science, {} unknown",
        summary.roles.bias,
        summary.roles.dark,
        summary.roles.flat,
        summary.roles.science,
        summary.roles.unknown
    );
    for master in &summary.masters {
        println!("Master:    {}", master.display());
    }
    println!("Corrected: {}", summary.corrected);
    println!("Failed:    {}", summary.failed);
    println!("Ledger:    {}", summary.ledger_path.display());
    Ok(())
}
