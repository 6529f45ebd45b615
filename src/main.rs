// ============================================================================
// main.rs — flockd
// Entry point. Initializes logging, parses the command line and runs a
// headless flock session.
// ============================================================================

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use flockd::config::{BackendKind, FlockConfig};
use flockd::headless::{run_headless, HeadlessConfig, FRAME_INTERVAL_MS};

#[derive(Parser, Debug)]
#[command(
    name = "flockd",
    version,
    about = "Run the boid flocking engine headless and record its analytics"
)]
struct Cli {
    /// Number of frames to simulate.
    #[arg(long, default_value_t = 3_600)]
    frames: u32,

    /// Compute substrate (gpu or cpu). Overrides the config file.
    #[arg(long)]
    backend: Option<BackendKind>,

    /// JSON flock configuration; unspecified fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the initial flock layout. Overrides the config file.
    #[arg(long)]
    seed: Option<u64>,

    /// Write samples.csv, events.log and summary.json under this directory.
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Log progress every N frames (0 disables).
    #[arg(long, default_value_t = 600)]
    progress_interval: u32,

    /// Keep both predators parked instead of running the scripted grabs.
    #[arg(long)]
    no_input: bool,

    /// Restore the flock from a saved state file before the first frame.
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Save the final flock state to this file.
    #[arg(long)]
    save_state: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut flock = match &cli.config {
        Some(path) => FlockConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FlockConfig::default(),
    };
    if let Some(backend) = cli.backend {
        flock.backend = backend;
    }
    if cli.seed.is_some() {
        flock.seed = cli.seed;
    }
    flock.validate().context("invalid flock configuration")?;

    let headless = HeadlessConfig {
        frames: cli.frames,
        frame_interval_ms: FRAME_INTERVAL_MS,
        progress_interval: cli.progress_interval,
        scripted_input: !cli.no_input,
        export_dir: cli.export_dir,
        load_state_path: cli.load_state,
        save_state_path: cli.save_state,
    };

    let summary = run_headless(flock, &headless).context("headless run failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
