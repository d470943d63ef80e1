//! Occupancy grid mapping executable entry point.
//!
//! # Architecture
//!
//! The executable replays a recording through a single engine:
//!
//!     - Start the session and logger
//!     - Load the engine parameters and the recording
//!     - Start the engine worker, with a pose buffer built from the recorded poses
//!     - For each recorded cycle:
//!         - Decode the raw and obstacle cloud frames
//!         - Send them to the worker and wait for the result
//!         - Save published grids into the session
//!     - Stop the worker and the session

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::{convert::TryFrom, path::PathBuf};

use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use structopt::StructOpt;

// Internal
use ogm_lib::{
    fusion::{CycleInput, OgmEngine},
    params::OgmParams,
    publisher::GridPublisher,
    replay::Recording,
    worker::{EngineWorker, WorkerSignal},
};
use util::{
    logger::{logger_init, LevelFilter},
    raise_error,
    session::Session,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Replay recorded point clouds through the occupancy grid mapping engine.
#[derive(Debug, StructOpt)]
#[structopt(name = "ogm_exec")]
struct Opts {
    /// Path to the JSON recording to replay
    #[structopt(parse(from_os_str))]
    recording: PathBuf,

    /// Engine parameter file, relative to the params directory unless absolute
    #[structopt(short, long, default_value = "ogm.toml")]
    params: String,

    /// Directory in which to create the session
    #[structopt(short, long, default_value = "sessions", parse(from_os_str))]
    sessions_dir: PathBuf,

    /// Largest gap in seconds between a cloud and the pose used to place it
    #[structopt(long, default_value = "0.05")]
    pose_tolerance_s: f64,

    /// Print per-cycle summaries to the console as well as the log file
    #[structopt(short, long)]
    verbose: bool,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    let opts = Opts::from_args();

    // Initialise session
    let session = Session::new("ogm_exec", &opts.sessions_dir)
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    let stdout_level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logger_init(LevelFilter::Trace, stdout_level, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Occupancy Grid Mapping Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD DATA ----

    let params =
        OgmParams::load(&opts.params).wrap_err("Could not load the engine parameters")?;

    let recording = Recording::load(&opts.recording)
        .wrap_err_with(|| format!("Could not load recording {:?}", opts.recording))?;

    info!(
        "Loaded recording with {} cycles and {} pose samples",
        recording.cycles.len(),
        recording.poses.len()
    );

    // ---- INITIALISE ENGINE ----

    let transforms = recording.pose_buffer(opts.pose_tolerance_s);

    let mut engine = OgmEngine::new(params.clone(), Box::new(transforms))
        .wrap_err("Failed to initialise the engine")?;
    engine
        .init_archive(&session)
        .wrap_err("Failed to initialise the engine archive")?;

    let publisher = GridPublisher::new(params.grid.publish_mode, &params.updater);
    let worker = EngineWorker::spawn("replay", engine, publisher)
        .wrap_err("Failed to start the engine worker")?;

    info!("Initialisation complete\n");

    // ---- REPLAY ----

    let mut num_published = 0;
    let mut num_skipped = 0;

    for (i, cycle) in recording.cycles.into_iter().enumerate() {
        let input = match CycleInput::try_from(cycle) {
            Ok(c) => c,
            Err(e) => {
                warn!("Dropping recorded cycle {}, couldn't decode clouds: {}", i, e);
                continue;
            }
        };

        worker.send_clouds(input)?;

        match worker.recv()? {
            WorkerSignal::Snapshot(msg, report) => {
                debug!(
                    "Cycle {} published, log-odds in [{:.3}, {:.3}]",
                    report.cycle, report.min_log_odds, report.max_log_odds
                );
                let stamp = msg.timestamp;
                session.save_with_stamp("occupancy_grid/ogm.json", &stamp, *msg);
                num_published += 1;
            }
            WorkerSignal::Skipped(e) => {
                warn!("Recorded cycle {} skipped: {}", i, e);
                num_skipped += 1;
            }
            WorkerSignal::Cancelled => info!("Recorded cycle {} cancelled", i),
            WorkerSignal::Error(e) => {
                return Err(eyre!("Engine worker failed on recorded cycle {}: {}", i, e))
            }
            s => raise_error!("Unexpected signal from the engine worker: {:?}", s),
        }
    }

    // ---- SHUTDOWN ----

    worker.stop().wrap_err("Engine worker didn't stop cleanly")?;

    info!(
        "Replay complete: {} grids published, {} cycles skipped",
        num_published, num_skipped
    );

    session.exit();

    Ok(())
}
