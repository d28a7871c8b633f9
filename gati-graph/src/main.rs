//! GatiGraph simulation runner
//!
//! Drives a synthetic trajectory through the keyframe back end and streams
//! every pose event to stdout as one JSON object per line.
//!
//! # Usage
//!
//! ```bash
//! # Default config, 200 frames of noisy random walk
//! cargo run --release
//!
//! # Custom config and trajectory
//! cargo run --release -- --config configs/gati.toml --frames 500 --seed 42
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::thread;

use clap::{Parser, ValueEnum};

use gati_graph::io::{SimulatedEstimator, SimulatedFrame, TrajectoryGenerator, TransformNoise};
use gati_graph::{ChannelPublisher, FrameOutcome, GatiConfig, KeyframeBackend, PoseEventKind};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Trajectory {
    /// Straight line
    Line,
    /// Constant-curvature arc
    Arc,
    /// Random heading changes with occasional stops
    RandomWalk,
}

#[derive(Parser, Debug)]
#[command(name = "gati-graph")]
#[command(about = "Run a simulated trajectory through the keyframe pose graph")]
struct Args {
    /// Configuration file (defaults to configs/gati.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trajectory shape
    #[arg(long, value_enum, default_value = "random-walk")]
    trajectory: Trajectory,

    /// Number of frames after the first
    #[arg(short, long, default_value_t = 200)]
    frames: usize,

    /// Forward distance per frame
    #[arg(long, default_value_t = 1.0)]
    step: f64,

    /// Registration translation noise (per axis)
    #[arg(long, default_value_t = 0.05)]
    translation_sigma: f64,

    /// Registration heading noise (radians)
    #[arg(long, default_value_t = 0.005)]
    rotation_sigma: f64,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Only emit optimized poses
    #[arg(long)]
    optimized_only: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => GatiConfig::load(path)?,
        None => GatiConfig::load_default()?,
    };

    let frames = generate(args);
    let noise = TransformNoise {
        translation_sigma: args.translation_sigma,
        rotation_sigma: args.rotation_sigma,
    };
    let estimator = SimulatedEstimator::new(noise, args.seed)?;

    log::info!("gati-graph starting");
    log::info!("  Trajectory: {:?} ({} frames)", args.trajectory, frames.len());
    log::info!(
        "  Thresholds: odom {}, keyframe {}",
        config.odometry.odom_threshold,
        config.keyframe.keyframe_threshold
    );

    let (publisher, rx) = ChannelPublisher::unbounded();
    let optimized_only = args.optimized_only;
    let printer = thread::spawn(move || -> std::io::Result<u64> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let mut written = 0;
        for event in rx {
            if optimized_only && event.kind != PoseEventKind::Optimized {
                continue;
            }
            serde_json::to_writer(&mut out, &event)?;
            writeln!(out)?;
            written += 1;
        }
        Ok(written)
    });

    let mut backend = KeyframeBackend::new(&config, estimator, publisher)?;
    let mut dropped = 0;
    let mut keyframes = 0;
    for frame in frames {
        match backend.process_frame(frame, frame.timestamp_us())? {
            FrameOutcome::Dropped(_) => dropped += 1,
            outcome if outcome.keyframe().is_some() => keyframes += 1,
            _ => {}
        }
    }

    let state = backend.state();
    log::info!(
        "Processed: {} nodes, {} dropped, {} keyframes, {} solves",
        state.pose_count() + 1,
        dropped,
        keyframes,
        backend.solver().solve_count()
    );
    drop(backend);

    match printer.join() {
        Ok(result) => {
            let written = result?;
            log::info!("Wrote {} pose events", written);
        }
        Err(_) => log::error!("Output thread panicked"),
    }
    Ok(())
}

fn generate(args: &Args) -> Vec<SimulatedFrame> {
    let generator = TrajectoryGenerator::new();
    match args.trajectory {
        Trajectory::Line => generator.forward(args.frames, args.step),
        Trajectory::Arc => generator.arc(args.frames, args.step, 0.05),
        Trajectory::RandomWalk => generator.random_walk(args.frames, args.step, 0.15, args.seed),
    }
    .build()
}
