use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use racetrack_rl::cliff_walk;
use racetrack_rl::config::TrainingConfig;
use racetrack_rl::racetrack::{self, Preset, Track};
use racetrack_rl::solver::monte_carlo::ReturnAccounting;

/// Learn to drive around a racetrack with off-policy Monte Carlo control.
#[derive(Parser, Debug)]
#[command(name = "racetrack", version, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a track.
    Show {
        /// Built-in track (narrow, wide).
        #[arg(long)]
        track: Option<Preset>,

        /// Custom rows, e.g. "0,3; 1,2".
        #[arg(long)]
        rows: Option<String>,
    },

    /// Train on a track and print the greedy trajectory from every start cell.
    Train {
        /// Number of episodes, discarded ones included.
        #[arg(long)]
        iterations: Option<u64>,

        /// Exploration probability of the behavior policy.
        #[arg(long)]
        epsilon: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,

        /// Built-in track (narrow, wide).
        #[arg(long)]
        track: Option<Preset>,

        /// Custom rows, e.g. "0,3; 1,2". Every cell that is not a finish
        /// cell needs a track cell to its right or above it.
        #[arg(long)]
        rows: Option<String>,

        /// Return accounting order (forward, backward).
        #[arg(long)]
        accounting: Option<ReturnAccounting>,
    },

    /// Run Q-learning on the cliff walk.
    Cliff {
        #[arg(long)]
        episodes: Option<u64>,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn load_config(path: &Option<PathBuf>) -> Result<TrainingConfig> {
    match path {
        Some(path) => {
            tracing::info!("Reading config file {}", path.display());
            Ok(TrainingConfig::load(path)?)
        }
        None => Ok(TrainingConfig::default()),
    }
}

fn select_track(config: &TrainingConfig, track: Option<Preset>, rows: Option<String>) -> Result<Track> {
    let track = match (rows, track) {
        (Some(rows), _) => Track::parse(&rows)?,
        (None, Some(preset)) => preset.track()?,
        (None, None) => config.build_track()?,
    };
    Ok(track)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Show { track, rows } => {
            let track = select_track(&config, track, rows)?;
            println!("{}", track);
            println!(
                "{} start cells, {} finish cells",
                track.start_cells().len(),
                track.finish_cells().len()
            );
        }
        Commands::Train {
            iterations,
            epsilon,
            seed,
            track,
            rows,
            accounting,
        } => {
            if let Some(iterations) = iterations {
                config.iterations = iterations;
            }
            if let Some(epsilon) = epsilon {
                config.epsilon = epsilon;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(accounting) = accounting {
                config.return_accounting = accounting;
            }
            config.validate()?;
            let track = select_track(&config, track, rows)?;
            racetrack::run(&config, track)?;
        }
        Commands::Cliff { episodes, seed } => {
            if let Some(episodes) = episodes {
                config.cliff.episodes = episodes;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            config.validate()?;
            let mut rng = config.rng();
            cliff_walk::run(&config.cliff, &mut rng);
        }
    }

    Ok(())
}
