use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use pixel_dqn::config::TrainingConfig;
use pixel_dqn::trainer::TrainingSession;

/// Train a DQN agent on CartPole from rendered frames
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML training configuration; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of episodes, overriding the configuration
    #[arg(long)]
    episodes: Option<usize>,

    /// Where to write the reward/duration statistics
    #[arg(long)]
    stats_path: Option<PathBuf>,

    /// Checkpoint written at every sync
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Continue from the checkpoint before training
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Seed for network initialisation, exploration and the environment
    #[arg(long)]
    seed: Option<u64>,

    /// Write the metrics summary as JSON after training
    #[arg(long)]
    metrics_json: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::load(path).with_context(|| format!("reading {}", path.display()))?,
        None => TrainingConfig::default(),
    };
    if let Some(episodes) = args.episodes {
        config = config.num_episodes(episodes);
    }
    if let Some(path) = &args.stats_path {
        config = config.stats_path(path.clone());
    }
    if let Some(path) = &args.checkpoint {
        config = config.checkpoint_path(path.clone());
    }
    if let Some(seed) = args.seed {
        config = config.seed(seed);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let mut session = TrainingSession::from_config(&config)?;
    if args.resume {
        let path = config
            .checkpoint_path
            .as_ref()
            .context("--resume needs a checkpoint path")?;
        session
            .restore(path)
            .with_context(|| format!("restoring {}", path.display()))?;
    }

    let history = session.run()?;
    if let Some(best) = history.iter().map(|s| s.duration).max() {
        info!("longest episode: {} steps", best);
    }

    if let Some(path) = &args.metrics_json {
        session.metrics().save(path)?;
        info!("metrics written to {}", path.display());
    }
    Ok(())
}
