//! The training loop.
//!
//! A [`TrainingSession`] owns every piece of mutable training state: the
//! environment, the replay buffer, the exploration schedule, the live and
//! stable estimators and the episode history. Each episode resets the
//! environment, then alternates action selection, an environment step, a
//! replay push and one optimisation step until the episode ends. Every
//! `target_update` episodes (counting from episode 0) the stable estimator is
//! synced and the statistics file rewritten.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::agent::{select_action, DqnLearner, EstimatorPair};
use crate::config::TrainingConfig;
use crate::env::{CartPole, Environment};
use crate::error::{DqnError, Result};
use crate::estimator::{Parameters, ValueEstimator};
use crate::loss::HuberLoss;
use crate::metrics::{EpisodeSummary, MetricsTracker, StatsFile};
use crate::network::ConvQNetwork;
use crate::preprocess::{FramePreprocessor, StateTracker};
use crate::replay_buffer::{ReplayBuffer, Transition};
use crate::schedule::DecaySchedule;

/// Resumable snapshot of a training run.
///
/// Only the live parameters are stored; optimizer state starts fresh on
/// restore.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub parameters: Parameters,
    pub steps_taken: u64,
    pub episodes_completed: usize,
    pub history: Vec<EpisodeSummary>,
}

impl Checkpoint {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, bincode::serialize(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(bincode::deserialize(&data)?)
    }
}

pub struct TrainingSession<E, V> {
    env: E,
    preprocessor: FramePreprocessor,
    state_tracker: StateTracker,
    buffer: ReplayBuffer,
    schedule: DecaySchedule,
    pair: EstimatorPair<V>,
    learner: DqnLearner,
    metrics: MetricsTracker,
    history: Vec<EpisodeSummary>,
    stats: StatsFile,
    num_episodes: usize,
    target_update: usize,
    checkpoint_path: Option<PathBuf>,
    rng: StdRng,
}

impl<E: Environment, V: ValueEstimator> TrainingSession<E, V> {
    pub fn new(config: &TrainingConfig, env: E, pair: EstimatorPair<V>) -> Result<Self> {
        config.validate()?;
        if pair.live.num_actions() != env.action_space_size() {
            return Err(DqnError::dimension_mismatch(
                format!("estimator with {} actions", env.action_space_size()),
                format!("{} actions", pair.live.num_actions()),
            ));
        }

        let learner = DqnLearner::new(config.batch_size, config.gamma)
            .with_loss(HuberLoss::new(config.huber_delta))
            .with_clipper(config.gradient_clip.clone());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(2)),
            None => StdRng::from_entropy(),
        };

        Ok(TrainingSession {
            env,
            preprocessor: FramePreprocessor::new(config.frame.height, config.frame.width)?,
            state_tracker: StateTracker::new(),
            buffer: ReplayBuffer::new(config.replay_capacity)?,
            schedule: DecaySchedule::new(config.eps_start, config.eps_end, config.eps_decay)?,
            pair,
            learner,
            metrics: MetricsTracker::default(),
            history: Vec::new(),
            stats: StatsFile::new(config.stats_path.clone()),
            num_episodes: config.num_episodes,
            target_update: config.target_update,
            checkpoint_path: config.checkpoint_path.clone(),
            rng,
        })
    }

    /// Train until `num_episodes` episodes have completed, then write the
    /// statistics (and the checkpoint, when configured) once more so that
    /// both cover the final episode.
    pub fn run(&mut self) -> Result<&[EpisodeSummary]> {
        if self.episodes_completed() >= self.num_episodes {
            warn!(
                "nothing to do: {} of {} episodes already completed",
                self.episodes_completed(),
                self.num_episodes
            );
        }
        while self.episodes_completed() < self.num_episodes {
            self.run_episode()?;
        }
        self.stats.persist(&self.history)?;
        if let Some(path) = &self.checkpoint_path {
            self.save_checkpoint(path)?;
        }
        info!(
            "training finished after {} episodes, statistics in {}",
            self.history.len(),
            self.stats.path().display()
        );
        Ok(&self.history)
    }

    /// Play one episode to its end, learning after every step.
    pub fn run_episode(&mut self) -> Result<EpisodeSummary> {
        let num_actions = self.env.action_space_size();
        let frame = self.env.reset()?;
        let mut state = self.state_tracker.reset(self.preprocessor.process(frame.view())?);
        self.metrics.start_episode();

        loop {
            self.metrics.record_epsilon(self.schedule.threshold() as f32);
            let action = select_action(&state, &mut self.schedule, &self.pair.live, num_actions, &mut self.rng)?;
            let step = self.env.step(action)?;
            self.metrics.step(step.reward);

            let difference = self.state_tracker.observe(self.preprocessor.process(step.frame.view())?);
            let next_state = if step.done { None } else { Some(difference) };
            // The buffer and the next selection each need their own copy.
            self.buffer
                .push(Transition::new(state, action, next_state.clone(), step.reward));

            if let Some(loss) = self.learner.optimize(&mut self.pair, &self.buffer, &mut self.rng)? {
                self.metrics.record_loss(loss);
            }

            match next_state {
                Some(next) => state = next,
                None => break,
            }
        }

        self.end_episode()
    }

    /// Record the finished episode and sync on every `target_update`-th one.
    fn end_episode(&mut self) -> Result<EpisodeSummary> {
        let summary = self.metrics.end_episode();
        self.history.push(summary);
        info!(
            "episode {}: reward {}, duration {}, epsilon {:.3}",
            summary.episode,
            summary.reward,
            summary.duration,
            self.schedule.threshold()
        );

        if summary.episode % self.target_update == 0 {
            self.sync()?;
        }
        Ok(summary)
    }

    /// Hard-copy live → stable and persist the statistics (and a checkpoint
    /// when one is configured).
    pub fn sync(&mut self) -> Result<()> {
        self.pair.sync()?;
        self.stats.persist(&self.history)?;
        if let Some(path) = self.checkpoint_path.clone() {
            self.save_checkpoint(&path)?;
        }
        info!(
            "synced stable estimator after {} episodes ({} steps), mean loss {}",
            self.history.len(),
            self.schedule.steps_taken(),
            self.metrics
                .avg_loss(100)
                .map_or_else(|| "n/a".to_string(), |l| format!("{:.5}", l))
        );
        Ok(())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            parameters: self.pair.live.parameters(),
            steps_taken: self.schedule.steps_taken(),
            episodes_completed: self.episodes_completed(),
            history: self.history.clone(),
        }
    }

    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.checkpoint().save(path)
    }

    /// Continue a run from a checkpoint written by [`save_checkpoint`](Self::save_checkpoint).
    pub fn restore<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let checkpoint = Checkpoint::load(path)?;
        self.pair.live.load_parameters(&checkpoint.parameters)?;
        self.pair.sync()?;
        self.schedule = self.schedule.clone().with_steps_taken(checkpoint.steps_taken);
        self.metrics.set_episode_count(checkpoint.episodes_completed);
        self.history = checkpoint.history;
        info!(
            "restored checkpoint: {} episodes, {} steps",
            checkpoint.episodes_completed, checkpoint.steps_taken
        );
        Ok(())
    }

    pub fn episodes_completed(&self) -> usize {
        self.metrics.episode_count()
    }

    pub fn history(&self) -> &[EpisodeSummary] {
        &self.history
    }

    pub fn pair(&self) -> &EstimatorPair<V> {
        &self.pair
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn schedule(&self) -> &DecaySchedule {
        &self.schedule
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    pub fn stats_file(&self) -> &StatsFile {
        &self.stats
    }
}

impl TrainingSession<CartPole, ConvQNetwork> {
    /// CartPole from pixels with the convolutional network described by `config`.
    pub fn from_config(config: &TrainingConfig) -> Result<Self> {
        config.validate()?;
        let env = CartPole::new(config.env.clone(), config.seed.map(|s| s.wrapping_add(1)));
        let mut init_rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let live = ConvQNetwork::new(
            &config.network,
            (3, config.frame.height, config.frame.width),
            env.action_space_size(),
            config.optimizer.build(),
            config.learning_rate,
            &mut init_rng,
        )?;
        Self::new(config, env, EstimatorPair::from_live(live)?)
    }
}
