use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::metrics::EpisodeSummary;

/// Bounded histories of training signals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Loss of every optimisation step
    pub losses: VecDeque<f32>,

    /// Rewards per episode
    pub episode_rewards: VecDeque<f32>,

    /// Episode lengths
    pub episode_lengths: VecDeque<usize>,

    /// Exploration threshold at each action selection
    pub epsilons: VecDeque<f32>,
}

impl TrainingMetrics {
    pub fn new(history_size: usize) -> Self {
        TrainingMetrics {
            losses: VecDeque::with_capacity(history_size),
            episode_rewards: VecDeque::with_capacity(history_size),
            episode_lengths: VecDeque::with_capacity(history_size),
            epsilons: VecDeque::with_capacity(history_size),
        }
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, value: T, limit: usize) {
    if history.len() >= limit {
        history.pop_front();
    }
    history.push_back(value);
}

/// Tracks metrics during training
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    metrics: TrainingMetrics,
    history_size: usize,

    current_episode_reward: f32,
    current_episode_length: usize,
    episode_count: usize,
    total_steps: usize,
}

impl MetricsTracker {
    pub fn new(history_size: usize) -> Self {
        MetricsTracker {
            metrics: TrainingMetrics::new(history_size),
            history_size: history_size.max(1),
            current_episode_reward: 0.0,
            current_episode_length: 0,
            episode_count: 0,
            total_steps: 0,
        }
    }

    pub fn record_loss(&mut self, loss: f32) {
        push_bounded(&mut self.metrics.losses, loss, self.history_size);
    }

    pub fn record_epsilon(&mut self, epsilon: f32) {
        push_bounded(&mut self.metrics.epsilons, epsilon, self.history_size);
    }

    /// Start a new episode
    pub fn start_episode(&mut self) {
        self.current_episode_reward = 0.0;
        self.current_episode_length = 0;
    }

    /// Record a step within an episode
    pub fn step(&mut self, reward: f32) {
        self.current_episode_reward += reward;
        self.current_episode_length += 1;
        self.total_steps += 1;
    }

    /// Close the current episode and return its summary
    pub fn end_episode(&mut self) -> EpisodeSummary {
        let summary = EpisodeSummary {
            episode: self.episode_count,
            reward: self.current_episode_reward,
            duration: self.current_episode_length,
        };
        push_bounded(&mut self.metrics.episode_rewards, summary.reward, self.history_size);
        push_bounded(&mut self.metrics.episode_lengths, summary.duration, self.history_size);
        self.episode_count += 1;
        self.start_episode();
        summary
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    /// Continue counting from a restored run
    pub fn set_episode_count(&mut self, episode_count: usize) {
        self.episode_count = episode_count;
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn current_episode_reward(&self) -> f32 {
        self.current_episode_reward
    }

    /// Get recent average loss
    pub fn avg_loss(&self, window: usize) -> Option<f32> {
        window_mean(self.metrics.losses.iter().copied(), self.metrics.losses.len(), window)
    }

    /// Get recent average episode reward
    pub fn avg_episode_reward(&self, window: usize) -> Option<f32> {
        window_mean(
            self.metrics.episode_rewards.iter().copied(),
            self.metrics.episode_rewards.len(),
            window,
        )
    }

    pub fn avg_episode_length(&self, window: usize) -> Option<f32> {
        window_mean(
            self.metrics.episode_lengths.iter().map(|&l| l as f32),
            self.metrics.episode_lengths.len(),
            window,
        )
    }

    /// Save metrics as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let serialized = serde_json::to_string_pretty(&self.metrics)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Load metrics from a JSON file
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> crate::error::Result<()> {
        let data = std::fs::read_to_string(path)?;
        self.metrics = serde_json::from_str(&data)?;
        Ok(())
    }
}

fn window_mean<I>(values: I, len: usize, window: usize) -> Option<f32>
where
    I: DoubleEndedIterator<Item = f32>,
{
    let n = window.min(len);
    if n == 0 {
        return None;
    }
    let sum: f32 = values.rev().take(n).sum();
    Some(sum / n as f32)
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}
