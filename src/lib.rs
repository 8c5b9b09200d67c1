//! # pixel-dqn - Deep Q-Learning from Rendered Frames
//!
//! pixel-dqn trains a Deep Q-Network to balance a cart-pole using nothing but
//! rendered screen frames. Frames are resized, scaled and differenced into
//! state tensors, a small convolutional network estimates one value per
//! action, and an experience-replay loop with a periodically synced stable
//! network drives learning.
//!
//! ## Key Features
//!
//! - **Replay**: fixed-capacity circular buffer with uniform sampling without replacement
//! - **Exploration**: epsilon-greedy selection over an exponential decay schedule
//! - **Learning**: bootstrap targets from a stable copy, Huber loss, clipped gradients
//! - **Network**: convolutional Q-network with explicit backward pass over `ndarray`
//! - **Optimizers**: SGD, Adam, RMSProp with per-parameter state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pixel_dqn::config::TrainingConfig;
//! use pixel_dqn::trainer::TrainingSession;
//!
//! let config = TrainingConfig::default().num_episodes(20).seed(42);
//! let mut session = TrainingSession::from_config(&config).unwrap();
//! let history = session.run().unwrap();
//! println!("last episode lasted {} steps", history[history.len() - 1].duration);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - ReLU and linear activations
//! - [`agent`] - Action selection, the estimator pair and the DQN update
//! - [`config`] - YAML training configuration
//! - [`env`] - Environment trait and the CartPole simulator
//! - [`error`] - Error types and result handling
//! - [`estimator`] - The value-estimator trait
//! - [`layers`] - Convolution and dense layers
//! - [`loss`] - Huber loss
//! - [`metrics`] - Training metrics and the statistics file
//! - [`network`] - Convolutional Q-network
//! - [`optimizer`] - Optimization algorithms and gradient clipping
//! - [`preprocess`] - Frame resizing and difference states
//! - [`replay_buffer`] - Experience replay
//! - [`schedule`] - Exploration decay schedule
//! - [`trainer`] - The training loop and checkpoints

pub mod activations;
pub mod agent;
pub mod config;
pub mod env;
pub mod error;
pub mod estimator;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod preprocess;
pub mod replay_buffer;
pub mod schedule;
pub mod trainer;

#[cfg(test)]
mod tests;
