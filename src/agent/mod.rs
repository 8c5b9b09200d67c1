//! # Agent Module
//!
//! The decision-making and learning half of DQN.
//!
//! - [`select_action`]: epsilon-greedy choice driven by a [`DecaySchedule`](crate::schedule::DecaySchedule)
//! - [`EstimatorPair`]: the live network and its periodically synced stable copy
//! - [`DqnLearner`]: one optimisation step on a replay batch
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pixel_dqn::agent::{DqnLearner, EstimatorPair};
//! use pixel_dqn::config::NetworkConfig;
//! use pixel_dqn::network::ConvQNetwork;
//! use pixel_dqn::optimizer::{OptimizerWrapper, RMSProp};
//! use pixel_dqn::replay_buffer::ReplayBuffer;
//!
//! let mut rng = rand::thread_rng();
//! let optimizer = OptimizerWrapper::RMSProp(RMSProp::default());
//! let live = ConvQNetwork::new(&NetworkConfig::default(), (3, 80, 80), 2, optimizer, 0.01, &mut rng).unwrap();
//! let mut pair = EstimatorPair::from_live(live).unwrap();
//! let buffer = ReplayBuffer::new(10_000).unwrap();
//!
//! let learner = DqnLearner::new(128, 0.999);
//! // Nothing happens until the buffer holds a full batch.
//! assert!(learner.optimize(&mut pair, &buffer, &mut rng).unwrap().is_none());
//! ```

mod dqn;
mod selector;

pub use dqn::{bootstrap_values, compute_targets, DqnLearner, EstimatorPair, TrainBatch};
pub use selector::{argmax, select_action};
