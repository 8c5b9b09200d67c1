//! Environments that render their state as RGB frames.

mod cartpole;

pub use cartpole::CartPole;

use crate::error::Result;
use crate::preprocess::RawFrame;

/// Outcome of one environment step.
#[derive(Clone, Debug)]
pub struct Step {
    pub frame: RawFrame,
    pub reward: f32,
    pub done: bool,
}

pub trait Environment {
    /// Start a new episode and return its first frame.
    fn reset(&mut self) -> Result<RawFrame>;

    /// Apply `action`, which must be below [`action_space_size`](Self::action_space_size).
    fn step(&mut self, action: usize) -> Result<Step>;

    fn action_space_size(&self) -> usize;
}
