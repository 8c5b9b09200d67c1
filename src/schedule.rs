use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};

/// Exponential exploration schedule.
///
/// The threshold starts at `start` and decays towards `end` as
/// `end + (start - end) * exp(-steps_taken / decay_constant)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecaySchedule {
    start: f64,
    end: f64,
    decay_constant: f64,
    steps_taken: u64,
}

impl DecaySchedule {
    pub fn new(start: f64, end: f64, decay_constant: f64) -> Result<Self> {
        if !(decay_constant > 0.0) {
            return Err(DqnError::invalid_parameter(
                "decay_constant".to_string(),
                format!("must be positive, got {}", decay_constant),
            ));
        }
        // Equal endpoints give a constant threshold.
        if !(start >= end) {
            return Err(DqnError::invalid_parameter(
                "start".to_string(),
                format!("must not be below end, got start {} and end {}", start, end),
            ));
        }
        Ok(DecaySchedule {
            start,
            end,
            decay_constant,
            steps_taken: 0,
        })
    }

    /// Resume the schedule at a previously reached step count.
    pub fn with_steps_taken(mut self, steps_taken: u64) -> Self {
        self.steps_taken = steps_taken;
        self
    }

    /// Current exploration threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold_at(self.steps_taken)
    }

    pub fn threshold_at(&self, steps_taken: u64) -> f64 {
        self.end + (self.start - self.end) * (-(steps_taken as f64) / self.decay_constant).exp()
    }

    /// Count one action-selection decision.
    pub fn advance(&mut self) {
        self.steps_taken += 1;
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }
}
