//! Experience replay.
//!
//! [`ReplayBuffer`] is a fixed-capacity ring of [`Transition`]s. Once full, every
//! push overwrites the slot at the write cursor, which is always the oldest entry
//! by write order. Sampling is uniform and without replacement within a call.

use ndarray::Array3;
use rand::seq::index;
use rand::Rng;

use crate::error::{DqnError, Result};

/// Channel-first state tensor `(channels, height, width)`.
pub type State = Array3<f32>;

/// One recorded environment interaction.
///
/// `next_state` is `None` when the episode ended on this step; a terminal
/// successor has value zero in every downstream computation.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: State,
    pub action: usize,
    pub next_state: Option<State>,
    pub reward: f32,
}

impl Transition {
    pub fn new(state: State, action: usize, next_state: Option<State>, reward: f32) -> Self {
        Transition {
            state,
            action,
            next_state,
            reward,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_state.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    storage: Vec<Transition>,
    capacity: usize,
    write_cursor: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DqnError::invalid_parameter(
                "capacity",
                "replay buffer capacity must be at least 1",
            ));
        }
        Ok(ReplayBuffer {
            storage: Vec::with_capacity(capacity),
            capacity,
            write_cursor: 0,
        })
    }

    /// Insert a transition, overwriting the oldest one once the buffer is full.
    pub fn push(&mut self, transition: Transition) {
        if self.storage.len() < self.capacity {
            self.storage.push(transition);
        } else {
            self.storage[self.write_cursor] = transition;
        }
        self.write_cursor = (self.write_cursor + 1) % self.capacity;
    }

    /// Sample `batch_size` distinct transitions using the thread-local RNG.
    pub fn sample(&self, batch_size: usize) -> Result<Vec<&Transition>> {
        self.sample_with(batch_size, &mut rand::thread_rng())
    }

    /// Sample `batch_size` distinct transitions uniformly without replacement.
    ///
    /// Callers are expected to check [`len`](Self::len) first; asking for more
    /// than is stored fails with [`DqnError::InsufficientData`].
    pub fn sample_with<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Vec<&Transition>> {
        if batch_size > self.storage.len() {
            return Err(DqnError::InsufficientData {
                requested: batch_size,
                available: self.storage.len(),
            });
        }
        Ok(index::sample(rng, self.storage.len(), batch_size)
            .into_iter()
            .map(|i| &self.storage[i])
            .collect())
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot that the next push will write to.
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Iterate over stored transitions in storage-position order.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.storage.iter()
    }
}
