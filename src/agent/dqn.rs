use log::debug;
use ndarray::{stack, Array1, Array2, Array4, ArrayView1, ArrayView3, Axis};
use rand::Rng;

use crate::error::{DqnError, Result};
use crate::estimator::ValueEstimator;
use crate::loss::HuberLoss;
use crate::optimizer::GradientClipper;
use crate::replay_buffer::{ReplayBuffer, Transition};

/// The network trained by gradient descent and the frozen copy that supplies
/// bootstrap values.
///
/// The stable estimator only ever changes through [`sync`](Self::sync), which
/// overwrites all of its parameters with the live ones.
#[derive(Clone, Debug)]
pub struct EstimatorPair<E> {
    pub live: E,
    pub stable: E,
}

impl<E: ValueEstimator> EstimatorPair<E> {
    /// Pair two estimators of the same architecture, starting the stable one
    /// from the live parameters.
    pub fn new(live: E, mut stable: E) -> Result<Self> {
        if live.num_actions() != stable.num_actions() {
            return Err(DqnError::dimension_mismatch(
                format!("stable estimator with {} actions", live.num_actions()),
                format!("{} actions", stable.num_actions()),
            ));
        }
        stable.load_parameters(&live.parameters())?;
        Ok(EstimatorPair { live, stable })
    }

    /// Hard update: stable ← live.
    pub fn sync(&mut self) -> Result<()> {
        self.stable.load_parameters(&self.live.parameters())
    }
}

impl<E: ValueEstimator + Clone> EstimatorPair<E> {
    pub fn from_live(live: E) -> Result<Self> {
        let stable = live.clone();
        Self::new(live, stable)
    }
}

/// A sampled batch split into the tensors the update needs.
#[derive(Clone, Debug)]
pub struct TrainBatch {
    /// `[batch, channels, height, width]`
    pub states: Array4<f32>,
    pub actions: Vec<usize>,
    pub rewards: Array1<f32>,
    pub non_terminal: Vec<bool>,

    /// Successor states of the non-terminal entries only, in batch order.
    /// `None` when every entry is terminal.
    pub next_states: Option<Array4<f32>>,
}

impl TrainBatch {
    pub fn from_transitions(transitions: &[&Transition]) -> Result<Self> {
        if transitions.is_empty() {
            return Err(DqnError::InsufficientData {
                requested: 1,
                available: 0,
            });
        }

        let state_views: Vec<ArrayView3<f32>> = transitions.iter().map(|t| t.state.view()).collect();
        let states = stack(Axis(0), &state_views)?;

        let next_views: Vec<ArrayView3<f32>> = transitions
            .iter()
            .filter_map(|t| t.next_state.as_ref().map(|s| s.view()))
            .collect();
        let next_states = if next_views.is_empty() {
            None
        } else {
            Some(stack(Axis(0), &next_views)?)
        };

        Ok(TrainBatch {
            states,
            actions: transitions.iter().map(|t| t.action).collect(),
            rewards: transitions.iter().map(|t| t.reward).collect(),
            non_terminal: transitions.iter().map(|t| !t.is_terminal()).collect(),
            next_states,
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Successor values `max_a Q_stable(next_state, a)`, zero for terminal entries.
pub fn bootstrap_values<E: ValueEstimator + ?Sized>(stable: &E, batch: &TrainBatch) -> Result<Array1<f32>> {
    let mut values = Array1::zeros(batch.len());
    let next_states = match &batch.next_states {
        Some(next_states) => next_states,
        None => return Ok(values),
    };

    let next_values = stable.evaluate_batch(next_states.view())?;
    let mut rows = next_values.outer_iter();
    for (value, _) in values
        .iter_mut()
        .zip(&batch.non_terminal)
        .filter(|(_, non_terminal)| **non_terminal)
    {
        let row = rows.next().ok_or_else(|| {
            DqnError::dimension_mismatch(
                "one stable output per non-terminal transition".to_string(),
                format!("{} outputs", next_values.nrows()),
            )
        })?;
        *value = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    }
    Ok(values)
}

/// `reward + gamma * bootstrap`, element-wise.
pub fn compute_targets(rewards: ArrayView1<f32>, bootstrap: ArrayView1<f32>, gamma: f32) -> Result<Array1<f32>> {
    if rewards.len() != bootstrap.len() {
        return Err(DqnError::dimension_mismatch(
            format!("{} bootstrap values", rewards.len()),
            format!("{}", bootstrap.len()),
        ));
    }
    Ok(&rewards + &(&bootstrap * gamma))
}

/// One DQN optimisation step on a batch drawn from the replay buffer.
#[derive(Clone, Debug)]
pub struct DqnLearner {
    pub batch_size: usize,
    pub gamma: f32,
    pub loss: HuberLoss,
    pub clipper: GradientClipper,
}

impl DqnLearner {
    pub fn new(batch_size: usize, gamma: f32) -> Self {
        DqnLearner {
            batch_size,
            gamma,
            loss: HuberLoss::default(),
            clipper: GradientClipper::default(),
        }
    }

    pub fn with_loss(mut self, loss: HuberLoss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_clipper(mut self, clipper: GradientClipper) -> Self {
        self.clipper = clipper;
        self
    }

    /// Run one update of `pair.live`.
    ///
    /// Returns `Ok(None)` without touching anything while the buffer holds
    /// fewer than `batch_size` transitions, otherwise the batch loss measured
    /// before the update.
    pub fn optimize<E, R>(&self, pair: &mut EstimatorPair<E>, buffer: &ReplayBuffer, rng: &mut R) -> Result<Option<f32>>
    where
        E: ValueEstimator,
        R: Rng + ?Sized,
    {
        if buffer.len() < self.batch_size {
            return Ok(None);
        }

        let transitions = buffer.sample_with(self.batch_size, rng)?;
        let batch = TrainBatch::from_transitions(&transitions)?;

        let outputs = pair.live.evaluate_batch(batch.states.view())?;
        let num_actions = outputs.ncols();
        if let Some(&action) = batch.actions.iter().find(|&&a| a >= num_actions) {
            return Err(DqnError::InvalidAction { action, num_actions });
        }
        let predicted: Array1<f32> = batch
            .actions
            .iter()
            .enumerate()
            .map(|(i, &a)| outputs[[i, a]])
            .collect();

        let bootstrap = bootstrap_values(&pair.stable, &batch)?;
        let targets = compute_targets(batch.rewards.view(), bootstrap.view(), self.gamma)?;

        let loss = self.loss.compute(predicted.view(), targets.view())?;
        let loss_gradient = self.loss.gradient(predicted.view(), targets.view())?;

        // Only the taken action's output contributes to the loss.
        let mut output_gradient = Array2::zeros(outputs.dim());
        for (i, &a) in batch.actions.iter().enumerate() {
            output_gradient[[i, a]] = loss_gradient[i];
        }
        pair.live
            .gradient_step(batch.states.view(), output_gradient.view(), &self.clipper)?;

        debug!("optimised on {} transitions, loss {:.6}", batch.len(), loss);
        Ok(Some(loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    #[test]
    fn test_compute_targets() {
        let targets = compute_targets(array![1.0, 0.0].view(), array![0.0, 2.0].view(), 0.999).unwrap();
        assert!((targets[0] - 1.0).abs() < 1e-6);
        assert!((targets[1] - 1.998).abs() < 1e-6);
    }

    #[test]
    fn test_batch_keeps_only_present_next_states() {
        let a = Transition::new(Array3::zeros((1, 2, 2)), 0, None, 1.0);
        let b = Transition::new(Array3::zeros((1, 2, 2)), 1, Some(Array3::ones((1, 2, 2))), 0.0);
        let batch = TrainBatch::from_transitions(&[&a, &b, &a]).unwrap();

        assert_eq!(batch.states.dim(), (3, 1, 2, 2));
        assert_eq!(batch.actions, vec![0, 1, 0]);
        assert_eq!(batch.non_terminal, vec![false, true, false]);
        assert_eq!(batch.next_states.map(|s| s.dim()), Some((1, 1, 2, 2)));
    }
}
