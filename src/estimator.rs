//! The value-estimator seam.
//!
//! Everything the training loop needs from a Q-function approximator goes
//! through [`ValueEstimator`]. [`crate::network::ConvQNetwork`] is the binding
//! shipped with the crate; tests substitute small hand-written estimators.

use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayView3, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};
use crate::optimizer::GradientClipper;

/// Ordered snapshot of every trainable tensor of an estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub tensors: Vec<ArrayD<f32>>,
}

impl Parameters {
    pub fn new(tensors: Vec<ArrayD<f32>>) -> Self {
        Parameters { tensors }
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Check that `other` has the same number of tensors with the same shapes.
    pub fn check_compatible(&self, other: &Parameters) -> Result<()> {
        if self.tensors.len() != other.tensors.len() {
            return Err(DqnError::dimension_mismatch(
                format!("{} parameter tensors", self.tensors.len()),
                format!("{} parameter tensors", other.tensors.len()),
            ));
        }
        for (slot, (ours, theirs)) in self.tensors.iter().zip(&other.tensors).enumerate() {
            if ours.shape() != theirs.shape() {
                return Err(DqnError::dimension_mismatch(
                    format!("slot {} with shape {:?}", slot, ours.shape()),
                    format!("shape {:?}", theirs.shape()),
                ));
            }
        }
        Ok(())
    }
}

/// A differentiable map from a state tensor to one value per action.
pub trait ValueEstimator {
    fn num_actions(&self) -> usize;

    /// Values of a batch of states `[batch, channels, height, width]`.
    ///
    /// Pure inference: nothing is recorded for a later gradient step.
    fn evaluate_batch(&self, states: ArrayView4<f32>) -> Result<Array2<f32>>;

    /// Values of a single state `[channels, height, width]`.
    fn evaluate(&self, state: ArrayView3<f32>) -> Result<Array1<f32>> {
        let values = self.evaluate_batch(state.insert_axis(Axis(0)))?;
        Ok(values.index_axis_move(Axis(0), 0))
    }

    fn parameters(&self) -> Parameters;

    /// Overwrite every parameter; shapes must match [`parameters`](Self::parameters).
    fn load_parameters(&mut self, parameters: &Parameters) -> Result<()>;

    /// One gradient-descent update.
    ///
    /// `output_gradient` is the derivative of the loss with respect to the
    /// outputs for `states`; it is back-propagated, clipped with `clipper`
    /// and applied by the estimator's optimizer.
    fn gradient_step(
        &mut self,
        states: ArrayView4<f32>,
        output_gradient: ArrayView2<f32>,
        clipper: &GradientClipper,
    ) -> Result<()>;
}
