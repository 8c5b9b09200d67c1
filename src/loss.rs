use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};

/// Huber loss (smooth L1), averaged over the batch.
///
/// Quadratic for `|error| <= delta`, linear beyond. Both branches agree at
/// `|error| == delta`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HuberLoss {
    pub delta: f32,
}

impl Default for HuberLoss {
    fn default() -> Self {
        HuberLoss { delta: 1.0 }
    }
}

impl HuberLoss {
    pub fn new(delta: f32) -> Self {
        HuberLoss { delta }
    }

    /// Loss of a single error value.
    pub fn element(&self, error: f32) -> f32 {
        let abs_error = error.abs();
        if abs_error <= self.delta {
            0.5 * error * error
        } else {
            self.delta * abs_error - 0.5 * self.delta * self.delta
        }
    }

    /// Mean loss over `predictions - targets`.
    pub fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<f32> {
        check_lengths(&predictions, &targets)?;
        let diff = &predictions - &targets;
        Ok(diff.mapv(|x| self.element(x)).sum() / predictions.len() as f32)
    }

    /// Gradient of [`compute`](Self::compute) with respect to the predictions.
    pub fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Result<Array1<f32>> {
        check_lengths(&predictions, &targets)?;
        let diff = &predictions - &targets;
        let batch_size = predictions.len() as f32;
        Ok(diff.mapv(|x| x.max(-self.delta).min(self.delta) / batch_size))
    }
}

fn check_lengths(predictions: &ArrayView1<f32>, targets: &ArrayView1<f32>) -> Result<()> {
    if predictions.is_empty() || predictions.len() != targets.len() {
        return Err(DqnError::dimension_mismatch(
            format!("{} non-empty targets", predictions.len()),
            format!("{} targets", targets.len()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_huber_continuous_at_delta() {
        let loss = HuberLoss::default();
        let quadratic = 0.5 * 1.0f32 * 1.0;
        let linear = 1.0 * 1.0f32 - 0.5 * 1.0 * 1.0;
        assert_eq!(quadratic, 0.5);
        assert_eq!(linear, 0.5);
        assert_eq!(loss.element(1.0), 0.5);
        assert_eq!(loss.element(-1.0), 0.5);
        assert_eq!(loss.compute(array![1.0].view(), array![0.0].view()).unwrap(), 0.5);
    }

    #[test]
    fn test_huber_mean_and_gradient() {
        let loss = HuberLoss::default();
        let predictions = array![0.5, 3.0, -2.0, 1.0];
        let targets = array![0.0, 0.0, 0.0, 1.0];

        // 0.125 + 2.5 + 1.5 + 0.0
        let value = loss.compute(predictions.view(), targets.view()).unwrap();
        assert!((value - 4.125 / 4.0).abs() < 1e-6);

        let grad = loss.gradient(predictions.view(), targets.view()).unwrap();
        assert_eq!(grad, array![0.125, 0.25, -0.25, 0.0]);
    }

    #[test]
    fn test_huber_length_mismatch() {
        let loss = HuberLoss::default();
        assert!(loss.compute(array![1.0, 2.0].view(), array![1.0].view()).is_err());
    }
}
