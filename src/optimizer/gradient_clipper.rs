use ndarray::{ArrayD, ArrayViewMut, Dimension};
use serde::{Deserialize, Serialize};

/// Gradient clipping methods
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GradientClipper {
    /// Clip every gradient element into `[min, max]`
    ClipByValue { min: f32, max: f32 },

    /// Rescale each parameter's gradient so its L2 norm is at most `max_norm`
    ClipByNorm { max_norm: f32 },

    /// Rescale all gradients together so their joint L2 norm is at most `max_norm`
    ClipByGlobalNorm { max_norm: f32 },

    /// No clipping
    None,
}

impl Default for GradientClipper {
    fn default() -> Self {
        GradientClipper::ClipByValue { min: -1.0, max: 1.0 }
    }
}

impl GradientClipper {
    /// Clip one parameter's gradient in place.
    ///
    /// Global norm clipping needs every gradient at once; see [`clip_all`](Self::clip_all).
    pub fn clip<D: Dimension>(&self, mut gradients: ArrayViewMut<f32, D>) {
        match self {
            GradientClipper::ClipByValue { min, max } => {
                gradients.mapv_inplace(|g| g.max(*min).min(*max));
            }

            GradientClipper::ClipByNorm { max_norm } => {
                let norm = gradients.iter().map(|&g| g * g).sum::<f32>().sqrt();
                if norm > *max_norm {
                    let scale = max_norm / norm;
                    gradients.mapv_inplace(|g| g * scale);
                }
            }

            GradientClipper::ClipByGlobalNorm { .. } | GradientClipper::None => {}
        }
    }

    /// Clip the gradients of every parameter of a model.
    pub fn clip_all(&self, gradients: &mut [ArrayD<f32>]) {
        match self {
            GradientClipper::ClipByGlobalNorm { max_norm } => {
                let global_norm = Self::compute_global_norm(gradients);
                if global_norm > *max_norm {
                    let scale = max_norm / global_norm;
                    for grad in gradients.iter_mut() {
                        grad.mapv_inplace(|g| g * scale);
                    }
                }
            }
            _ => {
                for grad in gradients.iter_mut() {
                    self.clip(grad.view_mut());
                }
            }
        }
    }

    /// Compute global norm of all gradients
    pub fn compute_global_norm(gradients: &[ArrayD<f32>]) -> f32 {
        gradients
            .iter()
            .map(|g| g.iter().map(|&x| x * x).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }
}
