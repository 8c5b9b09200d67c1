//! Parameter update rules.
//!
//! Every trainable tensor of a model owns a fixed slot index. Optimizers with
//! per-parameter state (Adam, RMSProp) keep that state by slot and create it
//! lazily on the first update.

pub mod gradient_clipper;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD};
use serde::{Deserialize, Serialize};

pub use gradient_clipper::GradientClipper;

pub trait Optimizer {
    /// Apply one update to the parameter stored in `slot`.
    fn update(&mut self, slot: usize, param: ArrayViewMutD<f32>, grad: ArrayViewD<f32>, learning_rate: f32);

    /// Called once after every parameter of a model has been updated.
    fn end_step(&mut self) {}
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
    RMSProp(RMSProp),
}

impl Optimizer for OptimizerWrapper {
    fn update(&mut self, slot: usize, param: ArrayViewMutD<f32>, grad: ArrayViewD<f32>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update(slot, param, grad, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update(slot, param, grad, learning_rate),
            OptimizerWrapper::RMSProp(optimizer) => optimizer.update(slot, param, grad, learning_rate),
        }
    }

    fn end_step(&mut self) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.end_step(),
            OptimizerWrapper::Adam(optimizer) => optimizer.end_step(),
            OptimizerWrapper::RMSProp(optimizer) => optimizer.end_step(),
        }
    }
}

/// Zero-initialised state tensor for `slot`, shaped like `grad`.
fn slot_state<'a>(states: &'a mut Vec<ArrayD<f32>>, slot: usize, grad: &ArrayViewD<f32>) -> &'a mut ArrayD<f32> {
    if states.len() <= slot {
        states.resize_with(slot + 1, || ArrayD::zeros(vec![0]));
    }
    if states[slot].shape() != grad.shape() {
        states[slot] = ArrayD::zeros(grad.raw_dim());
    }
    &mut states[slot]
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _slot: usize, mut param: ArrayViewMutD<f32>, grad: ArrayViewD<f32>, learning_rate: f32) {
        param.scaled_add(-learning_rate, &grad);
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m: Vec<ArrayD<f32>>,
    v: Vec<ArrayD<f32>>,
    /// Number of completed steps
    pub t: i32,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn update(&mut self, slot: usize, mut param: ArrayViewMutD<f32>, grad: ArrayViewD<f32>, learning_rate: f32) {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let step = self.t + 1;

        let m = slot_state(&mut self.m, slot, &grad);
        m.zip_mut_with(&grad, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        let m_hat = m.mapv(|x| x / (1.0 - beta1.powi(step)));

        let v = slot_state(&mut self.v, slot, &grad);
        v.zip_mut_with(&grad, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
        let v_hat = v.mapv(|x| x / (1.0 - beta2.powi(step)));

        param.zip_mut_with(&(&m_hat / &v_hat.mapv(|x| x.sqrt() + epsilon)), |p, &u| {
            *p -= learning_rate * u
        });
    }

    fn end_step(&mut self) {
        self.t += 1;
    }
}

/// RMSProp optimizer
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RMSProp {
    /// Smoothing constant of the squared-gradient average
    pub alpha: f32,
    pub epsilon: f32,
    v: Vec<ArrayD<f32>>,
}

impl RMSProp {
    pub fn new(alpha: f32, epsilon: f32) -> Self {
        RMSProp {
            alpha,
            epsilon,
            v: Vec::new(),
        }
    }
}

impl Default for RMSProp {
    fn default() -> Self {
        Self::new(0.99, 1e-8)
    }
}

impl Optimizer for RMSProp {
    fn update(&mut self, slot: usize, mut param: ArrayViewMutD<f32>, grad: ArrayViewD<f32>, learning_rate: f32) {
        let (alpha, epsilon) = (self.alpha, self.epsilon);

        let v = slot_state(&mut self.v, slot, &grad);
        v.zip_mut_with(&grad, |v, &g| *v = alpha * *v + (1.0 - alpha) * g * g);

        ndarray::Zip::from(&mut param)
            .and(&grad)
            .and(&*v)
            .for_each(|p, &g, &v| *p -= learning_rate * g / (v.sqrt() + epsilon));
    }
}
