//! Convolutional Q-network.
//!
//! A stack of ReLU convolutions reads the `(channels, height, width)` state,
//! the feature maps are flattened, and dense layers (ReLU hidden, linear head)
//! produce one value per action. The optimizer lives inside the network, so a
//! gradient step needs nothing but the states and the loss gradient.

use std::fs;
use std::path::Path;

use bincode::{deserialize, serialize};
use log::debug;
use ndarray::{Array2, Array4, ArrayD, ArrayView2, ArrayView4, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::config::NetworkConfig;
use crate::error::{DqnError, Result};
use crate::estimator::{Parameters, ValueEstimator};
use crate::layers::{Conv2DLayer, DenseLayer};
use crate::optimizer::{GradientClipper, Optimizer, OptimizerWrapper};

/// Values recorded by a training forward pass.
struct Tape {
    conv_inputs: Vec<Array4<f32>>,
    conv_pre: Vec<Array4<f32>>,
    dense_inputs: Vec<Array2<f32>>,
    dense_pre: Vec<Array2<f32>>,
    feature_dim: (usize, usize, usize, usize),
}

fn params_mut<'a>(conv_layers: &'a mut [Conv2DLayer], dense_layers: &'a mut [DenseLayer]) -> Vec<ArrayViewMutD<'a, f32>> {
    let mut params = Vec::with_capacity(2 * (conv_layers.len() + dense_layers.len()));
    for layer in conv_layers.iter_mut() {
        params.push(layer.kernels.view_mut().into_dyn());
        params.push(layer.biases.view_mut().into_dyn());
    }
    for layer in dense_layers.iter_mut() {
        params.push(layer.weights.view_mut().into_dyn());
        params.push(layer.biases.view_mut().into_dyn());
    }
    params
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConvQNetwork {
    conv_layers: Vec<Conv2DLayer>,
    dense_layers: Vec<DenseLayer>,
    input_shape: (usize, usize, usize),
    num_actions: usize,
    pub optimizer: OptimizerWrapper,
    pub learning_rate: f32,
}

impl ConvQNetwork {
    /// Build a network for states of `input_shape` `(channels, height, width)`.
    pub fn new<R: Rng + ?Sized>(
        config: &NetworkConfig,
        input_shape: (usize, usize, usize),
        num_actions: usize,
        optimizer: OptimizerWrapper,
        learning_rate: f32,
        rng: &mut R,
    ) -> Result<Self> {
        if num_actions == 0 {
            return Err(DqnError::invalid_parameter("num_actions", "must be at least 1"));
        }
        let (mut channels, mut height, mut width) = input_shape;

        let mut conv_layers = Vec::with_capacity(config.conv_layers.len());
        for (i, spec) in config.conv_layers.iter().enumerate() {
            if spec.stride == 0 || spec.kernel_size == 0 || spec.out_channels == 0 {
                return Err(DqnError::invalid_parameter(
                    format!("conv_layers[{}]", i),
                    "kernel size, stride and channel count must be positive".to_string(),
                ));
            }
            let layer = Conv2DLayer::new(
                channels,
                spec.out_channels,
                (spec.kernel_size, spec.kernel_size),
                (spec.stride, spec.stride),
                (spec.padding, spec.padding),
                Activation::Relu,
                rng,
            );
            let (h, w) = layer.output_dims(height, width).ok_or_else(|| {
                DqnError::invalid_parameter(
                    format!("conv_layers[{}]", i),
                    format!("kernel {} does not fit a {}x{} feature map", spec.kernel_size, height, width),
                )
            })?;
            channels = spec.out_channels;
            height = h;
            width = w;
            conv_layers.push(layer);
        }

        let mut sizes = vec![channels * height * width];
        sizes.extend(config.hidden_units.iter().copied());
        sizes.push(num_actions);
        let dense_layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, window)| {
                let activation = if i == sizes.len() - 2 {
                    Activation::Linear
                } else {
                    Activation::Relu
                };
                DenseLayer::new(window[0], window[1], activation, rng)
            })
            .collect();

        Ok(ConvQNetwork {
            conv_layers,
            dense_layers,
            input_shape,
            num_actions,
            optimizer,
            learning_rate,
        })
    }

    pub fn input_shape(&self) -> (usize, usize, usize) {
        self.input_shape
    }

    fn check_states(&self, states: &ArrayView4<f32>) -> Result<()> {
        let (_, c, h, w) = states.dim();
        if (c, h, w) != self.input_shape {
            return Err(DqnError::dimension_mismatch(
                format!("states of shape {:?}", self.input_shape),
                format!("{:?}", (c, h, w)),
            ));
        }
        Ok(())
    }

    fn flatten(features: Array4<f32>) -> Result<Array2<f32>> {
        let (n, c, h, w) = features.dim();
        Ok(features.as_standard_layout().into_owned().into_shape((n, c * h * w))?)
    }

    fn forward_tape(&self, states: ArrayView4<f32>) -> Result<(Array2<f32>, Tape)> {
        self.check_states(&states)?;
        let mut tape = Tape {
            conv_inputs: Vec::with_capacity(self.conv_layers.len()),
            conv_pre: Vec::with_capacity(self.conv_layers.len()),
            dense_inputs: Vec::with_capacity(self.dense_layers.len()),
            dense_pre: Vec::with_capacity(self.dense_layers.len()),
            feature_dim: (0, 0, 0, 0),
        };

        let mut x = states.to_owned();
        for layer in &self.conv_layers {
            let pre = layer.pre_activation(x.view())?;
            let mut out = pre.clone();
            layer.activation.apply(&mut out);
            tape.conv_inputs.push(x);
            tape.conv_pre.push(pre);
            x = out;
        }
        tape.feature_dim = x.dim();

        let mut h = Self::flatten(x)?;
        for layer in &self.dense_layers {
            let pre = layer.pre_activation(h.view())?;
            let mut out = pre.clone();
            layer.activation.apply(&mut out);
            tape.dense_inputs.push(h);
            tape.dense_pre.push(pre);
            h = out;
        }

        Ok((h, tape))
    }

    /// Gradients of every parameter, in slot order, for the given loss
    /// gradient with respect to the outputs.
    pub fn gradients(&self, states: ArrayView4<f32>, output_gradient: ArrayView2<f32>) -> Result<Vec<ArrayD<f32>>> {
        let (outputs, tape) = self.forward_tape(states)?;
        if outputs.dim() != output_gradient.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("output gradient of shape {:?}", outputs.dim()),
                format!("{:?}", output_gradient.dim()),
            ));
        }

        let mut dense_grads = Vec::with_capacity(self.dense_layers.len());
        let mut error = output_gradient.to_owned();
        for (i, layer) in self.dense_layers.iter().enumerate().rev() {
            let grads = layer.backward_batch(tape.dense_inputs[i].view(), tape.dense_pre[i].view(), error.view());
            dense_grads.push((grads.weights, grads.biases));
            error = grads.input;
        }
        dense_grads.reverse();

        let mut conv_grads = Vec::with_capacity(self.conv_layers.len());
        let mut conv_error = error.into_shape(tape.feature_dim)?;
        for (i, layer) in self.conv_layers.iter().enumerate().rev() {
            let grads = layer.backward_batch(tape.conv_inputs[i].view(), tape.conv_pre[i].view(), conv_error.view(), i > 0);
            conv_grads.push((grads.kernels, grads.biases));
            if let Some(input) = grads.input {
                conv_error = input;
            }
        }
        conv_grads.reverse();

        let mut gradients = Vec::with_capacity(2 * (self.conv_layers.len() + self.dense_layers.len()));
        for (kernels, biases) in conv_grads {
            gradients.push(kernels.into_dyn());
            gradients.push(biases.into_dyn());
        }
        for (weights, biases) in dense_grads {
            gradients.push(weights.into_dyn());
            gradients.push(biases.into_dyn());
        }
        Ok(gradients)
    }

    /// Save the network, including its optimizer state, to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serialize(self)?)?;
        Ok(())
    }

    /// Load a network saved with [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(deserialize(&data)?)
    }
}

impl ValueEstimator for ConvQNetwork {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn evaluate_batch(&self, states: ArrayView4<f32>) -> Result<Array2<f32>> {
        self.check_states(&states)?;
        let mut x = states.to_owned();
        for layer in &self.conv_layers {
            x = layer.forward_batch(x.view())?;
        }
        let mut h = Self::flatten(x)?;
        for layer in &self.dense_layers {
            h = layer.forward_batch(h.view())?;
        }
        Ok(h)
    }

    fn parameters(&self) -> Parameters {
        let mut tensors = Vec::with_capacity(2 * (self.conv_layers.len() + self.dense_layers.len()));
        for layer in &self.conv_layers {
            tensors.push(layer.kernels.clone().into_dyn());
            tensors.push(layer.biases.clone().into_dyn());
        }
        for layer in &self.dense_layers {
            tensors.push(layer.weights.clone().into_dyn());
            tensors.push(layer.biases.clone().into_dyn());
        }
        Parameters::new(tensors)
    }

    fn load_parameters(&mut self, parameters: &Parameters) -> Result<()> {
        self.parameters().check_compatible(parameters)?;
        for (mut param, source) in params_mut(&mut self.conv_layers, &mut self.dense_layers)
            .into_iter()
            .zip(&parameters.tensors)
        {
            param.assign(source);
        }
        Ok(())
    }

    fn gradient_step(
        &mut self,
        states: ArrayView4<f32>,
        output_gradient: ArrayView2<f32>,
        clipper: &GradientClipper,
    ) -> Result<()> {
        let mut gradients = self.gradients(states, output_gradient)?;
        clipper.clip_all(&mut gradients);
        debug!(
            "gradient step on {} states, gradient norm {:.4}",
            states.len_of(Axis(0)),
            GradientClipper::compute_global_norm(&gradients)
        );

        let ConvQNetwork {
            conv_layers,
            dense_layers,
            optimizer,
            learning_rate,
            ..
        } = self;
        for (slot, (param, grad)) in params_mut(conv_layers, dense_layers).into_iter().zip(&gradients).enumerate() {
            optimizer.update(slot, param, grad.view(), *learning_rate);
        }
        optimizer.end_step();
        Ok(())
    }
}
