//! Convolutional layer for processing screen frames
//!
//! Inputs are batches of channel-first images `[batch, channels, height, width]`.
//! The forward pass is split into [`Conv2DLayer::pre_activation`] and the
//! activation so that the network can keep both for its backward pass.

use ndarray::parallel::prelude::*;
use ndarray::{s, Array1, Array4, ArrayView4, Axis, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::layers::initialization::WeightInit;

/// Gradients produced by [`Conv2DLayer::backward_batch`].
pub struct ConvGradients {
    /// Gradient with respect to the layer input, if requested
    pub input: Option<Array4<f32>>,
    pub kernels: Array4<f32>,
    pub biases: Array1<f32>,
}

/// 2D Convolutional Layer
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conv2DLayer {
    /// Convolution kernels/filters [out_channels, in_channels, kernel_height, kernel_width]
    pub kernels: Array4<f32>,

    /// Bias terms for each output channel
    pub biases: Array1<f32>,

    pub activation: Activation,

    pub stride: (usize, usize),

    pub padding: (usize, usize),

    pub in_channels: usize,

    pub out_channels: usize,

    pub kernel_size: (usize, usize),
}

impl Conv2DLayer {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        activation: Activation,
        rng: &mut R,
    ) -> Self {
        let fan_in = in_channels * kernel_size.0 * kernel_size.1;
        let fan_out = out_channels * kernel_size.0 * kernel_size.1;
        let kernels = WeightInit::for_activation(&activation).initialize(
            (out_channels, in_channels, kernel_size.0, kernel_size.1),
            fan_in,
            fan_out,
            rng,
        );

        Conv2DLayer {
            kernels,
            biases: Array1::zeros(out_channels),
            activation,
            stride,
            padding,
            in_channels,
            out_channels,
            kernel_size,
        }
    }

    /// Spatial output size for an input of `height` x `width`, or `None` when
    /// the kernel does not fit.
    pub fn output_dims(&self, height: usize, width: usize) -> Option<(usize, usize)> {
        let padded_h = height + 2 * self.padding.0;
        let padded_w = width + 2 * self.padding.1;
        if padded_h < self.kernel_size.0 || padded_w < self.kernel_size.1 {
            return None;
        }
        Some((
            (padded_h - self.kernel_size.0) / self.stride.0 + 1,
            (padded_w - self.kernel_size.1) / self.stride.1 + 1,
        ))
    }

    fn check_input(&self, input: &ArrayView4<f32>) -> Result<(usize, usize)> {
        let (_, channels, height, width) = input.dim();
        if channels != self.in_channels {
            return Err(DqnError::dimension_mismatch(
                format!("{} input channels", self.in_channels),
                format!("{} input channels", channels),
            ));
        }
        self.output_dims(height, width).ok_or_else(|| {
            DqnError::dimension_mismatch(
                format!("input of at least {}x{}", self.kernel_size.0, self.kernel_size.1),
                format!("{}x{} (padding {:?})", height, width, self.padding),
            )
        })
    }

    /// Pad input with zeros
    fn pad_input(&self, input: ArrayView4<f32>) -> Array4<f32> {
        if self.padding == (0, 0) {
            return input.to_owned();
        }
        let (batch_size, channels, height, width) = input.dim();
        let mut padded = Array4::zeros((
            batch_size,
            channels,
            height + 2 * self.padding.0,
            width + 2 * self.padding.1,
        ));
        padded
            .slice_mut(s![
                ..,
                ..,
                self.padding.0..self.padding.0 + height,
                self.padding.1..self.padding.1 + width
            ])
            .assign(&input);
        padded
    }

    /// Convolution output before the activation is applied.
    pub fn pre_activation(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (out_height, out_width) = self.check_input(&input)?;
        let padded = self.pad_input(input);
        let mut output = Array4::zeros((input.dim().0, self.out_channels, out_height, out_width));

        // Images in a batch are independent
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(padded.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut out, image)| {
                for oc in 0..self.out_channels {
                    let kernel = self.kernels.index_axis(Axis(0), oc);
                    for oh in 0..out_height {
                        for ow in 0..out_width {
                            let h_start = oh * self.stride.0;
                            let w_start = ow * self.stride.1;
                            let window = image.slice(s![
                                ..,
                                h_start..h_start + self.kernel_size.0,
                                w_start..w_start + self.kernel_size.1
                            ]);
                            let sum = Zip::from(&window)
                                .and(&kernel)
                                .fold(0.0, |acc, &x, &k| acc + x * k);
                            out[[oc, oh, ow]] = sum + self.biases[oc];
                        }
                    }
                }
            });

        Ok(output)
    }

    /// Forward pass for a batch of images [batch, channels, height, width]
    pub fn forward_batch(&self, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut output = self.pre_activation(input)?;
        self.activation.apply(&mut output);
        Ok(output)
    }

    /// Backward pass given the layer input and pre-activation output recorded
    /// during the forward pass.
    pub fn backward_batch(
        &self,
        input: ArrayView4<f32>,
        pre_activation: ArrayView4<f32>,
        output_gradient: ArrayView4<f32>,
        need_input_gradient: bool,
    ) -> ConvGradients {
        let grad = &output_gradient * &self.activation.derivative(pre_activation);
        let padded = self.pad_input(input);

        let kernels = self.compute_kernel_gradients(&padded, &grad);
        let biases = grad.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0));
        let input = if need_input_gradient {
            Some(self.compute_input_gradients(&grad, padded.dim()))
        } else {
            None
        };

        ConvGradients {
            input,
            kernels,
            biases,
        }
    }

    fn compute_kernel_gradients(&self, padded_input: &Array4<f32>, grad_output: &Array4<f32>) -> Array4<f32> {
        let mut kernel_grads = Array4::zeros(self.kernels.dim());
        let (batch_size, _, out_height, out_width) = grad_output.dim();

        // Each output channel owns one kernel
        kernel_grads
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(oc, mut kernel_grad)| {
                for b in 0..batch_size {
                    for oh in 0..out_height {
                        for ow in 0..out_width {
                            let g = grad_output[[b, oc, oh, ow]];
                            if g == 0.0 {
                                continue;
                            }
                            let h_start = oh * self.stride.0;
                            let w_start = ow * self.stride.1;
                            let window = padded_input.slice(s![
                                b,
                                ..,
                                h_start..h_start + self.kernel_size.0,
                                w_start..w_start + self.kernel_size.1
                            ]);
                            kernel_grad.scaled_add(g, &window);
                        }
                    }
                }
            });

        kernel_grads
    }

    /// Transpose convolution of the output gradient back onto the input.
    fn compute_input_gradients(
        &self,
        grad_output: &Array4<f32>,
        padded_dim: (usize, usize, usize, usize),
    ) -> Array4<f32> {
        let (batch_size, _, out_height, out_width) = grad_output.dim();
        let mut grad_input_padded = Array4::zeros(padded_dim);

        for b in 0..batch_size {
            for oc in 0..self.out_channels {
                for oh in 0..out_height {
                    for ow in 0..out_width {
                        let g = grad_output[[b, oc, oh, ow]];
                        if g == 0.0 {
                            continue;
                        }
                        let h_start = oh * self.stride.0;
                        let w_start = ow * self.stride.1;
                        let mut window = grad_input_padded.slice_mut(s![
                            b,
                            ..,
                            h_start..h_start + self.kernel_size.0,
                            w_start..w_start + self.kernel_size.1
                        ]);
                        window.scaled_add(g, &self.kernels.index_axis(Axis(0), oc));
                    }
                }
            }
        }

        let (_, _, padded_h, padded_w) = padded_dim;
        grad_input_padded
            .slice(s![
                ..,
                ..,
                self.padding.0..padded_h - self.padding.0,
                self.padding.1..padded_w - self.padding.1
            ])
            .to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(activation: Activation, padding: (usize, usize)) -> Conv2DLayer {
        let mut rng = StdRng::seed_from_u64(3);
        Conv2DLayer::new(2, 3, (3, 3), (2, 2), padding, activation, &mut rng)
    }

    fn input() -> Array4<f32> {
        Array4::from_shape_fn((2, 2, 7, 6), |(b, c, h, w)| {
            ((b * 31 + c * 17 + h * 5 + w) % 11) as f32 / 11.0 - 0.4
        })
    }

    #[test]
    fn test_conv2d_output_shape() {
        let conv = layer(Activation::Relu, (1, 1));
        let output = conv.forward_batch(input().view()).unwrap();
        assert_eq!(output.dim(), (2, 3, 4, 3));
        assert!(output.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_conv2d_rejects_small_input() {
        let conv = layer(Activation::Relu, (0, 0));
        let tiny = Array4::zeros((1, 2, 2, 2));
        assert!(matches!(
            conv.forward_batch(tiny.view()),
            Err(DqnError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_conv2d_gradients_match_finite_differences() {
        // With a linear activation the summed output is linear in every
        // parameter and input, so central differences are exact up to rounding.
        let conv = layer(Activation::Linear, (1, 1));
        let x = input();
        let pre = conv.pre_activation(x.view()).unwrap();
        let ones = Array4::ones(pre.dim());
        let grads = conv.backward_batch(x.view(), pre.view(), ones.view(), true);

        let total = |c: &Conv2DLayer, x: &Array4<f32>| c.forward_batch(x.view()).unwrap().sum();
        let eps = 0.5;

        for idx in [[0usize, 0, 0, 0], [1, 1, 2, 1], [2, 0, 1, 2]] {
            let mut plus = conv.clone();
            plus.kernels[idx] += eps;
            let mut minus = conv.clone();
            minus.kernels[idx] -= eps;
            let numeric = (total(&plus, &x) - total(&minus, &x)) / (2.0 * eps);
            assert!((numeric - grads.kernels[idx]).abs() < 1e-2, "kernel {:?}", idx);
        }

        for oc in 0..3 {
            let mut plus = conv.clone();
            plus.biases[oc] += eps;
            let numeric = (total(&plus, &x) - total(&conv, &x)) / eps;
            assert!((numeric - grads.biases[oc]).abs() < 1e-2);
        }

        let input_grads = grads.input.unwrap();
        assert_eq!(input_grads.dim(), x.dim());
        for idx in [[0usize, 0, 0, 0], [1, 1, 3, 2], [0, 1, 6, 5]] {
            let mut plus = x.clone();
            plus[idx] += eps;
            let mut minus = x.clone();
            minus[idx] -= eps;
            let numeric = (total(&conv, &plus) - total(&conv, &minus)) / (2.0 * eps);
            assert!((numeric - input_grads[idx]).abs() < 1e-2, "input {:?}", idx);
        }
    }

    #[test]
    fn test_kernel_gradients_every_entry() {
        let conv = layer(Activation::Linear, (1, 1));
        let x = input();
        let pre = conv.pre_activation(x.view()).unwrap();
        let grad_output = Array4::from_shape_fn(pre.dim(), |(b, oc, h, w)| ((b + 2 * oc + h * w) % 5) as f32 - 2.0);
        let grads = conv.backward_batch(x.view(), pre.view(), grad_output.view(), false);
        let padded = conv.pad_input(x.view());

        let (batch, _, out_h, out_w) = grad_output.dim();
        for ((oc, ic, kh, kw), &value) in grads.kernels.indexed_iter() {
            let mut expected = 0.0;
            for b in 0..batch {
                for oh in 0..out_h {
                    for ow in 0..out_w {
                        expected += padded[[b, ic, oh * 2 + kh, ow * 2 + kw]] * grad_output[[b, oc, oh, ow]];
                    }
                }
            }
            assert!((value - expected).abs() < 1e-4, "kernel {:?}", (oc, ic, kh, kw));
        }
        assert!(grads.input.is_none());
    }
}
