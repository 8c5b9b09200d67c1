//! Layers of the convolutional Q-network.
//!
//! Layers are stateless during inference: the forward pass takes `&self` and
//! the backward pass receives the input and pre-activation values that the
//! caller recorded while training.

pub mod conv;
pub mod dense;
pub mod initialization;

pub use conv::{Conv2DLayer, ConvGradients};
pub use dense::{DenseGradients, DenseLayer};
pub use initialization::WeightInit;
