use ndarray::{Array, Dimension, ShapeBuilder};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::activations::Activation;

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    /// Xavier/Glorot normal initialization
    XavierNormal,

    /// He/Kaiming normal initialization (for ReLU)
    HeNormal,
}

impl WeightInit {
    /// Get the recommended initialization for an activation function
    pub fn for_activation(activation: &Activation) -> Self {
        match activation {
            Activation::Relu => WeightInit::HeNormal,
            Activation::Linear => WeightInit::XavierNormal,
        }
    }

    fn std(&self, fan_in: usize, fan_out: usize) -> f32 {
        match self {
            WeightInit::XavierNormal => (2.0 / (fan_in + fan_out).max(1) as f32).sqrt(),
            WeightInit::HeNormal => (2.0 / fan_in.max(1) as f32).sqrt(),
        }
    }

    /// Draw a weight tensor of the given shape.
    ///
    /// `fan_in` and `fan_out` are the number of connections feeding into and
    /// out of one unit; for a convolution they include the kernel area.
    pub fn initialize<Sh, D, R>(&self, shape: Sh, fan_in: usize, fan_out: usize, rng: &mut R) -> Array<f32, D>
    where
        Sh: ShapeBuilder<Dim = D>,
        D: Dimension,
        R: Rng + ?Sized,
    {
        let std = self.std(fan_in, fan_out);
        Array::<f32, D>::random_using(shape, StandardNormal, rng) * std
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Ix2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_he_normal_scale() {
        let mut rng = StdRng::seed_from_u64(7);
        let weights = WeightInit::HeNormal.initialize::<_, Ix2, _>((400, 50), 400, 50, &mut rng);
        let std = (weights.mapv(|w| w * w).mean().unwrap()).sqrt();
        let expected = (2.0f32 / 400.0).sqrt();
        assert!((std - expected).abs() < expected * 0.1);
    }
}
