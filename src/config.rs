//! Training configuration.
//!
//! Everything a run needs is described by [`TrainingConfig`], which is read
//! from and written to YAML. Missing fields fall back to their defaults, so a
//! config file only has to name what it changes.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};
use crate::optimizer::{Adam, GradientClipper, OptimizerWrapper, RMSProp, SGD};

/// One convolution of the value network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvSpec {
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
}

impl ConvSpec {
    pub fn new(out_channels: usize, kernel_size: usize, stride: usize) -> Self {
        ConvSpec {
            out_channels,
            kernel_size,
            stride,
            padding: 0,
        }
    }
}

/// Shape of the convolutional Q-network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub conv_layers: Vec<ConvSpec>,

    /// Widths of the ReLU dense layers between the flattened features and the
    /// linear output head.
    pub hidden_units: Vec<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            conv_layers: vec![ConvSpec::new(16, 5, 2), ConvSpec::new(32, 5, 2), ConvSpec::new(32, 5, 2)],
            hidden_units: Vec::new(),
        }
    }
}

/// Resolution frames are resized to before they reach the network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub height: usize,
    pub width: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig { height: 80, width: 80 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartPoleConfig {
    pub max_episode_steps: usize,
    pub render_height: usize,
    pub render_width: usize,
}

impl Default for CartPoleConfig {
    fn default() -> Self {
        CartPoleConfig {
            max_episode_steps: 500,
            render_height: 400,
            render_width: 600,
        }
    }
}

/// Update rule of the live network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd,
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
    RmsProp { alpha: f32, epsilon: f32 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::RmsProp {
            alpha: 0.99,
            epsilon: 1e-8,
        }
    }
}

impl OptimizerConfig {
    /// Fresh optimizer with empty per-parameter state.
    pub fn build(&self) -> OptimizerWrapper {
        match *self {
            OptimizerConfig::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerConfig::Adam { beta1, beta2, epsilon } => OptimizerWrapper::Adam(Adam::new(beta1, beta2, epsilon)),
            OptimizerConfig::RmsProp { alpha, epsilon } => OptimizerWrapper::RMSProp(RMSProp::new(alpha, epsilon)),
        }
    }
}

/// Configuration of a [`TrainingSession`](crate::trainer::TrainingSession).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub num_episodes: usize,
    pub batch_size: usize,
    pub gamma: f32,
    pub eps_start: f64,
    pub eps_end: f64,
    pub eps_decay: f64,

    /// Episodes between hard syncs of the stable network.
    pub target_update: usize,

    pub replay_capacity: usize,
    pub learning_rate: f32,
    pub optimizer: OptimizerConfig,
    pub gradient_clip: GradientClipper,
    pub huber_delta: f32,
    pub frame: FrameConfig,
    pub network: NetworkConfig,
    pub env: CartPoleConfig,

    /// Where the per-episode reward and duration history is written.
    pub stats_path: PathBuf,

    pub checkpoint_path: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            num_episodes: 50,
            batch_size: 128,
            gamma: 0.999,
            eps_start: 0.9,
            eps_end: 0.05,
            eps_decay: 200.0,
            target_update: 10,
            replay_capacity: 10_000,
            learning_rate: 0.01,
            optimizer: OptimizerConfig::default(),
            gradient_clip: GradientClipper::default(),
            huber_delta: 1.0,
            frame: FrameConfig::default(),
            network: NetworkConfig::default(),
            env: CartPoleConfig::default(),
            stats_path: PathBuf::from("stats.csv"),
            checkpoint_path: None,
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// Constructs [`TrainingConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let config: TrainingConfig = serde_yaml::from_reader(rdr)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves [`TrainingConfig`] as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }

    pub fn num_episodes(mut self, v: usize) -> Self {
        self.num_episodes = v;
        self
    }

    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    pub fn gamma(mut self, v: f32) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the exploration schedule `(start, end, decay_constant)`.
    pub fn epsilon(mut self, start: f64, end: f64, decay: f64) -> Self {
        self.eps_start = start;
        self.eps_end = end;
        self.eps_decay = decay;
        self
    }

    pub fn target_update(mut self, v: usize) -> Self {
        self.target_update = v;
        self
    }

    pub fn replay_capacity(mut self, v: usize) -> Self {
        self.replay_capacity = v;
        self
    }

    pub fn learning_rate(mut self, v: f32) -> Self {
        self.learning_rate = v;
        self
    }

    pub fn optimizer(mut self, v: OptimizerConfig) -> Self {
        self.optimizer = v;
        self
    }

    pub fn gradient_clip(mut self, v: GradientClipper) -> Self {
        self.gradient_clip = v;
        self
    }

    pub fn frame(mut self, height: usize, width: usize) -> Self {
        self.frame = FrameConfig { height, width };
        self
    }

    pub fn network(mut self, v: NetworkConfig) -> Self {
        self.network = v;
        self
    }

    pub fn env(mut self, v: CartPoleConfig) -> Self {
        self.env = v;
        self
    }

    pub fn stats_path<P: Into<PathBuf>>(mut self, v: P) -> Self {
        self.stats_path = v.into();
        self
    }

    pub fn checkpoint_path<P: Into<PathBuf>>(mut self, v: P) -> Self {
        self.checkpoint_path = Some(v.into());
        self
    }

    pub fn seed(mut self, v: u64) -> Self {
        self.seed = Some(v);
        self
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: usize) -> Result<()> {
            if value == 0 {
                return Err(DqnError::invalid_parameter(name.to_string(), "must be at least 1".to_string()));
            }
            Ok(())
        }

        positive("batch_size", self.batch_size)?;
        positive("target_update", self.target_update)?;
        positive("replay_capacity", self.replay_capacity)?;
        positive("frame.height", self.frame.height)?;
        positive("frame.width", self.frame.width)?;
        positive("env.max_episode_steps", self.env.max_episode_steps)?;

        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DqnError::invalid_parameter(
                "gamma".to_string(),
                format!("must lie in [0, 1], got {}", self.gamma),
            ));
        }
        if !(self.eps_decay > 0.0) {
            return Err(DqnError::invalid_parameter(
                "eps_decay".to_string(),
                format!("must be positive, got {}", self.eps_decay),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(DqnError::invalid_parameter(
                "learning_rate".to_string(),
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        if !(self.huber_delta > 0.0) {
            return Err(DqnError::invalid_parameter(
                "huber_delta".to_string(),
                format!("must be positive, got {}", self.huber_delta),
            ));
        }
        if self.batch_size > self.replay_capacity {
            return Err(DqnError::invalid_parameter(
                "batch_size".to_string(),
                format!("{} exceeds replay capacity {}", self.batch_size, self.replay_capacity),
            ));
        }
        Ok(())
    }
}
