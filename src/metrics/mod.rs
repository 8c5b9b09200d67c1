pub mod stats_file;
pub mod tracker;

use serde::{Deserialize, Serialize};

pub use stats_file::StatsFile;
pub use tracker::{MetricsTracker, TrainingMetrics};

/// Outcome of one finished episode.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// 0-based episode index
    pub episode: usize,
    pub reward: f32,
    /// Number of environment steps
    pub duration: usize,
}
