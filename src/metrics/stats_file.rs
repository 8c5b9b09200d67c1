use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::EpisodeSummary;

#[derive(Debug, Serialize, Deserialize)]
struct StatsRecord {
    reward: f32,
    duration: usize,
}

/// CSV file holding the per-episode reward and duration history.
///
/// Every [`persist`](Self::persist) rewrites the whole file, one row per
/// episode in order.
#[derive(Clone, Debug)]
pub struct StatsFile {
    path: PathBuf,
}

impl StatsFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        StatsFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persist(&self, history: &[EpisodeSummary]) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(File::create(&self.path)?);
        for summary in history {
            wtr.serialize(StatsRecord {
                reward: summary.reward,
                duration: summary.duration,
            })?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Read back `(rewards, durations)`.
    pub fn load(&self) -> Result<(Vec<f32>, Vec<usize>)> {
        let mut rdr = csv::Reader::from_path(&self.path)?;
        let mut rewards = Vec::new();
        let mut durations = Vec::new();
        for record in rdr.deserialize() {
            let record: StatsRecord = record?;
            rewards.push(record.reward);
            durations.push(record.duration);
        }
        Ok((rewards, durations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_persist_overwrites_with_full_history() {
        let dir = tempdir().unwrap();
        let stats = StatsFile::new(dir.path().join("stats.csv"));
        let mut history = vec![EpisodeSummary {
            episode: 0,
            reward: 12.0,
            duration: 12,
        }];
        stats.persist(&history).unwrap();

        history.push(EpisodeSummary {
            episode: 1,
            reward: 9.5,
            duration: 10,
        });
        stats.persist(&history).unwrap();

        let (rewards, durations) = stats.load().unwrap();
        assert_eq!(rewards, vec![12.0, 9.5]);
        assert_eq!(durations, vec![12, 10]);
    }

    #[test]
    fn test_empty_history() {
        let dir = tempdir().unwrap();
        let stats = StatsFile::new(dir.path().join("empty.csv"));
        stats.persist(&[]).unwrap();
        assert_eq!(stats.load().unwrap(), (vec![], vec![]));
    }
}
