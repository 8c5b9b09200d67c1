use pixel_dqn::{
    agent::EstimatorPair,
    config::{CartPoleConfig, ConvSpec, NetworkConfig, OptimizerConfig, TrainingConfig},
    env::{Environment, Step},
    error::{DqnError, Result},
    estimator::ValueEstimator,
    metrics::StatsFile,
    network::ConvQNetwork,
    preprocess::RawFrame,
    trainer::{Checkpoint, TrainingSession},
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

/// Ends every episode after a fixed number of steps, drawing a moving bar.
struct ScriptedEnv {
    episode_length: usize,
    steps: usize,
}

impl ScriptedEnv {
    fn frame(&self) -> RawFrame {
        RawFrame::from_shape_fn((16, 16, 3), |(_, x, _)| if x == self.steps % 16 { 255 } else { 0 })
    }
}

impl Environment for ScriptedEnv {
    fn reset(&mut self) -> Result<RawFrame> {
        self.steps = 0;
        Ok(self.frame())
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        if action >= 2 {
            return Err(DqnError::InvalidAction { action, num_actions: 2 });
        }
        self.steps += 1;
        Ok(Step {
            frame: self.frame(),
            reward: action as f32,
            done: self.steps >= self.episode_length,
        })
    }

    fn action_space_size(&self) -> usize {
        2
    }
}

fn tiny_config(dir: &std::path::Path) -> TrainingConfig {
    TrainingConfig::default()
        .num_episodes(3)
        .batch_size(4)
        .replay_capacity(50)
        .target_update(2)
        .epsilon(0.9, 0.05, 20.0)
        .learning_rate(0.001)
        .optimizer(OptimizerConfig::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        })
        .frame(12, 12)
        .network(NetworkConfig {
            conv_layers: vec![ConvSpec::new(4, 3, 2)],
            hidden_units: vec![8],
        })
        .env(CartPoleConfig {
            max_episode_steps: 15,
            render_height: 40,
            render_width: 60,
        })
        .stats_path(dir.join("stats.csv"))
        .checkpoint_path(dir.join("checkpoint.bin"))
        .seed(42)
}

fn scripted_session(config: &TrainingConfig, episode_length: usize) -> TrainingSession<ScriptedEnv, ConvQNetwork> {
    let mut rng = StdRng::seed_from_u64(0);
    let live = ConvQNetwork::new(
        &config.network,
        (3, config.frame.height, config.frame.width),
        2,
        config.optimizer.build(),
        config.learning_rate,
        &mut rng,
    )
    .unwrap();
    let env = ScriptedEnv {
        episode_length,
        steps: 0,
    };
    TrainingSession::new(config, env, EstimatorPair::from_live(live).unwrap()).unwrap()
}

#[test]
fn test_cartpole_end_to_end() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut session = TrainingSession::from_config(&config).unwrap();

    let history = session.run().unwrap().to_vec();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|s| s.duration >= 1 && s.duration <= 15));
    assert!(history.iter().all(|s| s.reward == s.duration as f32));

    let (rewards, durations) = StatsFile::new(dir.path().join("stats.csv")).load().unwrap();
    assert_eq!(rewards.len(), 3);
    assert_eq!(durations, history.iter().map(|s| s.duration).collect::<Vec<_>>());

    let total_steps: usize = history.iter().map(|s| s.duration).sum();
    assert_eq!(session.schedule().steps_taken(), total_steps as u64);
    assert_eq!(session.buffer().len(), total_steps.min(50));

    let checkpoint = Checkpoint::load(dir.path().join("checkpoint.bin")).unwrap();
    assert_eq!(checkpoint.episodes_completed, 3);
}

#[test]
fn test_stats_written_at_sync_points() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut session = scripted_session(&config, 3);
    let stats = StatsFile::new(dir.path().join("stats.csv"));

    session.run_episode().unwrap();
    assert_eq!(stats.load().unwrap().1, vec![3]);

    // episode 1 is not a sync point
    session.run_episode().unwrap();
    assert_eq!(stats.load().unwrap().1, vec![3]);

    session.run_episode().unwrap();
    assert_eq!(stats.load().unwrap().1, vec![3, 3, 3]);
}

#[test]
fn test_buffer_holds_one_terminal_per_episode() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut session = scripted_session(&config, 4);
    session.run().unwrap();

    assert_eq!(session.buffer().len(), 12);
    assert_eq!(session.buffer().iter().filter(|t| t.is_terminal()).count(), 3);
    assert_eq!(session.metrics().total_steps(), 12);
    assert!(!session.metrics().metrics().losses.is_empty());
}

#[test]
fn test_stable_matches_live_after_final_sync() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path()).num_episodes(1).target_update(1);
    let mut session = scripted_session(&config, 5);
    session.run().unwrap();

    let pair = session.pair();
    assert_eq!(pair.live.parameters(), pair.stable.parameters());
}

#[test]
fn test_resume_from_checkpoint() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut session = scripted_session(&config, 3);
    session.run().unwrap();
    let steps = session.schedule().steps_taken();

    let config = config.num_episodes(4);
    let mut resumed = scripted_session(&config, 3);
    resumed.restore(dir.path().join("checkpoint.bin")).unwrap();
    assert_eq!(resumed.episodes_completed(), 3);
    assert_eq!(resumed.schedule().steps_taken(), steps);

    resumed.run().unwrap();
    assert_eq!(resumed.history().len(), 4);
    assert_eq!(resumed.history()[3].episode, 3);
    let (_, durations) = StatsFile::new(dir.path().join("stats.csv")).load().unwrap();
    assert_eq!(durations.len(), 4);
}

#[test]
fn test_checkpoint_covers_final_episode() {
    let dir = tempdir().unwrap();
    // episode 3 is the last one and not a sync point
    let config = tiny_config(dir.path()).num_episodes(4).target_update(2);
    let mut session = scripted_session(&config, 3);
    session.run().unwrap();

    let checkpoint = Checkpoint::load(dir.path().join("checkpoint.bin")).unwrap();
    assert_eq!(checkpoint.episodes_completed, 4);
    assert_eq!(checkpoint.history.len(), 4);
    assert_eq!(checkpoint.steps_taken, session.schedule().steps_taken());

    let mut resumed = scripted_session(&config, 3);
    resumed.restore(dir.path().join("checkpoint.bin")).unwrap();
    assert_eq!(resumed.episodes_completed(), 4);
    resumed.run().unwrap();
    assert_eq!(resumed.history().len(), 4);
    assert_eq!(resumed.schedule().steps_taken(), session.schedule().steps_taken());

    let (_, durations) = StatsFile::new(dir.path().join("stats.csv")).load().unwrap();
    assert_eq!(durations, vec![3, 3, 3, 3]);
}

#[test]
fn test_config_rejects_action_count_mismatch() {
    let dir = tempdir().unwrap();
    let config = tiny_config(dir.path());
    let mut rng = StdRng::seed_from_u64(0);
    let live = ConvQNetwork::new(
        &config.network,
        (3, 12, 12),
        3,
        config.optimizer.build(),
        config.learning_rate,
        &mut rng,
    )
    .unwrap();
    let env = ScriptedEnv {
        episode_length: 2,
        steps: 0,
    };
    let result = TrainingSession::new(&config, env, EstimatorPair::from_live(live).unwrap());
    assert!(matches!(result, Err(DqnError::DimensionMismatch { .. })));
}
