pub mod test_replay_buffer;
pub mod test_schedule;
