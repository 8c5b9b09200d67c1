use ndarray::Array3;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::DqnError;
use crate::replay_buffer::{ReplayBuffer, Transition};

/// Transition whose identity is carried in its reward.
fn tagged(tag: usize) -> Transition {
    Transition::new(Array3::zeros((1, 1, 1)), 0, Some(Array3::ones((1, 1, 1))), tag as f32)
}

fn rewards(buffer: &ReplayBuffer) -> Vec<f32> {
    buffer.iter().map(|t| t.reward).collect()
}

#[test]
fn test_zero_capacity_rejected() {
    assert!(matches!(ReplayBuffer::new(0), Err(DqnError::InvalidParameter { .. })));
}

#[test]
fn test_push_until_full() {
    let mut buffer = ReplayBuffer::new(3).unwrap();
    assert!(buffer.is_empty());
    for i in 1..=3 {
        buffer.push(tagged(i));
        assert_eq!(buffer.len(), i);
    }
    assert_eq!(buffer.write_cursor(), 0);
    assert_eq!(rewards(&buffer), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_overwrite_order() {
    let mut buffer = ReplayBuffer::new(4).unwrap();
    for i in 1..=6 {
        buffer.push(tagged(i));
    }
    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.capacity(), 4);
    assert_eq!(buffer.write_cursor(), 2);
    assert_eq!(rewards(&buffer), vec![5.0, 6.0, 3.0, 4.0]);
}

#[test]
fn test_sample_is_distinct_and_present() {
    let mut buffer = ReplayBuffer::new(10).unwrap();
    for i in 0..8 {
        buffer.push(tagged(i));
    }
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20 {
        let batch = buffer.sample_with(5, &mut rng).unwrap();
        assert_eq!(batch.len(), 5);
        let mut tags: Vec<usize> = batch.iter().map(|t| t.reward as usize).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), 5);
        assert!(tags.iter().all(|&t| t < 8));
    }
}

#[test]
fn test_sample_whole_buffer() {
    let mut buffer = ReplayBuffer::new(4).unwrap();
    for i in 0..4 {
        buffer.push(tagged(i));
    }
    let mut tags: Vec<usize> = buffer.sample(4).unwrap().iter().map(|t| t.reward as usize).collect();
    tags.sort_unstable();
    assert_eq!(tags, vec![0, 1, 2, 3]);
}

#[test]
fn test_sample_too_many() {
    let mut buffer = ReplayBuffer::new(4).unwrap();
    buffer.push(tagged(0));
    buffer.push(tagged(1));
    match buffer.sample(3) {
        Err(DqnError::InsufficientData { requested, available }) => {
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientData, got {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn test_terminal_transition() {
    let t = Transition::new(Array3::zeros((1, 1, 1)), 1, None, 1.0);
    assert!(t.is_terminal());
    assert!(!tagged(0).is_terminal());
}
