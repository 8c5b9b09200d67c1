use crate::schedule::DecaySchedule;

#[test]
fn test_threshold_endpoints() {
    let schedule = DecaySchedule::new(0.9, 0.05, 1000.0).unwrap();
    assert!((schedule.threshold() - 0.9).abs() < 1e-12);
    assert!(schedule.threshold_at(10_000) < 0.06);
    assert!(schedule.threshold_at(10_000) > 0.05);
}

#[test]
fn test_threshold_strictly_decreasing() {
    let schedule = DecaySchedule::new(0.9, 0.05, 1000.0).unwrap();
    let mut previous = schedule.threshold_at(0);
    for steps in (100..=5000).step_by(100) {
        let current = schedule.threshold_at(steps);
        assert!(current < previous, "threshold rose at step {}", steps);
        previous = current;
    }
}

#[test]
fn test_advance_and_restore() {
    let mut schedule = DecaySchedule::new(0.9, 0.05, 200.0).unwrap();
    for _ in 0..200 {
        schedule.advance();
    }
    assert_eq!(schedule.steps_taken(), 200);
    let expected = 0.05 + 0.85 * (-1.0f64).exp();
    assert!((schedule.threshold() - expected).abs() < 1e-12);

    let restored = DecaySchedule::new(0.9, 0.05, 200.0).unwrap().with_steps_taken(200);
    assert_eq!(restored, schedule);
}

#[test]
fn test_threshold_is_a_pure_read() {
    let schedule = DecaySchedule::new(0.9, 0.05, 200.0).unwrap();
    assert_eq!(schedule.threshold(), schedule.threshold());
    assert_eq!(schedule.steps_taken(), 0);
}

#[test]
fn test_rejects_non_positive_decay() {
    assert!(DecaySchedule::new(0.9, 0.05, 0.0).is_err());
    assert!(DecaySchedule::new(0.9, 0.05, -5.0).is_err());
    assert!(DecaySchedule::new(0.9, 0.05, f64::NAN).is_err());
}

#[test]
fn test_rejects_start_below_end() {
    assert!(DecaySchedule::new(0.05, 0.9, 200.0).is_err());
    assert!(DecaySchedule::new(f64::NAN, 0.05, 200.0).is_err());

    let constant = DecaySchedule::new(0.3, 0.3, 200.0).unwrap();
    assert_eq!(constant.threshold_at(0), constant.threshold_at(1000));
}
