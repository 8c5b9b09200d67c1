use ndarray::ArrayView1;
use rand::Rng;

use crate::error::{DqnError, Result};
use crate::estimator::ValueEstimator;
use crate::replay_buffer::State;
use crate::schedule::DecaySchedule;

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: ArrayView1<f32>) -> Result<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if !(v > b) => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
        .ok_or_else(|| DqnError::NumericalError("argmax of an empty value vector".to_string()))
}

/// Epsilon-greedy action selection.
///
/// A uniform draw above the schedule's current threshold exploits the
/// estimator; otherwise a uniformly random action is taken. The schedule
/// advances exactly once per call, whichever branch is taken.
pub fn select_action<E, R>(
    state: &State,
    schedule: &mut DecaySchedule,
    estimator: &E,
    action_space_size: usize,
    rng: &mut R,
) -> Result<usize>
where
    E: ValueEstimator + ?Sized,
    R: Rng + ?Sized,
{
    if action_space_size == 0 {
        return Err(DqnError::invalid_parameter(
            "action_space_size",
            "must be at least 1",
        ));
    }

    let sample: f64 = rng.gen();
    let threshold = schedule.threshold();
    schedule.advance();

    if sample > threshold {
        let values = estimator.evaluate(state.view())?;
        argmax(values.view())
    } else {
        Ok(rng.gen_range(0..action_space_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmax_ties_pick_lowest() {
        assert_eq!(argmax(array![1.0, 3.0, 3.0, 2.0].view()).unwrap(), 1);
        assert_eq!(argmax(array![-1.0].view()).unwrap(), 0);
    }

    #[test]
    fn test_argmax_empty() {
        let empty: [f32; 0] = [];
        assert!(matches!(
            argmax(ArrayView1::from(&empty[..])),
            Err(DqnError::NumericalError(_))
        ));
    }
}
