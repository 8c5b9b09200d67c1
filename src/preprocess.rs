//! Screen preprocessing.
//!
//! Raw RGB renders are resized to a small fixed resolution, scaled to `[0, 1]`
//! and laid out channel-first. [`StateTracker`] turns consecutive processed
//! frames into the difference states the network sees.

use image::imageops::{resize, FilterType::Triangle};
use image::{ImageBuffer, Rgb};
use ndarray::{Array3, ArrayView3};

use crate::error::{DqnError, Result};
use crate::replay_buffer::State;

/// An RGB frame `(height, width, 3)` as rendered by an environment.
pub type RawFrame = Array3<u8>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FramePreprocessor {
    height: usize,
    width: usize,
}

impl FramePreprocessor {
    pub fn new(height: usize, width: usize) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(DqnError::invalid_parameter(
                "frame".to_string(),
                format!("resolution must be positive, got {}x{}", height, width),
            ));
        }
        Ok(FramePreprocessor { height, width })
    }

    /// Shape `(channels, height, width)` of every processed frame.
    pub fn output_shape(&self) -> (usize, usize, usize) {
        (3, self.height, self.width)
    }

    pub fn process(&self, frame: ArrayView3<u8>) -> Result<State> {
        let (h, w, c) = frame.dim();
        if c != 3 || h == 0 || w == 0 {
            return Err(DqnError::dimension_mismatch(
                "non-empty RGB frame (height, width, 3)".to_string(),
                format!("{:?}", frame.dim()),
            ));
        }

        let raw: Vec<u8> = frame.iter().copied().collect();
        let img = ImageBuffer::<Rgb<u8>, _>::from_raw(w as u32, h as u32, raw).ok_or_else(|| {
            DqnError::dimension_mismatch(format!("{} bytes", h * w * 3), "a shorter buffer".to_string())
        })?;
        let img = resize(&img, self.width as u32, self.height as u32, Triangle);

        Ok(Array3::from_shape_fn((3, self.height, self.width), |(ch, y, x)| {
            img.get_pixel(x as u32, y as u32)[ch] as f32 / 255.0
        }))
    }
}

/// Produces `current - last` states from a stream of processed frames.
#[derive(Clone, Debug, Default)]
pub struct StateTracker {
    last: Option<State>,
}

impl StateTracker {
    pub fn new() -> Self {
        StateTracker { last: None }
    }

    /// Start a new episode. The first state has no motion, so it is all zeros.
    pub fn reset(&mut self, frame: State) -> State {
        let state = State::zeros(frame.raw_dim());
        self.last = Some(frame);
        state
    }

    /// Difference between `frame` and the previously seen one.
    ///
    /// Without a previous frame this behaves like [`reset`](Self::reset).
    pub fn observe(&mut self, frame: State) -> State {
        let state = match &self.last {
            Some(last) if last.dim() == frame.dim() => &frame - last,
            _ => State::zeros(frame.raw_dim()),
        };
        self.last = Some(frame);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_shape_and_range() {
        let pre = FramePreprocessor::new(8, 6).unwrap();
        let frame = RawFrame::from_shape_fn((20, 30, 3), |(y, x, c)| ((y * 7 + x * 3 + c * 50) % 256) as u8);
        let state = pre.process(frame.view()).unwrap();
        assert_eq!(state.dim(), (3, 8, 6));
        assert!(state.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_uniform_frame_keeps_colour() {
        let pre = FramePreprocessor::new(4, 4).unwrap();
        let mut frame = RawFrame::zeros((16, 16, 3));
        frame.slice_mut(ndarray::s![.., .., 0]).fill(255);
        let state = pre.process(frame.view()).unwrap();
        assert!(state.index_axis(ndarray::Axis(0), 0).iter().all(|&v| (v - 1.0).abs() < 0.01));
        assert!(state.index_axis(ndarray::Axis(0), 1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rejects_non_rgb() {
        let pre = FramePreprocessor::new(4, 4).unwrap();
        let frame = RawFrame::zeros((16, 16, 4));
        assert!(matches!(
            pre.process(frame.view()),
            Err(DqnError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_tracker_differences() {
        let mut tracker = StateTracker::new();
        let first = State::from_elem((1, 2, 2), 0.25);
        let second = State::from_elem((1, 2, 2), 0.75);

        assert_eq!(tracker.reset(first), State::zeros((1, 2, 2)));
        assert_eq!(tracker.observe(second.clone()), State::from_elem((1, 2, 2), 0.5));
        assert_eq!(tracker.observe(second), State::zeros((1, 2, 2)));
    }
}
