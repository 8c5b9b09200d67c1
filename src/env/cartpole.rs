use std::f32::consts::PI;

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::CartPoleConfig;
use crate::env::{Environment, Step};
use crate::error::{DqnError, Result};
use crate::preprocess::RawFrame;

const GRAVITY: f32 = 9.8;
const MASS_CART: f32 = 1.0;
const MASS_POLE: f32 = 0.1;
/// Half the pole length.
const LENGTH: f32 = 0.5;
const FORCE_MAG: f32 = 10.0;
const TAU: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * 2.0 * PI / 360.0;

const BACKGROUND: [u8; 3] = [255, 255, 255];
const CART_COLOUR: [u8; 3] = [0, 0, 0];
const POLE_COLOUR: [u8; 3] = [204, 153, 102];
const AXLE_COLOUR: [u8; 3] = [127, 127, 204];

/// Cart-pole balancing task rendered to RGB frames.
///
/// Action 0 pushes the cart left, action 1 pushes it right. Every step is
/// rewarded with 1.0; the episode ends once the cart leaves the track, the
/// pole tilts past 12 degrees, or `max_episode_steps` is reached.
#[derive(Clone, Debug)]
pub struct CartPole {
    x: f32,
    x_dot: f32,
    theta: f32,
    theta_dot: f32,
    steps: usize,
    done: bool,
    config: CartPoleConfig,
    rng: StdRng,
}

impl CartPole {
    pub fn new(config: CartPoleConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        CartPole {
            x: 0.0,
            x_dot: 0.0,
            theta: 0.0,
            theta_dot: 0.0,
            steps: 0,
            done: true,
            config,
            rng,
        }
    }

    /// `(x, x_dot, theta, theta_dot)`
    pub fn physical_state(&self) -> [f32; 4] {
        [self.x, self.x_dot, self.theta, self.theta_dot]
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    fn integrate(&mut self, action: usize) {
        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };
        let cos_theta = self.theta.cos();
        let sin_theta = self.theta.sin();
        let total_mass = MASS_CART + MASS_POLE;
        let pole_mass_length = MASS_POLE * LENGTH;

        let temp = (force + pole_mass_length * self.theta_dot * self.theta_dot * sin_theta) / total_mass;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (LENGTH * (4.0 / 3.0 - MASS_POLE * cos_theta * cos_theta / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        self.x += TAU * self.x_dot;
        self.x_dot += TAU * x_acc;
        self.theta += TAU * self.theta_dot;
        self.theta_dot += TAU * theta_acc;
    }

    /// Draw the track, cart and pole onto a fresh canvas.
    pub fn render(&self) -> RawFrame {
        let (height, width) = (self.config.render_height, self.config.render_width);
        let mut frame = RawFrame::from_shape_fn((height, width, 3), |(_, _, c)| BACKGROUND[c]);

        let scale = width as f32 / (2.0 * X_THRESHOLD);
        let unit = width as f32 / 600.0;
        let cart_width = 50.0 * unit;
        let cart_height = 30.0 * unit;
        let pole_width = (10.0 * unit).max(1.0);
        let pole_len = scale * 2.0 * LENGTH;

        let track_y = height as f32 * 0.75;
        let cart_x = self.x * scale + width as f32 / 2.0;

        fill_rect(&mut frame, 0.0, track_y, width as f32, track_y + 1.0, CART_COLOUR);
        fill_rect(
            &mut frame,
            cart_x - cart_width / 2.0,
            track_y - cart_height / 2.0,
            cart_x + cart_width / 2.0,
            track_y + cart_height / 2.0,
            CART_COLOUR,
        );

        let axle_y = track_y - cart_height / 4.0;
        let segments = (pole_len.ceil() as usize).max(1);
        for i in 0..=segments {
            let along = pole_len * i as f32 / segments as f32;
            let px = cart_x + along * self.theta.sin();
            let py = axle_y - along * self.theta.cos();
            fill_disc(&mut frame, px, py, pole_width / 2.0, POLE_COLOUR);
        }
        fill_disc(&mut frame, cart_x, axle_y, pole_width / 2.0, AXLE_COLOUR);

        frame
    }
}

fn put_pixel(frame: &mut RawFrame, x: isize, y: isize, colour: [u8; 3]) {
    let (height, width, _) = frame.dim();
    if x < 0 || y < 0 || x as usize >= width || y as usize >= height {
        return;
    }
    for (c, &v) in colour.iter().enumerate() {
        frame[[y as usize, x as usize, c]] = v;
    }
}

fn fill_rect(frame: &mut RawFrame, x0: f32, y0: f32, x1: f32, y1: f32, colour: [u8; 3]) {
    for y in y0.floor() as isize..y1.ceil() as isize {
        for x in x0.floor() as isize..x1.ceil() as isize {
            put_pixel(frame, x, y, colour);
        }
    }
}

fn fill_disc(frame: &mut RawFrame, cx: f32, cy: f32, radius: f32, colour: [u8; 3]) {
    let r = radius.ceil() as isize;
    let (ix, iy) = (cx.round() as isize, cy.round() as isize);
    for dy in -r..=r {
        for dx in -r..=r {
            if ((dx * dx + dy * dy) as f32) <= radius * radius + 0.5 {
                put_pixel(frame, ix + dx, iy + dy, colour);
            }
        }
    }
}

impl Environment for CartPole {
    fn reset(&mut self) -> Result<RawFrame> {
        self.x = self.rng.gen_range(-0.05..0.05);
        self.x_dot = self.rng.gen_range(-0.05..0.05);
        self.theta = self.rng.gen_range(-0.05..0.05);
        self.theta_dot = self.rng.gen_range(-0.05..0.05);
        self.steps = 0;
        self.done = false;
        Ok(self.render())
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        if action >= 2 {
            return Err(DqnError::InvalidAction { action, num_actions: 2 });
        }
        if self.done {
            return Err(DqnError::Environment("step called on a finished episode; call reset first".to_string()));
        }

        self.integrate(action);
        self.steps += 1;
        self.done = self.x.abs() > X_THRESHOLD
            || self.theta.abs() > THETA_THRESHOLD
            || self.steps >= self.config.max_episode_steps;
        trace!("cartpole step {}: x {:.3}, theta {:.3}", self.steps, self.x, self.theta);

        Ok(Step {
            frame: self.render(),
            reward: 1.0,
            done: self.done,
        })
    }

    fn action_space_size(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CartPoleConfig {
        CartPoleConfig {
            max_episode_steps: 500,
            render_height: 40,
            render_width: 60,
        }
    }

    #[test]
    fn test_seeded_resets_match() {
        let mut a = CartPole::new(small_config(), Some(3));
        let mut b = CartPole::new(small_config(), Some(3));
        a.reset().unwrap();
        b.reset().unwrap();
        assert_eq!(a.physical_state(), b.physical_state());
        assert!(a.physical_state().iter().all(|v| v.abs() < 0.05));
    }

    #[test]
    fn test_episode_terminates_when_pushed_one_way() {
        let mut env = CartPole::new(small_config(), Some(0));
        env.reset().unwrap();
        let mut steps = 0;
        loop {
            let step = env.step(1).unwrap();
            assert_eq!(step.reward, 1.0);
            steps += 1;
            if step.done {
                break;
            }
            assert!(steps < 500);
        }
        assert!(env.physical_state()[2].abs() > THETA_THRESHOLD || env.physical_state()[0].abs() > X_THRESHOLD);
        assert!(env.step(0).is_err());
    }

    #[test]
    fn test_max_episode_steps() {
        let config = CartPoleConfig {
            max_episode_steps: 3,
            ..small_config()
        };
        let mut env = CartPole::new(config, Some(1));
        env.reset().unwrap();
        assert!(!env.step(0).unwrap().done);
        assert!(!env.step(1).unwrap().done);
        assert!(env.step(0).unwrap().done);
    }

    #[test]
    fn test_invalid_action() {
        let mut env = CartPole::new(small_config(), None);
        env.reset().unwrap();
        assert!(matches!(env.step(2), Err(DqnError::InvalidAction { action: 2, num_actions: 2 })));
    }

    #[test]
    fn test_render_draws_cart() {
        let mut env = CartPole::new(small_config(), Some(5));
        let frame = env.reset().unwrap();
        assert_eq!(frame.dim(), (40, 60, 3));
        assert!(frame.iter().any(|&v| v == 0));
        assert!(frame.iter().any(|&v| v == 255));
    }
}
