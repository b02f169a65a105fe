// src/pulse/generate.rs - Synthetic linear moves
use super::steps::{Axis, Step, StepFlags, encode_step};

/// Velocity profile for [`generate_linear_with`].
///
/// Each step byte is followed by `delay` idle bytes. The delay ramps linearly from
/// `start_delay` down to `cruise_delay` over `accel_steps` steps and back up again
/// over the last `accel_steps` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearProfile {
    pub accel_steps: u32,
    pub start_delay: u32,
    pub cruise_delay: u32,
    /// Set the laser-enable flag on every step byte
    pub laser: bool,
}

impl Default for LinearProfile {
    fn default() -> Self {
        Self {
            accel_steps: 64,
            start_delay: 16,
            cruise_delay: 2,
            laser: false,
        }
    }
}

impl LinearProfile {
    fn delay(&self, index: u64, steps: u64) -> u64 {
        let start = self.start_delay as u64;
        let cruise = (self.cruise_delay as u64).min(start);
        let ramp = (self.accel_steps as u64).min(steps / 2);
        let from_edge = index.min(steps - 1 - index);
        if from_edge < ramp {
            start - (start - cruise) * from_edge / ramp
        } else {
            cruise
        }
    }
}

/// Body bytes for a straight move of `dx`, `dy` microsteps with the default profile.
pub fn generate_linear(dx: i64, dy: i64) -> Vec<u8> {
    generate_linear_with(dx, dy, &LinearProfile::default())
}

/// Body bytes for a straight move of `dx`, `dy` microsteps.
///
/// The major axis steps on every step byte; the minor axis is distributed with an
/// integer line walk, so the body's net displacement is exactly `(dx, dy, 0)`.
pub fn generate_linear_with(dx: i64, dy: i64, profile: &LinearProfile) -> Vec<u8> {
    let (ax, ay) = (dx.unsigned_abs(), dy.unsigned_abs());
    let steps = ax.max(ay);
    if steps == 0 {
        return Vec::new();
    }

    let direction = |axis: Axis, d: i64| if d < 0 { axis.negative() } else { axis.positive() };
    let (x_flag, y_flag) = (direction(Axis::X, dx), direction(Axis::Y, dy));
    let laser = if profile.laser { StepFlags::LE } else { StepFlags::empty() };

    let mut out = Vec::new();
    let (mut x_done, mut y_done) = (0u64, 0u64);
    for i in 0..steps {
        let taken = i + 1;
        let mut flags = laser;
        let x_due = taken * ax / steps;
        if x_due > x_done {
            flags |= x_flag;
            x_done = x_due;
        }
        let y_due = taken * ay / steps;
        if y_due > y_done {
            flags |= y_flag;
            y_done = y_due;
        }
        out.push(encode_step(&Step { flags, power: None }));
        let idle = encode_step(&Step { flags: laser, power: None });
        out.extend(std::iter::repeat_n(idle, profile.delay(i, steps) as usize));
    }
    out
}
