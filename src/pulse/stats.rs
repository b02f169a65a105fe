// src/pulse/stats.rs - Foldable waveform statistics
//
// Every field is a sum or a running maximum over the byte stream, and the running
// position (`end`) is carried between chunks, so folding chunk by chunk gives the
// same result as folding the whole body at once.
use serde::Serialize;
use std::time::Duration;

use super::steps::{Axis, Step, decode_step};

pub const MM_PER_INCH: f64 = 25.4;

/// Default microstep resolution: 2400 steps per inch on every axis.
pub const DEFAULT_STEPS_PER_MM: f64 = 2400.0 / MM_PER_INCH;

/// Per-axis accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisStats {
    /// Steps in the positive direction
    pub positive: u64,
    /// Steps in the negative direction
    pub negative: u64,
    /// Net signed displacement in steps
    pub end: i64,
    /// Furthest positive position reached (0 if never positive)
    pub max_positive: i64,
    /// Furthest negative position reached (0 if never negative)
    pub max_negative: i64,
}

impl AxisStats {
    pub fn total(&self) -> u64 {
        self.positive + self.negative
    }

    pub fn extents(&self) -> AxisExtents {
        AxisExtents {
            max_positive: self.max_positive,
            max_negative: self.max_negative,
        }
    }

    fn apply(&mut self, step: &Step, axis: Axis) {
        if step.flags.contains(axis.positive()) {
            self.positive += 1;
        }
        if step.flags.contains(axis.negative()) {
            self.negative += 1;
        }
        self.end += step.offset(axis);
        if self.end > self.max_positive {
            self.max_positive = self.end;
        } else if self.end < self.max_negative {
            self.max_negative = self.end;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AxisExtents {
    pub max_positive: i64,
    pub max_negative: i64,
}

/// Running statistics over a pulse body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunningStats {
    pub x: AxisStats,
    pub y: AxisStats,
    pub z: AxisStats,
    /// Bytes with the laser-enable flag
    pub laser_enabled: u64,
    /// Laser-power bytes
    pub laser_power: u64,
    /// Bytes folded so far
    pub bytes: u64,
}

impl RunningStats {
    pub fn axis(&self, axis: Axis) -> &AxisStats {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    fn axis_mut(&mut self, axis: Axis) -> &mut AxisStats {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }

    pub fn push(&mut self, step: &Step) {
        self.bytes += 1;
        if step.is_power() {
            self.laser_power += 1;
        }
        if step.laser_enabled() {
            self.laser_enabled += 1;
        }
        for axis in Axis::ALL {
            self.axis_mut(axis).apply(step, axis);
        }
    }

    pub fn delta(&self) -> [i64; 3] {
        [self.x.end, self.y.end, self.z.end]
    }

    pub fn extents(&self) -> [AxisExtents; 3] {
        [self.x.extents(), self.y.extents(), self.z.extents()]
    }

    pub fn distances(&self, scale: &StepScale) -> Distances {
        let mm = |axis: Axis| self.axis(axis).end as f64 / scale.steps_per_mm[axis.index()];
        let (x_mm, y_mm, z_mm) = (mm(Axis::X), mm(Axis::Y), mm(Axis::Z));
        Distances {
            x_mm,
            y_mm,
            z_mm,
            x_in: x_mm / MM_PER_INCH,
            y_in: y_mm / MM_PER_INCH,
            z_in: z_mm / MM_PER_INCH,
        }
    }

    /// Time spent with the laser enabled at `step_frequency` steps per second.
    pub fn laser_on_time(&self, step_frequency: u32) -> Option<Duration> {
        (step_frequency > 0).then(|| Duration::from_secs_f64(self.laser_enabled as f64 / step_frequency as f64))
    }

    pub fn report(&self, scale: &StepScale) -> StatsReport {
        StatsReport::new(self, scale)
    }
}

/// Fold `bytes` into `previous` (or a fresh accumulator).
pub fn fold_stats(bytes: &[u8], previous: Option<RunningStats>) -> RunningStats {
    let mut stats = previous.unwrap_or_default();
    for &byte in bytes {
        stats.push(&decode_step(byte));
    }
    stats
}

/// Net displacement per axis, `[x, y, z]`.
pub fn delta(bytes: &[u8]) -> [i64; 3] {
    fold_stats(bytes, None).delta()
}

/// Furthest excursion from the origin per axis, `[x, y, z]`.
pub fn extents(bytes: &[u8]) -> [AxisExtents; 3] {
    fold_stats(bytes, None).extents()
}

/// Microstep-to-distance ratio used for the derived distance fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepScale {
    pub steps_per_mm: [f64; 3],
}

impl Default for StepScale {
    fn default() -> Self {
        Self {
            steps_per_mm: [DEFAULT_STEPS_PER_MM; 3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Distances {
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
    pub x_in: f64,
    pub y_in: f64,
    pub z_in: f64,
}

/// Flat, upper-case view of the statistics as written to `.info` files.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct StatsReport {
    pub xp: u64,
    pub xn: u64,
    pub yp: u64,
    pub yn: u64,
    pub zp: u64,
    pub zn: u64,
    pub xtot: u64,
    pub ytot: u64,
    pub ztot: u64,
    pub xend: i64,
    pub yend: i64,
    pub zend: i64,
    pub le: u64,
    pub lp: u64,
    pub bytes: u64,
    pub x_mm: f64,
    pub y_mm: f64,
    pub z_mm: f64,
    pub x_in: f64,
    pub y_in: f64,
    pub z_in: f64,
    pub extents: [AxisExtents; 3],
}

impl StatsReport {
    fn new(stats: &RunningStats, scale: &StepScale) -> Self {
        let d = stats.distances(scale);
        Self {
            xp: stats.x.positive,
            xn: stats.x.negative,
            yp: stats.y.positive,
            yn: stats.y.negative,
            zp: stats.z.positive,
            zn: stats.z.negative,
            xtot: stats.x.total(),
            ytot: stats.y.total(),
            ztot: stats.z.total(),
            xend: stats.x.end,
            yend: stats.y.end,
            zend: stats.z.end,
            le: stats.laser_enabled,
            lp: stats.laser_power,
            bytes: stats.bytes,
            x_mm: d.x_mm,
            y_mm: d.y_mm,
            z_mm: d.z_mm,
            x_in: d.x_in,
            y_in: d.y_in,
            z_in: d.z_in,
            extents: stats.extents(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_each_pair_and_laser() {
        // XP+LE, XN, YP, YN, ZP, ZN, power, idle
        let body = [0x11, 0x03, 0x04, 0x0C, 0x20, 0x60, 0x85, 0x00];
        let stats = fold_stats(&body, None);
        assert_eq!((stats.x.positive, stats.x.negative), (1, 1));
        assert_eq!((stats.y.positive, stats.y.negative), (1, 1));
        assert_eq!((stats.z.positive, stats.z.negative), (1, 1));
        assert_eq!(stats.delta(), [0, 0, 0]);
        assert_eq!(stats.laser_enabled, 1);
        assert_eq!(stats.laser_power, 1);
        assert_eq!(stats.bytes, 8);
    }

    #[test]
    fn extents_track_furthest_excursion() {
        // +3 on X, then -5
        let body = [0x01, 0x01, 0x01, 0x03, 0x03, 0x03, 0x03, 0x03];
        let ext = extents(&body);
        assert_eq!(ext[0], AxisExtents { max_positive: 3, max_negative: -2 });
        assert_eq!(ext[1], AxisExtents::default());
        assert_eq!(delta(&body), [-2, 0, 0]);
    }

    #[test]
    fn chunked_fold_matches_single_pass() {
        let body = [0x01, 0x03, 0x03, 0x11, 0x8F, 0x64, 0x0C, 0x03, 0x03, 0x04];
        let whole = fold_stats(&body, None);
        for split in 0..=body.len() {
            let (a, b) = body.split_at(split);
            assert_eq!(fold_stats(b, Some(fold_stats(a, None))), whole, "split at {split}");
        }
    }

    #[test]
    fn derived_distances_follow_displacement() {
        let scale = StepScale { steps_per_mm: [10.0, 20.0, 5.0] };
        let stats = fold_stats(&[0x01; 20], None);
        let d = stats.distances(&scale);
        assert_eq!(d.x_mm, 2.0);
        assert_eq!(d.y_mm, 0.0);
        assert!((d.x_in - 2.0 / MM_PER_INCH).abs() < 1e-12);
    }

    #[test]
    fn laser_on_time_needs_frequency() {
        let stats = fold_stats(&[0x10; 500], None);
        assert_eq!(stats.laser_on_time(1000), Some(Duration::from_millis(500)));
        assert_eq!(stats.laser_on_time(0), None);
    }

    #[test]
    fn report_uses_upper_case_keys() {
        let report = fold_stats(&[0x11, 0x00], None).report(&StepScale::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["XTOT"], 1);
        assert_eq!(json["XEND"], 1);
        assert_eq!(json["LE"], 1);
        assert!(json.get("X_MM").is_some());
    }
}
