// src/pulse/steps.rs - Per-byte step decoding
use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Motion and laser flags carried by one body byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StepFlags: u8 {
        /// Laser enabled
        const LE = 1 << 0;
        const XP = 1 << 1;
        const XN = 1 << 2;
        const YP = 1 << 3;
        const YN = 1 << 4;
        const ZP = 1 << 5;
        const ZN = 1 << 6;
    }
}

// Wire layout of a non-power byte
const POWER_BIT: u8 = 0b1000_0000;
const POWER_MASK: u8 = 0b0111_1111;
const LASER_BIT: u8 = 0b0001_0000;
const PAIR_MASK: u8 = 0b11;
const PAIR_POSITIVE: u8 = 0b01;
const PAIR_NEGATIVE: u8 = 0b11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    fn shift(self) -> u8 {
        match self {
            Axis::X => 0,
            Axis::Y => 2,
            Axis::Z => 5,
        }
    }

    pub fn positive(self) -> StepFlags {
        match self {
            Axis::X => StepFlags::XP,
            Axis::Y => StepFlags::YP,
            Axis::Z => StepFlags::ZP,
        }
    }

    pub fn negative(self) -> StepFlags {
        match self {
            Axis::X => StepFlags::XN,
            Axis::Y => StepFlags::YN,
            Axis::Z => StepFlags::ZN,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// One decoded body byte.
///
/// A laser-power byte carries only `power`; every other byte carries only `flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Step {
    pub flags: StepFlags,
    pub power: Option<u8>,
}

impl Step {
    pub fn laser_enabled(&self) -> bool {
        self.flags.contains(StepFlags::LE)
    }

    pub fn is_power(&self) -> bool {
        self.power.is_some()
    }

    /// Net movement on `axis`: +1, -1, or 0. A byte reporting both directions nets to 0.
    pub fn offset(&self, axis: Axis) -> i64 {
        let mut offset = 0;
        if self.flags.contains(axis.positive()) {
            offset += 1;
        }
        if self.flags.contains(axis.negative()) {
            offset -= 1;
        }
        offset
    }

    /// `direction`: `Some(true)` positive only, `Some(false)` negative only, `None` either.
    pub fn moves(&self, axis: Axis, direction: Option<bool>) -> bool {
        (self.flags.contains(axis.positive()) && direction != Some(false))
            || (self.flags.contains(axis.negative()) && direction != Some(true))
    }
}

/// Decode one body byte. Every byte value decodes to some flag set.
pub fn decode_step(byte: u8) -> Step {
    if byte & POWER_BIT != 0 {
        return Step {
            flags: StepFlags::empty(),
            power: Some(byte & POWER_MASK),
        };
    }
    let mut flags = StepFlags::empty();
    if byte & LASER_BIT != 0 {
        flags |= StepFlags::LE;
    }
    for axis in Axis::ALL {
        match (byte >> axis.shift()) & PAIR_MASK {
            PAIR_POSITIVE => flags |= axis.positive(),
            PAIR_NEGATIVE => flags |= axis.negative(),
            _ => {}
        }
    }
    Step { flags, power: None }
}

/// Encode a well-formed step (at most one flag per axis pair) back to its byte.
pub fn encode_step(step: &Step) -> u8 {
    if let Some(power) = step.power {
        return POWER_BIT | (power & POWER_MASK);
    }
    let mut byte = 0;
    if step.laser_enabled() {
        byte |= LASER_BIT;
    }
    for axis in Axis::ALL {
        if step.flags.contains(axis.negative()) {
            byte |= PAIR_NEGATIVE << axis.shift();
        } else if step.flags.contains(axis.positive()) {
            byte |= PAIR_POSITIVE << axis.shift();
        }
    }
    byte
}

/// 1-based index of the first step moving on `axis` (any axis if `None`) in `direction`.
pub fn find(bytes: &[u8], axis: Option<Axis>, direction: Option<bool>) -> Option<usize> {
    let axes: &[Axis] = match axis {
        Some(ref axis) => std::slice::from_ref(axis),
        None => &Axis::ALL,
    };
    bytes
        .iter()
        .position(|&byte| {
            let step = decode_step(byte);
            axes.iter().any(|&axis| step.moves(axis, direction))
        })
        .map(|index| index + 1)
}

/// 1-based index of the first step whose laser-enable flag equals `on`.
pub fn find_laser(bytes: &[u8], on: bool) -> Option<usize> {
    bytes
        .iter()
        .position(|&byte| decode_step(byte).laser_enabled() == on)
        .map(|index| index + 1)
}

pub fn laser_on_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&byte| decode_step(byte).laser_enabled()).count()
}
