//! # GF1 pulse waveform codec
//!
//! A GF1 motion file is an 8-byte preamble, a block of 8-byte header records and a
//! body in which every byte is one timing tick of the stepper/laser waveform.
//!
//! ```text
//! offset 0      lead byte (not interpreted)
//! offset 1..4   "GF1"
//! offset 4..6   header length, u16 little-endian, includes the 8-byte preamble
//! offset 6..8   reserved
//! offset 8..    header records: 4-byte ASCII key + u32 little-endian value
//! ...           pulse body
//! ```
//!
//! Decoding is split the same way: [`header`] for the record block, [`steps`] for the
//! per-byte flags, [`stats`] for the foldable statistics, [`file`] for whole files and
//! streamed downloads, and [`generate`] for synthetic linear moves.

pub mod file;
pub mod generate;
pub mod header;
pub mod stats;
pub mod steps;

use thiserror::Error;

pub use file::{MotionInfo, PulseFile, load_motion};
pub use generate::{LinearProfile, generate_linear, generate_linear_with};
pub use header::{HeaderKey, MotionHeader, decode_header, encode_header};
pub use stats::{AxisExtents, AxisStats, Distances, RunningStats, StepScale, delta, extents, fold_stats};
pub use steps::{Axis, Step, StepFlags, decode_step, encode_step, find, find_laser, laser_on_count};

/// Signature found at offset 1 of every pulse file.
pub const MAGIC: &[u8; 3] = b"GF1";

/// Size of the fixed preamble, which the declared header length includes.
pub const PREAMBLE_LEN: usize = 8;

/// Size of one header record.
pub const RECORD_LEN: usize = 8;

/// Header key carrying the step frequency in steps per second.
pub const STEP_FREQUENCY_KEY: HeaderKey = HeaderKey(*b"STfr");

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("bad magic: expected \"GF1\", found {0:?}")]
    BadMagic(Vec<u8>),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
