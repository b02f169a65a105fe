//! Device-side emulator for a laser cutter's cloud control protocol.
//!
//! - [`pulse`]: GF1 motion file codec, step statistics and waveform generation
//! - [`device`]: action dispatch, single-flight guard, work queues and the emulator
//! - [`communication`]: protocol events and the download/upload transport
//! - [`config`]: TOML configuration

pub mod communication;
pub mod config;
pub mod device;
pub mod file_manager;
pub mod pulse;

pub use config::{ConfigError, EmulatorConfig, load_config};
pub use device::{ActionRequest, ActionType, Device, Services};
