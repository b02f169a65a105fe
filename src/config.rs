//! # Emulator configuration
//!
//! ```toml
//! [general]
//! log_level = "debug"
//! shutdown_timeout_secs = 5
//!
//! [machine]
//! serial = "100000001"
//!
//! [emulator]
//! image_src_dir = "images"
//! motion_dl_dir = "downloads"
//! material_thickness = "0.125"
//! bypass_homing = false
//!
//! [pulse]
//! steps_per_mm = [94.488, 94.488, 94.488]
//! ```
//!
//! Every section and field is optional; missing values fall back to the defaults below.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::pulse::stats::DEFAULT_STEPS_PER_MM;
use crate::pulse::{LinearProfile, StepScale};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmulatorConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub machine: MachineConfig,
    #[serde(default)]
    pub emulator: DeviceConfig,
    #[serde(default)]
    pub pulse: PulseConfig,
}

impl EmulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, &steps) in ["x", "y", "z"].iter().zip(&self.pulse.steps_per_mm) {
            if !(steps > 0.0) {
                return Err(ConfigError::Invalid(format!("steps_per_mm for axis '{}' must be > 0", axis)));
            }
        }
        if self.pulse.cruise_delay > self.pulse.start_delay {
            return Err(ConfigError::Invalid(format!(
                "cruise_delay ({}) must not exceed start_delay ({})",
                self.pulse.cruise_delay, self.pulse.start_delay
            )));
        }
        if self.general.log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!("unknown log level '{}'", self.general.log_level)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl GeneralConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Identity values reported in the settings report.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MachineConfig {
    #[serde(default = "default_serial")]
    pub serial: String,
    #[serde(default = "default_app_version")]
    pub app_version: String,
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
    #[serde(default = "default_head_serial")]
    pub head_serial: String,
    #[serde(default = "default_head_id")]
    pub head_id: String,
    #[serde(default = "default_head_firmware")]
    pub head_firmware: String,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            serial: default_serial(),
            app_version: default_app_version(),
            firmware_version: default_firmware_version(),
            head_serial: default_head_serial(),
            head_id: default_head_id(),
            head_firmware: default_head_firmware(),
        }
    }
}

/// Emulated device behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default = "default_image_src_dir")]
    pub image_src_dir: PathBuf,
    #[serde(default = "default_motion_dl_dir")]
    pub motion_dl_dir: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Suffix of the head camera images, e.g. `HEAD_LASER_0.125.jpg`
    #[serde(default = "default_material_thickness")]
    pub material_thickness: String,
    #[serde(default)]
    pub bypass_homing: bool,
    /// How long a print waits for the (emulated) button press
    #[serde(default)]
    pub button_wait_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            image_src_dir: default_image_src_dir(),
            motion_dl_dir: default_motion_dl_dir(),
            upload_dir: default_upload_dir(),
            material_thickness: default_material_thickness(),
            bypass_homing: false,
            button_wait_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PulseConfig {
    #[serde(default = "default_steps_per_mm")]
    pub steps_per_mm: [f64; 3],
    #[serde(default = "default_accel_steps")]
    pub accel_steps: u32,
    #[serde(default = "default_start_delay")]
    pub start_delay: u32,
    #[serde(default = "default_cruise_delay")]
    pub cruise_delay: u32,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            steps_per_mm: default_steps_per_mm(),
            accel_steps: default_accel_steps(),
            start_delay: default_start_delay(),
            cruise_delay: default_cruise_delay(),
        }
    }
}

impl PulseConfig {
    pub fn scale(&self) -> StepScale {
        StepScale {
            steps_per_mm: self.steps_per_mm,
        }
    }

    pub fn profile(&self) -> LinearProfile {
        LinearProfile {
            accel_steps: self.accel_steps,
            start_delay: self.start_delay,
            cruise_delay: self.cruise_delay,
            laser: false,
        }
    }
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_shutdown_timeout_secs() -> u64 { 5 }
fn default_serial() -> String { "100000001".to_string() }
fn default_app_version() -> String { "1.0.0".to_string() }
fn default_firmware_version() -> String { "1.0.0".to_string() }
fn default_head_serial() -> String { "123456789".to_string() }
fn default_head_id() -> String { "1100".to_string() }
fn default_head_firmware() -> String { "199234110".to_string() }
fn default_image_src_dir() -> PathBuf { PathBuf::from("images") }
fn default_motion_dl_dir() -> PathBuf { PathBuf::from("downloads") }
fn default_upload_dir() -> PathBuf { PathBuf::from("uploads") }
fn default_material_thickness() -> String { "0.125".to_string() }
fn default_steps_per_mm() -> [f64; 3] { [DEFAULT_STEPS_PER_MM; 3] }
fn default_accel_steps() -> u32 { 64 }
fn default_start_delay() -> u32 { 16 }
fn default_cruise_delay() -> u32 { 2 }

/// Load configuration from a TOML file at the given path.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EmulatorConfig, ConfigError> {
    let path = path.as_ref();
    let config: EmulatorConfig = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = EmulatorConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.emulator.material_thickness, "0.125");
        assert!(!config.emulator.bypass_homing);
        assert_eq!(config.pulse.scale(), StepScale::default());
        assert_eq!(config.pulse.profile(), LinearProfile::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("emulator.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[machine]\nserial = '42'\n[emulator]\nbypass_homing = true").unwrap();
        file.flush().unwrap();
        let config = load_config(&file_path).unwrap();
        assert_eq!(config.machine.serial, "42");
        assert!(config.emulator.bypass_homing);
        // Defaults for missing fields
        assert_eq!(config.machine.app_version, "1.0.0");
        assert_eq!(config.pulse.accel_steps, 64);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(&file_path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config: EmulatorConfig = toml::from_str("[pulse]\nsteps_per_mm = [1.0, 0.0, 1.0]").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config: EmulatorConfig = toml::from_str("[pulse]\nstart_delay = 1\ncruise_delay = 4").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config: EmulatorConfig = toml::from_str("[general]\nlog_level = 'loud'").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
