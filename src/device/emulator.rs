// src/device/emulator.rs - Emulated machine: canned images and stored downloads
use chrono::Local;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::action::{ActionType, CameraSettings};
use super::context::{ActionContext, ActionError};
use super::machine::{CapturedImage, Machine};
use crate::config::{DeviceConfig, EmulatorConfig};
use crate::file_manager::FileManager;
use crate::pulse::{StepScale, load_motion};

/// Number of head images uploaded during the homing sequence.
pub const HOMING_STAGES: u8 = 4;

const BUTTON_POLL: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct EmulatorState {
    /// Next homing image to send; 0 when not homing
    homing_stage: u8,
    last_action: Option<ActionType>,
}

/// Answers requests the way the hardware does, using images from `image_src_dir`
/// and storing downloaded motion files in `motion_dl_dir`.
#[derive(Debug)]
pub struct Emulator {
    config: DeviceConfig,
    scale: StepScale,
    files: FileManager,
    state: Mutex<EmulatorState>,
}

impl Emulator {
    pub fn new(config: &EmulatorConfig) -> Self {
        let device = config.emulator.clone();
        let homing_stage = if device.bypass_homing { 0 } else { 1 };
        Self {
            files: FileManager::new(&device.motion_dl_dir),
            scale: config.pulse.scale(),
            config: device,
            state: Mutex::new(EmulatorState {
                homing_stage,
                last_action: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EmulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn homing_stage(&self) -> u8 {
        self.state().homing_stage
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    fn read_image(&self, file_name: String) -> Result<CapturedImage, ActionError> {
        let path = self.config.image_src_dir.join(&file_name);
        let bytes = std::fs::read(&path).map_err(|e| {
            tracing::error!("Cannot read image {}: {}", path.display(), e);
            e
        })?;
        Ok(CapturedImage { file_name, bytes })
    }

    fn lid_image_name(&self) -> String {
        let mut state = self.state();
        if state.homing_stage == 0 && state.last_action == Some(ActionType::Motion) {
            tracing::info!("Lid image after motion, restarting homing sequence");
            state.homing_stage = 1;
        }
        if state.homing_stage == 0 {
            return "LID_IMAGE.jpg".to_string();
        }
        let stage = state.homing_stage;
        tracing::info!("Homing step {}", stage);
        state.homing_stage = if stage < HOMING_STAGES { stage + 1 } else { 0 };
        format!("HOME_{}.jpg", stage)
    }
}

impl Machine for Emulator {
    fn download_motion(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        let url = ctx.motion_url()?;
        tracing::info!("Downloading motion for {} from {}", ctx.request(), url);
        let source = ctx.transport().fetch(url)?;
        let base = self.files.download_base(ctx.action_type().name(), Local::now());
        let body = self.files.create_motion_file(&base)?;
        let info = match load_motion(source, body) {
            Ok(info) => info,
            Err(e) => {
                tracing::error!("Rejected motion data for {}: {}", ctx.request(), e);
                self.files.discard(&base);
                return Err(e.into());
            }
        };
        let report = info.report(&self.scale);
        self.files.write_info(&base, &report)?;
        tracing::debug!(
            "Header: {} records, body {} bytes, run time {:?}",
            info.header.len(),
            info.size,
            info.run_time
        );
        Ok(())
    }

    fn wait_for_button(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        let deadline = Instant::now() + Duration::from_millis(self.config.button_wait_ms);
        while Instant::now() < deadline {
            ctx.checkpoint()?;
            thread::sleep(BUTTON_POLL.min(deadline.saturating_duration_since(Instant::now())));
        }
        Ok(())
    }

    fn capture_lid(&self, _ctx: &ActionContext<'_>) -> Result<CapturedImage, ActionError> {
        self.read_image(self.lid_image_name())
    }

    fn capture_head(&self, _ctx: &ActionContext<'_>, settings: Option<&CameraSettings>) -> Result<CapturedImage, ActionError> {
        let thickness = &self.config.material_thickness;
        let name = if settings.is_some_and(CameraSettings::laser_on) {
            format!("HEAD_LASER_{}.jpg", thickness)
        } else {
            format!("HEAD_NO_LASER_{}.jpg", thickness)
        };
        self.read_image(name)
    }

    fn action_finished(&self, action: ActionType) {
        self.state().last_action = Some(action);
    }
}
