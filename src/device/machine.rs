// src/device/machine.rs - Hooks a concrete machine implements
use super::action::{ActionType, CameraSettings};
use super::context::{ActionContext, ActionError};

/// An image ready to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Device-specific work behind each action. The handlers in the registry emit the
/// protocol events and call these hooks between checkpoints.
pub trait Machine: Send + Sync {
    /// Fetch and store the request's motion file.
    fn download_motion(&self, ctx: &ActionContext<'_>) -> Result<(), ActionError>;

    /// Block until the start button is pressed.
    fn wait_for_button(&self, _ctx: &ActionContext<'_>) -> Result<(), ActionError> {
        Ok(())
    }

    fn capture_lid(&self, ctx: &ActionContext<'_>) -> Result<CapturedImage, ActionError>;

    fn capture_head(&self, ctx: &ActionContext<'_>, settings: Option<&CameraSettings>)
        -> Result<CapturedImage, ActionError>;

    /// Called once per admitted action, after its terminal event.
    fn action_finished(&self, _action: ActionType) {}
}
