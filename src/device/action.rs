// src/device/action.rs - Action requests as received from the service
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown action type '{0}'")]
    UnknownAction(String),
    #[error("unknown action status '{0}'")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Hunt,
    Motion,
    Print,
    HeadImage,
    LidImage,
    LidarImage,
    Settings,
}

/// Which worker runs an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Motion,
    Capture,
}

impl ActionType {
    pub const ALL: [ActionType; 7] = [
        ActionType::Hunt,
        ActionType::Motion,
        ActionType::Print,
        ActionType::HeadImage,
        ActionType::LidImage,
        ActionType::LidarImage,
        ActionType::Settings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionType::Hunt => "hunt",
            ActionType::Motion => "motion",
            ActionType::Print => "print",
            ActionType::HeadImage => "head_image",
            ActionType::LidImage => "lid_image",
            ActionType::LidarImage => "lidar_image",
            ActionType::Settings => "settings",
        }
    }

    /// `None` for actions handled synchronously.
    pub fn queue(self) -> Option<QueueKind> {
        match self {
            ActionType::Hunt | ActionType::Motion | ActionType::Print => Some(QueueKind::Motion),
            ActionType::HeadImage | ActionType::LidImage | ActionType::LidarImage => Some(QueueKind::Capture),
            ActionType::Settings => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionType {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|action| action.name() == s)
            .ok_or_else(|| RequestError::UnknownAction(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionStatus {
    Ready,
    Cancelled,
}

impl FromStr for ActionStatus {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready" => Ok(ActionStatus::Ready),
            "cancelled" => Ok(ActionStatus::Cancelled),
            other => Err(RequestError::UnknownStatus(other.to_string())),
        }
    }
}

/// Camera parameters sent with image requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Head camera illumination level
    #[serde(rename = "HCil", default)]
    pub illumination: i64,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl CameraSettings {
    pub fn illuminated(level: i64) -> Self {
        Self {
            illumination: level,
            other: Map::new(),
        }
    }

    pub fn laser_on(&self) -> bool {
        self.illumination > 0
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SettingsField {
    One(CameraSettings),
    Many(Vec<CameraSettings>),
}

#[derive(Debug, Deserialize)]
struct WireRequest {
    id: u64,
    action_type: String,
    status: String,
    #[serde(default)]
    motion_url: Option<String>,
    #[serde(default)]
    settings: Option<SettingsField>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionPayload {
    pub motion_url: Option<String>,
    pub settings: Vec<CameraSettings>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub id: u64,
    pub action_type: ActionType,
    pub status: ActionStatus,
    pub payload: ActionPayload,
}

impl ActionRequest {
    pub fn ready(id: u64, action_type: ActionType) -> Self {
        Self {
            id,
            action_type,
            status: ActionStatus::Ready,
            payload: ActionPayload::default(),
        }
    }

    pub fn cancel(id: u64, action_type: ActionType) -> Self {
        Self {
            status: ActionStatus::Cancelled,
            ..Self::ready(id, action_type)
        }
    }

    pub fn with_motion_url(mut self, url: impl Into<String>) -> Self {
        self.payload.motion_url = Some(url.into());
        self
    }

    pub fn with_settings(mut self, settings: Vec<CameraSettings>) -> Self {
        self.payload.settings = settings;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.status == ActionStatus::Ready
    }

    /// Parse one service message.
    pub fn from_json(line: &str) -> Result<Self, RequestError> {
        let wire: WireRequest = serde_json::from_str(line)?;
        let settings = match wire.settings {
            None => Vec::new(),
            Some(SettingsField::One(one)) => vec![one],
            Some(SettingsField::Many(many)) => many,
        };
        Ok(Self {
            id: wire.id,
            action_type: wire.action_type.parse()?,
            status: wire.status.parse()?,
            payload: ActionPayload {
                motion_url: wire.motion_url,
                settings,
            },
        })
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.action_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_motion_request() {
        let request =
            ActionRequest::from_json(r#"{"id":41,"action_type":"motion","status":"ready","motion_url":"file:///tmp/a.puls"}"#)
                .unwrap();
        assert_eq!(request.id, 41);
        assert_eq!(request.action_type, ActionType::Motion);
        assert!(request.is_ready());
        assert_eq!(request.payload.motion_url.as_deref(), Some("file:///tmp/a.puls"));
    }

    #[test]
    fn settings_may_be_object_or_list() {
        let one = ActionRequest::from_json(r#"{"id":1,"action_type":"head_image","status":"ready","settings":{"HCil":3}}"#)
            .unwrap();
        assert_eq!(one.payload.settings, vec![CameraSettings::illuminated(3)]);

        let many = ActionRequest::from_json(
            r#"{"id":2,"action_type":"lidar_image","status":"ready","settings":[{"HCil":1,"HCex":9},{"HCil":0}]}"#,
        )
        .unwrap();
        assert_eq!(many.payload.settings.len(), 2);
        assert!(many.payload.settings[0].laser_on());
        assert_eq!(many.payload.settings[0].other["HCex"], 9);
        assert!(!many.payload.settings[1].laser_on());
    }

    #[test]
    fn unknown_action_and_status_are_rejected() {
        let err = ActionRequest::from_json(r#"{"id":1,"action_type":"dance","status":"ready"}"#).unwrap_err();
        assert!(matches!(err, RequestError::UnknownAction(ref name) if name == "dance"));
        let err = ActionRequest::from_json(r#"{"id":1,"action_type":"hunt","status":"paused"}"#).unwrap_err();
        assert!(matches!(err, RequestError::UnknownStatus(_)));
        assert!(matches!(ActionRequest::from_json("{").unwrap_err(), RequestError::Json(_)));
    }

    #[test]
    fn queue_routing() {
        assert_eq!(ActionType::Print.queue(), Some(QueueKind::Motion));
        assert_eq!(ActionType::LidarImage.queue(), Some(QueueKind::Capture));
        assert_eq!(ActionType::Settings.queue(), None);
        for action in ActionType::ALL {
            assert_eq!(action.name().parse::<ActionType>().unwrap(), action);
        }
    }
}
