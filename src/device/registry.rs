// src/device/registry.rs - Action table: handler and protocol events per action
use super::action::{ActionType, CameraSettings};
use super::context::{ActionContext, ActionError};
use crate::communication::EventData;

/// Whether an event is reported against the action or against the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Emitted as `<action>:<name>` with the request id
    Action,
    /// Emitted verbatim, without an action id
    Machine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolEvent {
    pub scope: Scope,
    pub name: &'static str,
    /// `log` text attached to the event. `{url}` expands to the request's motion URL.
    pub log: Option<&'static str>,
}

impl ProtocolEvent {
    pub const fn action(name: &'static str) -> Self {
        Self {
            scope: Scope::Action,
            name,
            log: None,
        }
    }

    pub const fn machine(name: &'static str) -> Self {
        Self {
            scope: Scope::Machine,
            name,
            log: None,
        }
    }

    pub const fn with_log(self, log: &'static str) -> Self {
        Self { log: Some(log), ..self }
    }

    pub fn event_name(&self, action: ActionType) -> String {
        match self.scope {
            Scope::Action => format!("{}:{}", action, self.name),
            Scope::Machine => self.name.to_string(),
        }
    }
}

/// A handler runs the action's phases in order. `Ok(data)` attaches `data` to the
/// `<action>:completed` event.
pub type Handler = fn(&ActionContext<'_>) -> Result<Option<EventData>, ActionError>;

pub struct ActionSpec {
    pub action: ActionType,
    /// Event groups, each followed by a cancellation checkpoint
    pub phases: &'static [&'static [ProtocolEvent]],
    /// Emitted after the terminal event on every exit path
    pub epilogue: &'static [ProtocolEvent],
    pub handler: Handler,
}

impl std::fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSpec")
            .field("action", &self.action)
            .field("phases", &self.phases.len())
            .finish_non_exhaustive()
    }
}

const fn act(name: &'static str) -> ProtocolEvent {
    ProtocolEvent::action(name)
}

const fn machine(name: &'static str) -> ProtocolEvent {
    ProtocolEvent::machine(name)
}

const RECEIVED: ProtocolEvent = act("received").with_log("state=ready");
const ESTOP_ON: ProtocolEvent = machine("estop:activated").with_log("ESTOP activated");
const ESTOP_OFF: ProtocolEvent = machine("estop:deactivated").with_log("ESTOP deactivated");
const DOWNLOAD_STARTING: ProtocolEvent = act("download:starting").with_log("downloading pulse data from {url}");

const RUN_UP: [ProtocolEvent; 7] = [
    act("idle:succeeded"),
    act("warmup:starting"),
    act("warmup:succeeded"),
    act("starting:starting"),
    act("running"),
    act("starting:succeeded"),
    act("running:starting"),
];

const MOTION_EPILOGUE: &[ProtocolEvent] = &[
    act("reset"),
    machine(":resting:succeeded"),
    machine(":idle:starting"),
    ESTOP_ON,
];

static HUNT: ActionSpec = ActionSpec {
    action: ActionType::Hunt,
    phases: &[
        &[RECEIVED, act("starting")],
        &[
            act("homing:completed"),
            ESTOP_OFF,
            RUN_UP[0],
            RUN_UP[1],
            RUN_UP[2],
            RUN_UP[3],
            RUN_UP[4],
            RUN_UP[5],
            RUN_UP[6],
        ],
        &[act("running:succeeded"), act("finished:starting")],
        &[act("finished:succeeded"), act("resting:starting")],
    ],
    epilogue: MOTION_EPILOGUE,
    handler: run_hunt,
};

static MOTION: ActionSpec = ActionSpec {
    action: ActionType::Motion,
    phases: &[
        &[RECEIVED, act("starting"), DOWNLOAD_STARTING],
        &[
            act("download:completed"),
            ESTOP_OFF,
            RUN_UP[0],
            RUN_UP[1],
            RUN_UP[2],
            RUN_UP[3],
            RUN_UP[4],
            RUN_UP[5],
            RUN_UP[6],
        ],
        &[act("running:succeeded"), act("finished:starting")],
        &[act("finished:succeeded"), act("resting:starting")],
    ],
    epilogue: MOTION_EPILOGUE,
    handler: run_motion,
};

static PRINT: ActionSpec = ActionSpec {
    action: ActionType::Print,
    phases: &[
        &[RECEIVED, act("starting"), DOWNLOAD_STARTING],
        &[act("download:completed"), act("waiting").with_log("waiting for button press")],
        &[
            machine("button:pressed").with_log("button pressed"),
            RUN_UP[0],
            RUN_UP[1],
            RUN_UP[2],
            RUN_UP[3],
            RUN_UP[4],
            RUN_UP[5],
            RUN_UP[6],
        ],
        &[ESTOP_OFF],
        &[machine("button:released").with_log("button released"), act("running:succeeded")],
        &[act("finished:starting"), act("finished:succeeded"), act("return_to_home:starting")],
        &[act("return_to_home:succeeded"), act("resting:starting")],
        &[act("resting")],
        &[ESTOP_ON],
    ],
    epilogue: &[act("reset"), machine(":resting:succeeded"), machine(":idle:starting")],
    handler: run_print,
};

const LID_CAPTURE_PHASES: &[&[ProtocolEvent]] = &[
    &[RECEIVED, act("starting"), act("capture:starting")],
    &[act("capture:completed").with_log("capture time: 1.47755"), act("upload:starting")],
    &[act("upload:completed")],
];

// The head camera is slower than the lid camera.
const HEAD_CAPTURE_PHASES: &[&[ProtocolEvent]] = &[
    &[RECEIVED, act("starting"), act("capture:starting")],
    &[act("capture:completed").with_log("capture time: 2.514"), act("upload:starting")],
    &[act("upload:completed")],
];

static HEAD_IMAGE: ActionSpec = ActionSpec {
    action: ActionType::HeadImage,
    phases: HEAD_CAPTURE_PHASES,
    epilogue: &[act("reset")],
    handler: run_head_image,
};

static LID_IMAGE: ActionSpec = ActionSpec {
    action: ActionType::LidImage,
    phases: LID_CAPTURE_PHASES,
    epilogue: &[act("reset")],
    handler: run_lid_image,
};

static LIDAR_IMAGE: ActionSpec = ActionSpec {
    action: ActionType::LidarImage,
    phases: HEAD_CAPTURE_PHASES,
    epilogue: &[act("reset")],
    handler: run_lidar_image,
};

static SETTINGS: ActionSpec = ActionSpec {
    action: ActionType::Settings,
    phases: &[&[RECEIVED, act("starting")]],
    epilogue: &[act("reset")],
    handler: run_settings,
};

/// Look up the table entry for `action`.
pub fn spec(action: ActionType) -> &'static ActionSpec {
    match action {
        ActionType::Hunt => &HUNT,
        ActionType::Motion => &MOTION,
        ActionType::Print => &PRINT,
        ActionType::HeadImage => &HEAD_IMAGE,
        ActionType::LidImage => &LID_IMAGE,
        ActionType::LidarImage => &LIDAR_IMAGE,
        ActionType::Settings => &SETTINGS,
    }
}

fn run_hunt(ctx: &ActionContext<'_>) -> Result<Option<EventData>, ActionError> {
    ctx.step(0)?;
    if ctx.request().payload.motion_url.is_some() {
        ctx.machine().download_motion(ctx)?;
    }
    ctx.steps(1..4)?;
    Ok(None)
}

fn run_motion(ctx: &ActionContext<'_>) -> Result<Option<EventData>, ActionError> {
    ctx.step(0)?;
    ctx.machine().download_motion(ctx)?;
    ctx.steps(1..4)?;
    Ok(None)
}

fn run_print(ctx: &ActionContext<'_>) -> Result<Option<EventData>, ActionError> {
    ctx.step(0)?;
    ctx.machine().download_motion(ctx)?;
    ctx.step(1)?;
    ctx.machine().wait_for_button(ctx)?;
    ctx.steps(2..9)?;
    Ok(None)
}

fn run_head_image(ctx: &ActionContext<'_>) -> Result<Option<EventData>, ActionError> {
    ctx.step(0)?;
    let image = ctx.machine().capture_head(ctx, ctx.request().payload.settings.first())?;
    ctx.step(1)?;
    ctx.upload(&image)?;
    ctx.step(2)?;
    Ok(None)
}

fn run_lid_image(ctx: &ActionContext<'_>) -> Result<Option<EventData>, ActionError> {
    ctx.step(0)?;
    let image = ctx.machine().capture_lid(ctx)?;
    ctx.step(1)?;
    ctx.upload(&image)?;
    ctx.step(2)?;
    Ok(None)
}

fn run_lidar_image(ctx: &ActionContext<'_>) -> Result<Option<EventData>, ActionError> {
    ctx.step(0)?;
    let requested = &ctx.request().payload.settings;
    let fallback = [CameraSettings::illuminated(1), CameraSettings::illuminated(0)];
    let settings = if requested.is_empty() { &fallback[..] } else { &requested[..] };
    let mut images = Vec::with_capacity(settings.len());
    for camera in settings {
        images.push(ctx.machine().capture_head(ctx, Some(camera))?);
    }
    ctx.step(1)?;
    for image in &images {
        ctx.upload(image)?;
    }
    ctx.step(2)?;
    Ok(None)
}

fn run_settings(ctx: &ActionContext<'_>) -> Result<Option<EventData>, ActionError> {
    ctx.step(0)?;
    Ok(Some(ctx.services().settings.report(ctx.id())))
}
