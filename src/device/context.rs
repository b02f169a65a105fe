// src/device/context.rs - What a handler sees while it runs
use std::ops::Range;
use thiserror::Error;

use super::Services;
use super::action::{ActionRequest, ActionType};
use super::dispatcher::ActionPermit;
use super::machine::{CapturedImage, Machine};
use super::registry::{ActionSpec, ProtocolEvent, Scope, spec};
use crate::communication::{EventData, Transport, TransportError};
use crate::pulse::PulseError;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action cancelled")]
    Cancelled,
    #[error("pulse data error: {0}")]
    Pulse(#[from] PulseError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request has no {0}")]
    MissingPayload(&'static str),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

pub struct ActionContext<'a> {
    services: &'a Services,
    request: &'a ActionRequest,
    spec: &'static ActionSpec,
    permit: Option<&'a ActionPermit<'a>>,
}

impl<'a> ActionContext<'a> {
    /// `permit` is `None` for actions that run outside the single-flight guard.
    pub fn new(services: &'a Services, request: &'a ActionRequest, permit: Option<&'a ActionPermit<'a>>) -> Self {
        Self {
            services,
            request,
            spec: spec(request.action_type),
            permit,
        }
    }

    pub fn services(&self) -> &'a Services {
        self.services
    }

    pub fn request(&self) -> &'a ActionRequest {
        self.request
    }

    pub fn spec(&self) -> &'static ActionSpec {
        self.spec
    }

    pub fn id(&self) -> u64 {
        self.request.id
    }

    pub fn action_type(&self) -> ActionType {
        self.request.action_type
    }

    pub fn machine(&self) -> &'a dyn Machine {
        self.services.machine.as_ref()
    }

    pub fn transport(&self) -> &'a dyn Transport {
        self.services.transport.as_ref()
    }

    pub fn motion_url(&self) -> Result<&'a str, ActionError> {
        self.request
            .payload
            .motion_url
            .as_deref()
            .ok_or(ActionError::MissingPayload("motion_url"))
    }

    /// Emit `<action>:<suffix>` for this request.
    pub fn emit(&self, suffix: &str, data: Option<EventData>) {
        let name = format!("{}:{}", self.action_type(), suffix);
        self.services.events.emit(Some(self.id()), &name, data);
    }

    pub fn emit_event(&self, event: &ProtocolEvent) {
        let data = event.log.map(|log| {
            let url = self.request.payload.motion_url.as_deref().unwrap_or_default();
            EventData::log(log.replace("{url}", url))
        });
        let action_id = match event.scope {
            Scope::Action => Some(self.id()),
            Scope::Machine => None,
        };
        self.services.events.emit(action_id, &event.event_name(self.action_type()), data);
    }

    pub fn is_cancelled(&self) -> bool {
        self.permit.is_some_and(|permit| permit.is_cancelled())
    }

    pub fn checkpoint(&self) -> Result<(), ActionError> {
        if self.is_cancelled() {
            tracing::info!("{} cancelled at checkpoint", self.request);
            return Err(ActionError::Cancelled);
        }
        Ok(())
    }

    /// Emit the events of `phase`, then check for cancellation.
    pub fn step(&self, phase: usize) -> Result<(), ActionError> {
        if let Some(events) = self.spec.phases.get(phase) {
            for event in events.iter() {
                self.emit_event(event);
            }
        }
        self.checkpoint()
    }

    pub fn steps(&self, phases: Range<usize>) -> Result<(), ActionError> {
        for phase in phases {
            self.step(phase)?;
        }
        Ok(())
    }

    pub fn upload(&self, image: &CapturedImage) -> Result<(), ActionError> {
        self.transport()
            .upload_image(self.id(), self.action_type().name(), &image.file_name, &image.bytes)?;
        Ok(())
    }
}
