//! # Device core
//!
//! Requests arrive through [`Device::submit`]. Settings reports run immediately on
//! the caller's thread; every other ready request goes to the motion or capture
//! [`WorkQueues`](queues::WorkQueues), whose workers present it to the single-flight
//! [`ActionDispatcher`] and, once admitted, run its handler from the
//! [`registry`]. Cancellations revoke a queued request or flag the running one.

pub mod action;
pub mod context;
pub mod dispatcher;
pub mod emulator;
pub mod machine;
pub mod queues;
pub mod registry;
pub mod runner;
pub mod settings;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use action::{ActionPayload, ActionRequest, ActionStatus, ActionType, CameraSettings, QueueKind, RequestError};
pub use context::{ActionContext, ActionError};
pub use dispatcher::{ActionDispatcher, ActionPermit, Admission, RunningAction};
pub use emulator::Emulator;
pub use machine::{CapturedImage, Machine};
pub use queues::{CancelOutcome, Enqueued, WorkQueues};
pub use registry::{ActionSpec, ProtocolEvent, Scope};
pub use settings::SettingsReport;

use crate::communication::{EventSink, LocalTransport, Transport};
use crate::config::EmulatorConfig;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to start worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Everything a handler can reach, shared by the request loop and both workers.
pub struct Services {
    pub dispatcher: ActionDispatcher,
    pub events: Arc<dyn EventSink>,
    pub transport: Arc<dyn Transport>,
    pub machine: Arc<dyn Machine>,
    pub settings: SettingsReport,
}

impl Services {
    pub fn new(
        events: Arc<dyn EventSink>,
        transport: Arc<dyn Transport>,
        machine: Arc<dyn Machine>,
        settings: SettingsReport,
    ) -> Self {
        Self {
            dispatcher: ActionDispatcher::new(),
            events,
            transport,
            machine,
            settings,
        }
    }

    /// Emulator, local transport and settings report built from `config`.
    pub fn emulated(config: &EmulatorConfig, events: Arc<dyn EventSink>) -> Self {
        Self::new(
            events,
            Arc::new(LocalTransport::new(&config.emulator.upload_dir)),
            Arc::new(Emulator::new(config)),
            SettingsReport::new(config.machine.clone(), config.emulator.bypass_homing),
        )
    }
}

/// What [`Device::submit`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Queued(QueueKind),
    /// Same id as a request still waiting in a queue
    Duplicate,
    /// Settings report sent synchronously
    Reported,
    Revoked,
    CancelSignalled,
    /// A cancellation with nothing to cancel
    Ignored,
    /// The queue was closed; `<type>:cancelled` was emitted
    Dropped,
}

pub struct Device {
    services: Arc<Services>,
    queues: WorkQueues,
}

impl Device {
    pub fn start(services: Services) -> Result<Self, DeviceError> {
        let services = Arc::new(services);
        let queues = WorkQueues::start(Arc::clone(&services))?;
        tracing::info!("Device started");
        Ok(Self { services, queues })
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn submit(&self, request: ActionRequest) -> Submitted {
        tracing::info!("Service action request: {} ({:?})", request, request.status);
        match request.status {
            ActionStatus::Cancelled => match self.queues.cancel(&request) {
                CancelOutcome::Revoked => Submitted::Revoked,
                CancelOutcome::Signalled => Submitted::CancelSignalled,
                CancelOutcome::NotFound => Submitted::Ignored,
            },
            ActionStatus::Ready if request.action_type == ActionType::Settings => {
                self.run_settings_report(&request);
                Submitted::Reported
            }
            ActionStatus::Ready => match self.queues.enqueue(request) {
                Ok(Enqueued::Queued(kind)) => Submitted::Queued(kind),
                Ok(Enqueued::Duplicate) => Submitted::Duplicate,
                Err(request) => {
                    tracing::error!("Queue closed, dropping {}", request);
                    runner::revoked(&self.services, &request);
                    Submitted::Dropped
                }
            },
        }
    }

    /// Parse and submit one service message.
    pub fn submit_json(&self, line: &str) -> Result<Submitted, RequestError> {
        let request = ActionRequest::from_json(line)?;
        Ok(self.submit(request))
    }

    /// Synchronous settings report; never queued and never cancelled.
    pub fn run_settings_report(&self, request: &ActionRequest) {
        runner::execute_unguarded(&self.services, request);
    }

    pub fn pending(&self) -> usize {
        self.queues.pending()
    }

    pub fn is_idle(&self) -> bool {
        self.queues.pending() == 0 && self.services.dispatcher.is_idle()
    }

    /// Stop accepting work and wait up to `timeout` for queued actions to finish.
    pub fn shutdown(self, timeout: Duration) -> bool {
        tracing::info!("Shutting down device");
        self.queues.shutdown(timeout)
    }
}
