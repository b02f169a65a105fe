// src/device/dispatcher.rs - Single-flight guard and cancellation state machine
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::action::{ActionRequest, ActionStatus, ActionType};
use crate::communication::EventSink;

/// The one action currently allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningAction {
    pub id: u64,
    pub action_type: ActionType,
    pub cancelled: bool,
}

/// Outcome of presenting a request to the dispatcher.
#[derive(Debug)]
pub enum Admission<'a> {
    /// The request may run; the guard is held until the permit drops.
    Admitted(ActionPermit<'a>),
    /// Another action is running. `<type>:cancelled` was emitted for this request.
    Rejected { running: RunningAction },
    /// The same id is already running.
    Duplicate,
    /// The running action was flagged as cancelled.
    CancelRequested,
    /// A cancellation for an id that is not running. Nothing changed.
    Ignored,
}

impl Admission<'_> {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

#[derive(Debug, Default)]
pub struct ActionDispatcher {
    running: Mutex<Option<RunningAction>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored: the guard has to stay usable after any panic.
    fn state(&self) -> MutexGuard<'_, Option<RunningAction>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn running(&self) -> Option<RunningAction> {
        *self.state()
    }

    pub fn is_idle(&self) -> bool {
        self.state().is_none()
    }

    pub fn is_cancelled(&self, id: u64) -> bool {
        matches!(*self.state(), Some(running) if running.id == id && running.cancelled)
    }

    /// Apply `request` to the guard.
    pub fn admit<'a>(&'a self, request: &ActionRequest, events: &dyn EventSink) -> Admission<'a> {
        let admission = {
            let mut state = self.state();
            match (*state, request.status) {
                (None, ActionStatus::Ready) => {
                    *state = Some(RunningAction {
                        id: request.id,
                        action_type: request.action_type,
                        cancelled: false,
                    });
                    Admission::Admitted(ActionPermit {
                        dispatcher: self,
                        id: request.id,
                        action_type: request.action_type,
                    })
                }
                (Some(running), ActionStatus::Ready) if running.id == request.id => Admission::Duplicate,
                (Some(running), ActionStatus::Ready) => Admission::Rejected { running },
                (Some(running), ActionStatus::Cancelled) if running.id == request.id => {
                    if let Some(running) = state.as_mut() {
                        running.cancelled = true;
                    }
                    Admission::CancelRequested
                }
                (_, ActionStatus::Cancelled) => Admission::Ignored,
            }
        };

        match &admission {
            Admission::Admitted(_) => tracing::info!("Admitted {}", request),
            Admission::Rejected { running } => {
                tracing::warn!("Rejected {}: {} #{} is running", request, running.action_type, running.id);
                events.emit(Some(request.id), &format!("{}:cancelled", request.action_type), None);
            }
            Admission::Duplicate => tracing::debug!("Ignoring duplicate delivery of {}", request),
            Admission::CancelRequested => tracing::info!("Cancellation requested for {}", request),
            Admission::Ignored => tracing::debug!("Nothing to cancel for {}", request),
        }
        admission
    }

    fn release(&self, id: u64) {
        let mut state = self.state();
        if matches!(*state, Some(running) if running.id == id) {
            *state = None;
        }
    }
}

/// Scoped ownership of the guard. Dropping it returns the dispatcher to idle,
/// whichever way the handler exits.
#[derive(Debug)]
pub struct ActionPermit<'a> {
    dispatcher: &'a ActionDispatcher,
    id: u64,
    action_type: ActionType,
}

impl ActionPermit<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    pub fn is_cancelled(&self) -> bool {
        self.dispatcher.is_cancelled(self.id)
    }
}

impl Drop for ActionPermit<'_> {
    fn drop(&mut self) {
        self.dispatcher.release(self.id);
        tracing::debug!("Released {} #{}", self.action_type, self.id);
    }
}
