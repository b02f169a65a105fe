// src/device/runner.rs - Runs one action from admission to its terminal event
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::Services;
use super::action::ActionRequest;
use super::context::{ActionContext, ActionError};
use super::dispatcher::{ActionPermit, Admission};
use crate::communication::EventData;

/// Admit `request` and, if the guard allows it, run it to completion.
pub fn dispatch(services: &Services, request: &ActionRequest) {
    if let Admission::Admitted(permit) = services.dispatcher.admit(request, services.events.as_ref()) {
        execute(services, request, permit);
    }
}

/// Run an admitted action. The guard is released when `permit` drops at the end.
pub fn execute(services: &Services, request: &ActionRequest, permit: ActionPermit<'_>) {
    let ctx = ActionContext::new(services, request, Some(&permit));
    finish(&ctx, run_handler(&ctx));
    services.machine.action_finished(request.action_type);
}

/// Run an action outside the single-flight guard. Used for the settings report.
pub fn execute_unguarded(services: &Services, request: &ActionRequest) {
    let ctx = ActionContext::new(services, request, None);
    finish(&ctx, run_handler(&ctx));
}

/// Terminal event for a request that was cancelled before it started.
pub fn revoked(services: &Services, request: &ActionRequest) {
    tracing::info!("{} revoked before it started", request);
    services
        .events
        .emit(Some(request.id), &format!("{}:cancelled", request.action_type), None);
}

fn run_handler(ctx: &ActionContext<'_>) -> Result<Option<EventData>, ActionError> {
    let handler = ctx.spec().handler;
    catch_unwind(AssertUnwindSafe(|| handler(ctx)))
        .unwrap_or_else(|payload| Err(ActionError::Panicked(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn finish(ctx: &ActionContext<'_>, result: Result<Option<EventData>, ActionError>) {
    match result {
        Ok(data) => {
            tracing::info!("{} completed", ctx.request());
            ctx.emit("completed", data);
        }
        Err(ActionError::Cancelled) => {
            tracing::info!("{} cancelled", ctx.request());
            ctx.emit("cancelled", None);
        }
        Err(e) => {
            tracing::error!("{} failed: {}", ctx.request(), e);
            ctx.emit("cancelled", Some(EventData::log(e.to_string())));
        }
    }
    for event in ctx.spec().epilogue {
        ctx.emit_event(event);
    }
}
