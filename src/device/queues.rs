// src/device/queues.rs - Motion and capture work queues
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::Services;
use super::action::{ActionRequest, QueueKind};
use super::dispatcher::Admission;
use super::runner;

/// Queued request ids, each with its revoked flag.
#[derive(Debug, Default)]
struct Pending {
    ids: Mutex<HashMap<u64, bool>>,
}

impl Pending {
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, bool>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of [`WorkQueues::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued(QueueKind),
    /// The id is already waiting in a queue; the redelivery was dropped.
    Duplicate,
}

/// Result of [`WorkQueues::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The request was still queued and will not run.
    Revoked,
    /// The request is running and will stop at its next checkpoint.
    Signalled,
    /// Nothing with that id is queued or running.
    NotFound,
}

struct Worker {
    kind: QueueKind,
    handle: JoinHandle<()>,
}

/// Sends the worker's kind on the done channel when the worker thread exits.
struct ExitSignal {
    kind: QueueKind,
    done: Sender<QueueKind>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.done.send(self.kind);
    }
}

pub struct WorkQueues {
    motion: Option<Sender<ActionRequest>>,
    capture: Option<Sender<ActionRequest>>,
    pending: Arc<Pending>,
    services: Arc<Services>,
    workers: Vec<Worker>,
    done: Receiver<QueueKind>,
}

impl WorkQueues {
    /// Spawn one worker thread per queue.
    pub fn start(services: Arc<Services>) -> std::io::Result<Self> {
        let pending = Arc::new(Pending::default());
        let (done_tx, done_rx) = unbounded();
        let (motion_tx, motion_rx) = unbounded();
        let (capture_tx, capture_rx) = unbounded();

        let workers = vec![
            spawn_worker(QueueKind::Motion, motion_rx, &services, &pending, done_tx.clone())?,
            spawn_worker(QueueKind::Capture, capture_rx, &services, &pending, done_tx)?,
        ];

        Ok(Self {
            motion: Some(motion_tx),
            capture: Some(capture_tx),
            pending,
            services,
            workers,
            done: done_rx,
        })
    }

    fn sender(&self, kind: QueueKind) -> Option<&Sender<ActionRequest>> {
        match kind {
            QueueKind::Motion => self.motion.as_ref(),
            QueueKind::Capture => self.capture.as_ref(),
        }
    }

    /// Queue a ready request for its worker. Returns the request back if it has no
    /// queue or the queue is closed.
    pub fn enqueue(&self, request: ActionRequest) -> Result<Enqueued, ActionRequest> {
        let Some(kind) = request.action_type.queue() else {
            return Err(request);
        };
        let Some(sender) = self.sender(kind) else {
            return Err(request);
        };
        let id = request.id;
        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            tracing::debug!("Ignoring duplicate delivery of queued {}", request);
            return Ok(Enqueued::Duplicate);
        }
        pending.insert(id, false);
        match sender.send(request) {
            Ok(()) => {
                tracing::debug!("Queued #{} on {:?} queue", id, kind);
                Ok(Enqueued::Queued(kind))
            }
            Err(e) => {
                pending.remove(&id);
                Err(e.into_inner())
            }
        }
    }

    /// Apply a cancellation: revoke the id if it is still queued, otherwise hand it
    /// to the dispatcher.
    pub fn cancel(&self, request: &ActionRequest) -> CancelOutcome {
        let mut pending = self.pending.lock();
        if let Some(revoked) = pending.get_mut(&request.id) {
            *revoked = true;
            tracing::info!("Revoking queued {}", request);
            return CancelOutcome::Revoked;
        }
        // Admission happens under the same lock, so a request is either still
        // queued here or already known to the dispatcher.
        match self.services.dispatcher.admit(request, self.services.events.as_ref()) {
            Admission::CancelRequested => CancelOutcome::Signalled,
            _ => CancelOutcome::NotFound,
        }
    }

    /// Number of requests queued but not yet picked up.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Close both queues and wait up to `timeout` for the workers to drain and exit.
    /// Returns `false` if a worker was still busy when the time ran out.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        self.motion = None;
        self.capture = None;
        let deadline = Instant::now() + timeout;
        let mut workers = std::mem::take(&mut self.workers);
        while !workers.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done.recv_timeout(remaining) {
                Ok(kind) => {
                    if let Some(index) = workers.iter().position(|w| w.kind == kind) {
                        let worker = workers.swap_remove(index);
                        if worker.handle.join().is_err() {
                            tracing::error!("{:?} worker panicked", kind);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    for worker in &workers {
                        tracing::warn!("{:?} worker did not stop within {:?}", worker.kind, timeout);
                    }
                    return false;
                }
            }
        }
        tracing::info!("Work queues stopped");
        true
    }
}

fn spawn_worker(
    kind: QueueKind,
    queue: Receiver<ActionRequest>,
    services: &Arc<Services>,
    pending: &Arc<Pending>,
    done: Sender<QueueKind>,
) -> std::io::Result<Worker> {
    let services = Arc::clone(services);
    let pending = Arc::clone(pending);
    let handle = thread::Builder::new()
        .name(format!("{:?}-queue", kind).to_lowercase())
        .spawn(move || {
            let _exit = ExitSignal { kind, done };
            tracing::debug!("{:?} worker started", kind);
            while let Ok(request) = queue.recv() {
                if catch_unwind(AssertUnwindSafe(|| run_next(&services, &pending, &request))).is_err() {
                    tracing::error!("{:?} worker recovered from a panic in {}", kind, request);
                }
            }
            tracing::debug!("{:?} worker exiting", kind);
        })?;
    Ok(Worker { kind, handle })
}

fn run_next(services: &Services, pending: &Pending, request: &ActionRequest) {
    let admission = {
        let mut ids = pending.lock();
        if ids.remove(&request.id) == Some(true) {
            drop(ids);
            runner::revoked(services, request);
            return;
        }
        services.dispatcher.admit(request, services.events.as_ref())
    };
    if let Admission::Admitted(permit) = admission {
        runner::execute(services, request, permit);
    }
}
