// src/communication/events.rs - Protocol event envelope and sinks
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// First envelope id handed out by a fresh [`EventContext`].
pub const FIRST_EVENT_ID: u64 = 32;

/// Offset added to the elapsed centiseconds in every timestamp.
pub const TIMESTAMP_OFFSET: u64 = 3800;

/// Optional `key: value` pair merged into the event envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    pub key: String,
    pub value: Value,
}

impl EventData {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::new("log", message.into())
    }
}

/// Receiver of protocol events. Called from worker threads and the request loop.
pub trait EventSink: Send + Sync {
    fn emit(&self, action_id: Option<u64>, event: &str, data: Option<EventData>);
}

/// Envelope counters: the running event id and the session start time.
#[derive(Debug)]
pub struct EventContext {
    next_id: AtomicU64,
    started: Instant,
}

impl Default for EventContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EventContext {
    pub fn new() -> Self {
        Self::starting_at(FIRST_EVENT_ID)
    }

    pub fn starting_at(first_id: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first_id),
            started: Instant::now(),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn timestamp(&self) -> u64 {
        self.started.elapsed().as_millis() as u64 / 10 + TIMESTAMP_OFFSET
    }

    pub fn envelope(&self, action_id: Option<u64>, event: &str, data: Option<EventData>) -> DeviceEvent {
        let mut extra = Map::new();
        if let Some(data) = data {
            extra.insert(data.key, data.value);
        }
        DeviceEvent {
            id: self.next_id(),
            timestamp: self.timestamp(),
            kind: "event",
            version: 1,
            action_id,
            level: "INFO",
            event: event.to_string(),
            extra,
        }
    }
}

/// One serialized protocol event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEvent {
    pub id: u64,
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<u64>,
    pub level: &'static str,
    pub event: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceEvent {
    pub fn to_line(&self) -> String {
        // A struct of strings, integers and JSON values always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Forwards serialized events to an async writer task.
///
/// Ids are assigned and sent under one lock, so the receiver sees them in order
/// even when several workers emit at once.
pub struct ChannelEventSink {
    context: EventContext,
    sender: Mutex<UnboundedSender<String>>,
}

impl ChannelEventSink {
    pub fn new(context: EventContext) -> (Self, UnboundedReceiver<String>) {
        let (sender, receiver) = unbounded_channel();
        let sink = Self {
            context,
            sender: Mutex::new(sender),
        };
        (sink, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, action_id: Option<u64>, event: &str, data: Option<EventData>) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let line = self.context.envelope(action_id, event, data).to_line();
        tracing::debug!("event: {}", line);
        if sender.send(line).is_err() {
            tracing::warn!("Event stream closed, dropping '{}'", event);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub action_id: Option<u64>,
    pub event: String,
    pub data: Option<EventData>,
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event).collect()
    }

    /// Event names reported against `action_id`, in order.
    pub fn names_for(&self, action_id: u64) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.action_id == Some(action_id))
            .map(|e| e.event)
            .collect()
    }

    pub fn find(&self, event: &str) -> Option<RecordedEvent> {
        self.events().into_iter().find(|e| e.event == event)
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, action_id: Option<u64>, event: &str, data: Option<EventData>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent {
                action_id,
                event: event.to_string(),
                data,
            });
    }
}
