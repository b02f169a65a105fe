//! Boundaries between the device core and the outside world: the event stream
//! reported to the service, and the download/upload transport.

pub mod events;
pub mod transport;

pub use events::{ChannelEventSink, DeviceEvent, EventContext, EventData, EventSink, RecordedEvent, RecordingSink};
pub use transport::{LocalTransport, Transport, TransportError};
