// src/core/events.rs

//! Defines the event bus through which clients, sessions, and servers report
//! connection lifecycle changes and received data to the owning application.

use crate::core::LinkError;
use tokio::sync::broadcast;
use tracing::debug;

/// The capacity of the broadcast channel behind an [`EventBus`].
/// Large enough that a burst of telemetry lines does not lag a slow listener.
const EVENT_BUS_CAPACITY: usize = 1024;

/// A lifecycle or data event observed on a link.
///
/// `peer` is always the remote address formatted as `"ip:port"`.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// An outbound connect succeeded, or a server accepted a new client.
    Connected { peer: String },
    /// A connection ended, whether by the peer, by an error, or by request.
    Disconnected { peer: String },
    /// A non-empty, whitespace-trimmed text payload arrived.
    DataReceived { peer: String, text: String },
    /// A classified failure. The link may or may not survive it; a
    /// `Disconnected` event follows whenever it does not.
    Error { peer: String, message: String },
    /// A server finished binding and is accepting connections.
    ServerStarted { addr: String },
    /// A server completed its shutdown sequence.
    ServerStopped,
}

impl LinkEvent {
    /// Builds an `Error` event from a classified failure.
    pub(crate) fn from_error(peer: &str, err: &LinkError) -> Self {
        LinkEvent::Error {
            peer: peer.to_string(),
            message: err.to_string(),
        }
    }
}

/// Fans events out to zero or more independent listeners.
///
/// This is plain message passing: subscribers are handed their own
/// `broadcast::Receiver` and drain it however they like. Publishing never
/// blocks and never fails; an event with no listeners is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LinkEvent>,
}

impl EventBus {
    /// Creates a new bus with the default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    pub fn publish(&self, event: LinkEvent) {
        if self.sender.send(event).is_err() {
            debug!("Published a link event with no active subscribers.");
        }
    }

    /// Provides a new receiver subscribed to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.sender.subscribe()
    }

    /// The number of currently attached listeners.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
