//! Typed change notifications for observers of the console.
//!
//! Every state change that a UI would need to redraw for is published on an
//! [`EventHub`]. Observers subscribe and receive a
//! [`tokio::sync::broadcast::Receiver`]; an observer that falls behind by more
//! than the hub's capacity sees `RecvError::Lagged` and should re-read state
//! from the console rather than rely on the missed events.
//!
//! Events are emitted only after the mutation they describe is committed, so
//! an observer that reacts by querying the console sees the new state.

use gm_core::LogEntry;
use tokio::sync::broadcast;

/// Capacity used when the configuration does not set one.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    /// A listener or session was added or removed, or a session's metadata
    /// (device/platform) changed.
    RegistryChanged,
    /// A client sent a `LOG` line; the entry is already in the log buffer.
    LogReceived(LogEntry),
    /// The command tree of the given session was replaced.
    ClientDataChanged { session_id: String },
    /// The listener on `port` failed for good and was removed; its session,
    /// if any, was closed. A `RegistryChanged` follows.
    PortUnavailable { port: u16 },
}

/// Fan-out point for [`ConsoleEvent`]s.
///
/// Cloning the hub is cheap and every clone publishes to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<ConsoleEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: ConsoleEvent) {
        tracing::trace!(?event, "emit");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
