//! Typed Event Channels
//!
//! Collaborators (UI overlays, voice announcers) subscribe through explicit
//! channels instead of registering raw callbacks, so the engine never stores
//! foreign function pointers and a slow subscriber cannot stall a session
//! tick.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;

/// Buffered capacity handed to position subscribers.
///
/// Position events arrive at tick cadence; a subscriber that falls behind
/// loses frames rather than blocking the session thread.
const POSITION_BUFFER: usize = 256;

/// Session status, emitted on every state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    /// Whether a compensation session is running
    pub active: bool,

    /// Currently assigned weapon (pattern id), if any
    pub current_weapon: Option<String>,

    /// Whether a manual start would currently be accepted
    pub manual_activation_allowed: bool,
}

/// Running compensation offset for live visualization.
///
/// Reset to `(0, 0)` at the end of every played sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionEvent {
    /// Accumulated emitted x offset since sequence start
    pub offset_x: f64,
    /// Accumulated emitted y offset since sequence start
    pub offset_y: f64,
}

impl PositionEvent {
    /// Origin event, emitted when a sequence starts or ends
    pub fn origin() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

/// Multi-subscriber broadcast over crossbeam channels.
///
/// Disconnected subscribers are pruned on the next broadcast; full bounded
/// subscribers are skipped, never waited on.
#[derive(Debug)]
pub(crate) struct Broadcast<T: Clone> {
    senders: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> Broadcast<T> {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    pub(crate) fn subscribe_bounded(&self, capacity: usize) -> Receiver<T> {
        let (tx, rx) = bounded(capacity);
        self.senders.lock().push(tx);
        rx
    }

    pub(crate) fn broadcast(&self, event: T) {
        self.senders.lock().retain(|tx| {
            !matches!(tx.try_send(event.clone()), Err(TrySendError::Disconnected(_)))
        });
    }
}

/// Event fan-out for status and position subscribers
#[derive(Debug)]
pub struct EventBus {
    status: Broadcast<StatusEvent>,
    position: Broadcast<PositionEvent>,
}

impl EventBus {
    /// Bus with no subscribers
    pub fn new() -> Self {
        Self {
            status: Broadcast::new(),
            position: Broadcast::new(),
        }
    }

    /// Subscribe to status transitions
    pub fn subscribe_status(&self) -> Receiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Subscribe to position updates (lossy under backpressure)
    pub fn subscribe_position(&self) -> Receiver<PositionEvent> {
        self.position.subscribe_bounded(POSITION_BUFFER)
    }

    pub(crate) fn emit_status(&self, event: StatusEvent) {
        self.status.broadcast(event);
    }

    pub(crate) fn emit_position(&self, event: PositionEvent) {
        self.position.broadcast(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(active: bool) -> StatusEvent {
        StatusEvent {
            active,
            current_weapon: None,
            manual_activation_allowed: true,
        }
    }

    #[test]
    fn all_subscribers_receive_status() {
        let bus = EventBus::new();
        let a = bus.subscribe_status();
        let b = bus.subscribe_status();

        bus.emit_status(status(true));

        assert_eq!(a.try_recv().unwrap().active, true);
        assert_eq!(b.try_recv().unwrap().active, true);
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let a = bus.subscribe_status();
        drop(bus.subscribe_status());

        bus.emit_status(status(true));
        bus.emit_status(status(false));

        assert_eq!(a.iter().take(2).count(), 2);
    }

    #[test]
    fn slow_position_subscriber_drops_frames_without_blocking() {
        let bus = EventBus::new();
        let rx = bus.subscribe_position();

        for i in 0..(POSITION_BUFFER + 50) {
            bus.emit_position(PositionEvent {
                offset_x: i as f64,
                offset_y: 0.0,
            });
        }

        // Buffer holds the first POSITION_BUFFER events; the rest were shed.
        assert_eq!(rx.try_iter().count(), POSITION_BUFFER);
    }
}
