//! The push seam: fire-and-forget event delivery.
//!
//! The engine emits [`ServerEvent`]s *after* the state they describe is
//! persisted, and never reads a return value; delivery is the
//! transport's problem. Emits must not block: an implementation enqueues
//! and returns.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use nocturne_protocol::{PlayerId, RoomCode, ServerEvent};

/// Pushes events to subscribers. All methods are non-blocking.
pub trait Broadcaster: Send + Sync + 'static {
    /// Delivers to everyone subscribed to the room.
    fn emit_to_room(&self, room: &RoomCode, event: &ServerEvent);

    /// Delivers to the connection currently bound to this player:
    /// the only channel secret-bearing events may use.
    fn emit_to_connection(&self, player: PlayerId, event: &ServerEvent);

    /// Delivers to every connected client (lobby listings and the like).
    fn emit_global(&self, event: &ServerEvent);
}

/// Drops every event. For engines whose callers poll state instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn emit_to_room(&self, _room: &RoomCode, _event: &ServerEvent) {}
    fn emit_to_connection(&self, _player: PlayerId, _event: &ServerEvent) {}
    fn emit_global(&self, _event: &ServerEvent) {}
}

// ---------------------------------------------------------------------------
// LocalBroadcaster
// ---------------------------------------------------------------------------

/// In-process fan-out over unbounded channels.
///
/// The demo binary and the integration tests subscribe through this to
/// observe exactly what a real transport would push. Closed receivers are
/// pruned on the next emit to their scope.
#[derive(Default)]
pub struct LocalBroadcaster {
    rooms: Mutex<HashMap<RoomCode, Vec<UnboundedSender<ServerEvent>>>>,
    connections: Mutex<HashMap<PlayerId, Vec<UnboundedSender<ServerEvent>>>>,
    everyone: Mutex<Vec<UnboundedSender<ServerEvent>>>,
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a room's events.
    pub fn subscribe_room(
        &self,
        room: &RoomCode,
    ) -> UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.rooms
            .lock()
            .expect("broadcaster lock poisoned")
            .entry(room.clone())
            .or_default()
            .push(tx);
        rx
    }

    /// Subscribes to a single player's private events.
    pub fn subscribe_connection(
        &self,
        player: PlayerId,
    ) -> UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .lock()
            .expect("broadcaster lock poisoned")
            .entry(player)
            .or_default()
            .push(tx);
        rx
    }

    /// Subscribes to global events.
    pub fn subscribe_global(&self) -> UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.everyone
            .lock()
            .expect("broadcaster lock poisoned")
            .push(tx);
        rx
    }

    fn fan_out(
        senders: &mut Vec<UnboundedSender<ServerEvent>>,
        event: &ServerEvent,
    ) {
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Broadcaster for LocalBroadcaster {
    fn emit_to_room(&self, room: &RoomCode, event: &ServerEvent) {
        let mut rooms = self.rooms.lock().expect("broadcaster lock poisoned");
        if let Some(senders) = rooms.get_mut(room) {
            Self::fan_out(senders, event);
            if senders.is_empty() {
                rooms.remove(room);
            }
        }
    }

    fn emit_to_connection(&self, player: PlayerId, event: &ServerEvent) {
        let mut conns = self
            .connections
            .lock()
            .expect("broadcaster lock poisoned");
        if let Some(senders) = conns.get_mut(&player) {
            Self::fan_out(senders, event);
            if senders.is_empty() {
                conns.remove(&player);
            }
        }
    }

    fn emit_global(&self, event: &ServerEvent) {
        let mut everyone =
            self.everyone.lock().expect("broadcaster lock poisoned");
        Self::fan_out(&mut everyone, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> RoomCode {
        RoomCode("AB12CD".into())
    }

    #[tokio::test]
    async fn test_room_events_reach_all_room_subscribers() {
        let b = LocalBroadcaster::new();
        let mut rx1 = b.subscribe_room(&code());
        let mut rx2 = b.subscribe_room(&code());

        b.emit_to_room(&code(), &ServerEvent::RoomClosed);

        assert_eq!(rx1.try_recv().unwrap(), ServerEvent::RoomClosed);
        assert_eq!(rx2.try_recv().unwrap(), ServerEvent::RoomClosed);
    }

    #[tokio::test]
    async fn test_connection_events_stay_private() {
        let b = LocalBroadcaster::new();
        let mut room_rx = b.subscribe_room(&code());
        let mut conn_rx = b.subscribe_connection(PlayerId(1));

        b.emit_to_connection(
            PlayerId(1),
            &ServerEvent::YourRole {
                role: nocturne_protocol::Role::Mafia,
            },
        );

        assert!(conn_rx.try_recv().is_ok());
        assert!(room_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emit_to_unknown_scope_is_noop() {
        let b = LocalBroadcaster::new();
        // No subscribers anywhere, must not panic or block.
        b.emit_to_room(&code(), &ServerEvent::RoomClosed);
        b.emit_to_connection(PlayerId(7), &ServerEvent::RoomClosed);
        b.emit_global(&ServerEvent::RoomClosed);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let b = LocalBroadcaster::new();
        let rx = b.subscribe_room(&code());
        drop(rx);

        b.emit_to_room(&code(), &ServerEvent::RoomClosed);
        assert!(b.rooms.lock().unwrap().get(&code()).is_none());
    }
}
