//! Delivery fan-out: bounded per-connection queues and audience
//! selection.
//!
//! Each connection owns an mpsc queue; the transport layer drains the
//! receiving half and writes frames to the socket. Delivery is
//! best-effort: a full or closed queue drops the event with a warning
//! rather than blocking the pipeline on one slow client.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use hirelink_shared::{constants::OUTBOUND_QUEUE_CAPACITY, ConnectionId, RoomId, UserId};

use crate::events::ServerEvent;
use crate::occupancy::RoomTracker;

struct ClientHandle {
    user: UserId,
    tx: mpsc::Sender<ServerEvent>,
}

/// All live client connections and their outbound queues.
#[derive(Default)]
pub struct ClientRegistry {
    senders: Mutex<HashMap<ConnectionId, ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the connection's outbound queue. The caller moves the
    /// receiver into its socket-writer task.
    pub async fn register(&self, conn: ConnectionId, user: UserId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        self.senders
            .lock()
            .await
            .insert(conn, ClientHandle { user, tx });
        rx
    }

    pub async fn unregister(&self, conn: ConnectionId) {
        self.senders.lock().await.remove(&conn);
    }

    pub async fn send_to(&self, conn: ConnectionId, event: ServerEvent) {
        let senders = self.senders.lock().await;
        if let Some(handle) = senders.get(&conn) {
            Self::try_deliver(conn, handle, event);
        }
    }

    async fn send_to_many(&self, conns: &[ConnectionId], event: &ServerEvent) {
        let senders = self.senders.lock().await;
        for conn in conns {
            if let Some(handle) = senders.get(conn) {
                Self::try_deliver(*conn, handle, event.clone());
            }
        }
    }

    async fn send_filtered<F>(&self, event: &ServerEvent, keep: F)
    where
        F: Fn(ConnectionId, UserId) -> bool,
    {
        let senders = self.senders.lock().await;
        for (conn, handle) in senders.iter() {
            if keep(*conn, handle.user) {
                Self::try_deliver(*conn, handle, event.clone());
            }
        }
    }

    fn try_deliver(conn: ConnectionId, handle: &ClientHandle, event: ServerEvent) {
        if let Err(err) = handle.tx.try_send(event) {
            match err {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(%conn, "outbound queue full, dropping event");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    warn!(%conn, "outbound queue closed, dropping event");
                }
            }
        }
    }
}

/// Audience selection over the registry and room occupancy.
pub struct Fanout {
    registry: Arc<ClientRegistry>,
    rooms: Arc<RoomTracker>,
}

impl Fanout {
    pub fn new(registry: Arc<ClientRegistry>, rooms: Arc<RoomTracker>) -> Self {
        Self { registry, rooms }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Deliver to every connection currently inside the room.
    pub async fn broadcast_to_room(&self, room: RoomId, event: ServerEvent) {
        let conns = self.rooms.connections(room).await;
        self.registry.send_to_many(&conns, &event).await;
    }

    /// Deliver to room occupants other than `except`. Used for typing
    /// indicators, which never echo back to their author.
    pub async fn broadcast_to_room_except(
        &self,
        room: RoomId,
        except: UserId,
        event: ServerEvent,
    ) {
        let conns = self.rooms.connections(room).await;
        let senders = self.registry.senders.lock().await;
        for conn in conns {
            if let Some(handle) = senders.get(&conn) {
                if handle.user != except {
                    ClientRegistry::try_deliver(conn, handle, event.clone());
                }
            }
        }
    }

    /// Deliver to every connected client that is *not* inside the room
    /// and does not belong to `sender` — the unread-badge audience.
    pub async fn notify_absent(&self, room: RoomId, sender: UserId, event: ServerEvent) {
        let in_room: std::collections::HashSet<ConnectionId> =
            self.rooms.connections(room).await.into_iter().collect();
        self.registry
            .send_filtered(&event, |conn, user| {
                !in_room.contains(&conn) && user != sender
            })
            .await;
    }

    /// Deliver to one specific connection.
    pub async fn send_to(&self, conn: ConnectionId, event: ServerEvent) {
        self.registry.send_to(conn, event).await;
    }

    /// Deliver to every connected client.
    pub async fn broadcast_all(&self, event: ServerEvent) {
        self.registry.send_filtered(&event, |_, _| true).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hirelink_shared::UserStatus;

    fn status_event(user_id: UserId) -> ServerEvent {
        ServerEvent::UserStatus {
            user_id,
            status: UserStatus::Online,
        }
    }

    #[tokio::test]
    async fn broadcast_to_room_reaches_occupants_only() {
        let registry = Arc::new(ClientRegistry::new());
        let rooms = Arc::new(RoomTracker::new());
        let fanout = Fanout::new(registry.clone(), rooms.clone());

        let room = RoomId::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        let (conn_a, conn_b) = (ConnectionId::new(), ConnectionId::new());

        let mut rx_a = registry.register(conn_a, alice).await;
        let mut rx_b = registry.register(conn_b, bob).await;
        rooms.join(room, conn_a, alice).await;

        fanout.broadcast_to_room(room, status_event(alice)).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn notify_absent_skips_room_and_sender() {
        let registry = Arc::new(ClientRegistry::new());
        let rooms = Arc::new(RoomTracker::new());
        let fanout = Fanout::new(registry.clone(), rooms.clone());

        let room = RoomId::new();
        let (sender, viewer, outsider) = (UserId::new(), UserId::new(), UserId::new());
        let conn_sender = ConnectionId::new();
        let conn_viewer = ConnectionId::new();
        let conn_outsider = ConnectionId::new();

        let mut rx_sender = registry.register(conn_sender, sender).await;
        let mut rx_viewer = registry.register(conn_viewer, viewer).await;
        let mut rx_outsider = registry.register(conn_outsider, outsider).await;
        rooms.join(room, conn_viewer, viewer).await;

        fanout.notify_absent(room, sender, status_event(sender)).await;

        assert!(rx_sender.try_recv().is_err());
        assert!(rx_viewer.try_recv().is_err());
        assert!(rx_outsider.try_recv().is_ok());
    }

    #[tokio::test]
    async fn room_broadcast_except_skips_author() {
        let registry = Arc::new(ClientRegistry::new());
        let rooms = Arc::new(RoomTracker::new());
        let fanout = Fanout::new(registry.clone(), rooms.clone());

        let room = RoomId::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        let (conn_a, conn_b) = (ConnectionId::new(), ConnectionId::new());

        let mut rx_a = registry.register(conn_a, alice).await;
        let mut rx_b = registry.register(conn_b, bob).await;
        rooms.join(room, conn_a, alice).await;
        rooms.join(room, conn_b, bob).await;

        fanout
            .broadcast_to_room_except(room, alice, status_event(alice))
            .await;

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregistered_connection_gets_nothing() {
        let registry = Arc::new(ClientRegistry::new());
        let conn = ConnectionId::new();
        let mut rx = registry.register(conn, UserId::new()).await;
        registry.unregister(conn).await;

        registry.send_to(conn, status_event(UserId::new())).await;
        assert!(rx.try_recv().is_err());
    }
}
