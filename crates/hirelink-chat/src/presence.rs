//! In-memory per-user presence tracking with multi-connection support.
//!
//! Presence is per-**user**, not per-connection: a user is online iff
//! their connection set is non-empty, and only goes offline once the
//! last connection disconnects. The transition is derived from set
//! emptiness, never stored as a flag.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;

use hirelink_shared::{ConnectionId, UserId};

/// Injectable presence registry. One instance per process; tests
/// instantiate their own.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: Mutex<HashMap<UserId, HashSet<ConnectionId>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under the user's entry.
    ///
    /// Returns `true` iff this was the user's first live connection,
    /// i.e. the user just transitioned online and the caller should
    /// broadcast the status change.
    pub async fn connect(&self, user: UserId, conn: ConnectionId) -> bool {
        let mut inner = self.inner.lock().await;
        let entry = inner.entry(user).or_default();
        let came_online = entry.is_empty();
        entry.insert(conn);
        came_online
    }

    /// Remove a connection from whichever user entry holds it.
    ///
    /// Returns `Some(user)` iff the entry became empty — the user just
    /// transitioned offline and the caller records last-seen and
    /// broadcasts.
    pub async fn disconnect(&self, conn: ConnectionId) -> Option<UserId> {
        let mut inner = self.inner.lock().await;
        let user = inner
            .iter()
            .find(|(_, conns)| conns.contains(&conn))
            .map(|(user, _)| *user)?;

        let conns = inner.get_mut(&user)?;
        conns.remove(&conn);
        if conns.is_empty() {
            inner.remove(&user);
            Some(user)
        } else {
            None
        }
    }

    /// The current set of online users, used to greet a newly connected
    /// client.
    pub async fn snapshot(&self) -> Vec<UserId> {
        let inner = self.inner.lock().await;
        let mut users: Vec<_> = inner.keys().copied().collect();
        users.sort();
        users
    }

    /// Whether the user has at least one live connection.
    pub async fn is_online(&self, user: UserId) -> bool {
        self.inner.lock().await.contains_key(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_connection_transitions_online() {
        let presence = PresenceRegistry::new();
        let user = UserId::new();

        assert!(presence.connect(user, ConnectionId::new()).await);
        assert!(presence.is_online(user).await);

        // Second tab: no transition.
        assert!(!presence.connect(user, ConnectionId::new()).await);
    }

    #[tokio::test]
    async fn offline_only_after_last_disconnect() {
        let presence = PresenceRegistry::new();
        let user = UserId::new();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        presence.connect(user, c1).await;
        presence.connect(user, c2).await;

        assert_eq!(presence.disconnect(c1).await, None);
        assert!(presence.is_online(user).await);

        assert_eq!(presence.disconnect(c2).await, Some(user));
        assert!(!presence.is_online(user).await);
    }

    #[tokio::test]
    async fn unknown_connection_is_ignored() {
        let presence = PresenceRegistry::new();
        assert_eq!(presence.disconnect(ConnectionId::new()).await, None);
    }

    #[tokio::test]
    async fn snapshot_lists_online_users() {
        let presence = PresenceRegistry::new();
        let a = UserId::new();
        let b = UserId::new();
        presence.connect(a, ConnectionId::new()).await;
        presence.connect(b, ConnectionId::new()).await;

        let snapshot = presence.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&a) && snapshot.contains(&b));
    }
}
