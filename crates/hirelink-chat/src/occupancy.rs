//! Per-room occupancy tracking, distinct from presence.
//!
//! A user can be online without being "inside" any room. Occupancy is
//! per-user but tracked per-connection: with multiple tabs open in the
//! same room, the room only reports the user absent once *all* of that
//! user's connections have left. Pure runtime state — nothing here is
//! persisted, and the tracker rebuilds from empty on restart.

use std::collections::{HashMap, HashSet};

use tokio::sync::Mutex;

use hirelink_shared::{ConnectionId, RoomId, UserId};

/// Result of a join: whether the user newly entered (for the room
/// broadcast) and who was already there (replayed point-to-point to
/// the joining connection only, so there is no broadcast storm).
#[derive(Debug)]
pub struct JoinOutcome {
    pub user_entered: bool,
    pub occupants_before: Vec<UserId>,
}

#[derive(Default)]
struct TrackerInner {
    /// room -> connections inside it, with the user each belongs to.
    rooms: HashMap<RoomId, HashMap<ConnectionId, UserId>>,
    /// connection -> rooms it has joined (for implicit leave on disconnect).
    by_conn: HashMap<ConnectionId, HashSet<RoomId>>,
}

/// Injectable room-occupancy tracker.
#[derive(Default)]
pub struct RoomTracker {
    inner: Mutex<TrackerInner>,
}

impl RoomTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the room's occupancy set.
    pub async fn join(&self, room: RoomId, conn: ConnectionId, user: UserId) -> JoinOutcome {
        let mut inner = self.inner.lock().await;

        let occupants = inner.rooms.entry(room).or_default();
        let mut before: Vec<UserId> = occupants
            .values()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        before.sort();

        let user_entered = !occupants.values().any(|u| *u == user);
        occupants.insert(conn, user);
        inner.by_conn.entry(conn).or_default().insert(room);

        JoinOutcome {
            user_entered,
            occupants_before: before,
        }
    }

    /// Remove a connection from the room.
    ///
    /// Returns `Some(user)` iff this was the user's last connection in
    /// the room — the caller broadcasts the occupancy change.
    pub async fn leave(&self, room: RoomId, conn: ConnectionId) -> Option<UserId> {
        let mut inner = self.inner.lock().await;
        if let Some(rooms) = inner.by_conn.get_mut(&conn) {
            rooms.remove(&room);
        }
        Self::remove_from_room(&mut inner, room, conn)
    }

    /// Implicit leave across every joined room when a connection drops.
    ///
    /// Returns the rooms where the connection's user is no longer
    /// present at all.
    pub async fn drop_connection(&self, conn: ConnectionId) -> Vec<(RoomId, UserId)> {
        let mut inner = self.inner.lock().await;
        let joined = inner.by_conn.remove(&conn).unwrap_or_default();

        let mut departures = Vec::new();
        for room in joined {
            if let Some(user) = Self::remove_from_room(&mut inner, room, conn) {
                departures.push((room, user));
            }
        }
        departures
    }

    /// The user identifiers currently inside the room. Used by the
    /// ingestion pipeline to seed read-by for active viewers.
    pub async fn occupants(&self, room: RoomId) -> HashSet<UserId> {
        let inner = self.inner.lock().await;
        inner
            .rooms
            .get(&room)
            .map(|conns| conns.values().copied().collect())
            .unwrap_or_default()
    }

    /// The connections currently inside the room, for fan-out.
    pub async fn connections(&self, room: RoomId) -> Vec<ConnectionId> {
        let inner = self.inner.lock().await;
        inner
            .rooms
            .get(&room)
            .map(|conns| conns.keys().copied().collect())
            .unwrap_or_default()
    }

    fn remove_from_room(
        inner: &mut TrackerInner,
        room: RoomId,
        conn: ConnectionId,
    ) -> Option<UserId> {
        let occupants = inner.rooms.get_mut(&room)?;
        let user = occupants.remove(&conn)?;

        let user_still_present = occupants.values().any(|u| *u == user);
        if occupants.is_empty() {
            inner.rooms.remove(&room);
        }
        if user_still_present {
            None
        } else {
            Some(user)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_reports_prior_occupants_only() {
        let tracker = RoomTracker::new();
        let room = RoomId::new();
        let (a, b) = (UserId::new(), UserId::new());

        let first = tracker.join(room, ConnectionId::new(), a).await;
        assert!(first.user_entered);
        assert!(first.occupants_before.is_empty());

        let second = tracker.join(room, ConnectionId::new(), b).await;
        assert!(second.user_entered);
        assert_eq!(second.occupants_before, vec![a].into_iter().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn multi_tab_user_absent_only_after_all_leave() {
        let tracker = RoomTracker::new();
        let room = RoomId::new();
        let user = UserId::new();
        let tab1 = ConnectionId::new();
        let tab2 = ConnectionId::new();

        assert!(tracker.join(room, tab1, user).await.user_entered);
        // Second tab of the same user: no occupancy transition.
        assert!(!tracker.join(room, tab2, user).await.user_entered);

        assert_eq!(tracker.leave(room, tab1).await, None);
        assert!(tracker.occupants(room).await.contains(&user));

        assert_eq!(tracker.leave(room, tab2).await, Some(user));
        assert!(tracker.occupants(room).await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_leaves_every_room() {
        let tracker = RoomTracker::new();
        let (room1, room2) = (RoomId::new(), RoomId::new());
        let user = UserId::new();
        let conn = ConnectionId::new();

        tracker.join(room1, conn, user).await;
        tracker.join(room2, conn, user).await;

        let mut departures = tracker.drop_connection(conn).await;
        departures.sort_by_key(|(room, _)| *room);
        let mut expected = vec![(room1, user), (room2, user)];
        expected.sort_by_key(|(room, _)| *room);
        assert_eq!(departures, expected);
    }

    #[tokio::test]
    async fn disconnect_with_other_tab_open_is_silent() {
        let tracker = RoomTracker::new();
        let room = RoomId::new();
        let user = UserId::new();
        let tab1 = ConnectionId::new();
        let tab2 = ConnectionId::new();

        tracker.join(room, tab1, user).await;
        tracker.join(room, tab2, user).await;

        assert!(tracker.drop_connection(tab1).await.is_empty());
        assert!(tracker.occupants(room).await.contains(&user));
    }
}
