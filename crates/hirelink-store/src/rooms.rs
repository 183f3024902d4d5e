//! CRUD operations for [`ChatRoom`] records and participant membership.

use chrono::{DateTime, Utc};
use rusqlite::params;

use hirelink_shared::{JobId, RoomId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ChatRoom;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new room with its participant set.
    pub fn create_room(&self, room: &ChatRoom) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chat_rooms (id, job_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                room.id.to_string(),
                room.job_id.to_string(),
                room.created_at.to_rfc3339(),
            ],
        )?;
        for participant in &room.participants {
            self.conn().execute(
                "INSERT INTO room_participants (room_id, user_id) VALUES (?1, ?2)",
                params![room.id.to_string(), participant.to_string()],
            )?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single room (with participants) by id.
    pub fn get_room(&self, id: RoomId) -> Result<ChatRoom> {
        let (job_id, created_at) = self
            .conn()
            .query_row(
                "SELECT job_id, created_at FROM chat_rooms WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let job_str: String = row.get(0)?;
                    let created_str: String = row.get(1)?;
                    Ok((job_str, created_str))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        let job_id = JobId::parse(&job_id)?;
        let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))?;
        let participants = self.room_participants(id)?;

        Ok(ChatRoom {
            id,
            job_id,
            participants,
            created_at,
        })
    }

    /// The participant set of a room, sorted for deterministic output.
    pub fn room_participants(&self, room_id: RoomId) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM room_participants WHERE room_id = ?1")?;
        let rows = stmt.query_map(params![room_id.to_string()], |row| {
            let id_str: String = row.get(0)?;
            Ok(id_str)
        })?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(UserId::parse(&row?)?);
        }
        participants.sort();
        Ok(participants)
    }

    /// Whether `user` may send/read in `room`.
    pub fn is_room_participant(&self, room_id: RoomId, user: UserId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
            params![room_id.to_string(), user.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Find the room for a job shared by both users, if one exists.
    ///
    /// Rooms are created lazily, so callers fall back to [`create_room`]
    /// when this returns `None`.
    ///
    /// [`create_room`]: Database::create_room
    pub fn find_room_for_job(
        &self,
        job_id: JobId,
        a: UserId,
        b: UserId,
    ) -> Result<Option<ChatRoom>> {
        let id_str: Option<String> = self
            .conn()
            .query_row(
                "SELECT r.id FROM chat_rooms r
                 JOIN room_participants p1 ON p1.room_id = r.id AND p1.user_id = ?2
                 JOIN room_participants p2 ON p2.room_id = r.id AND p2.user_id = ?3
                 WHERE r.job_id = ?1",
                params![job_id.to_string(), a.to_string(), b.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Sqlite(other)),
            })?;

        match id_str {
            Some(s) => Ok(Some(self.get_room(RoomId::parse(&s)?)?)),
            None => Ok(None),
        }
    }

    /// All rooms `user` participates in, newest first.
    pub fn list_rooms_for_user(&self, user: UserId) -> Result<Vec<ChatRoom>> {
        let mut stmt = self.conn().prepare(
            "SELECT r.id FROM chat_rooms r
             JOIN room_participants rp ON rp.room_id = r.id
             WHERE rp.user_id = ?1
             ORDER BY r.created_at DESC",
        )?;
        let rows = stmt.query_map(params![user.to_string()], |row| {
            let id_str: String = row.get(0)?;
            Ok(id_str)
        })?;

        let mut rooms = Vec::new();
        for row in rows {
            rooms.push(self.get_room(RoomId::parse(&row?)?)?);
        }
        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_test_db, seed_room, seed_user};

    #[test]
    fn create_and_get_with_participants() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let b = seed_user(&db, "Bob").id;
        let room = seed_room(&db, &[a, b]);

        let fetched = db.get_room(room.id).unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(fetched.participants, expected);
    }

    #[test]
    fn participant_check() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let b = seed_user(&db, "Bob").id;
        let outsider = seed_user(&db, "Mallory").id;
        let room = seed_room(&db, &[a, b]);

        assert!(db.is_room_participant(room.id, a).unwrap());
        assert!(!db.is_room_participant(room.id, outsider).unwrap());
    }

    #[test]
    fn find_room_is_lazy_lookup() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let b = seed_user(&db, "Bob").id;
        let room = seed_room(&db, &[a, b]);

        let found = db.find_room_for_job(room.job_id, a, b).unwrap().unwrap();
        assert_eq!(found.id, room.id);

        let c = seed_user(&db, "Carol").id;
        assert!(db.find_room_for_job(room.job_id, a, c).unwrap().is_none());
    }

    #[test]
    fn rooms_listing_scoped_to_member() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let b = seed_user(&db, "Bob").id;
        let c = seed_user(&db, "Carol").id;
        seed_room(&db, &[a, b]);
        seed_room(&db, &[a, c]);

        assert_eq!(db.list_rooms_for_user(a).unwrap().len(), 2);
        assert_eq!(db.list_rooms_for_user(b).unwrap().len(), 1);
    }
}
