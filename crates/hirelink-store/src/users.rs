//! CRUD operations for [`User`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use hirelink_shared::{RoomId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{SenderProfile, User};

impl Database {
    /// Insert a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, full_name, email, avatar_url, last_seen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.to_string(),
                user.full_name,
                user.email,
                user.avatar_url,
                user.last_seen.map(|t| t.to_rfc3339()),
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a single user by id.
    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, full_name, email, avatar_url, last_seen, created_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch the profile fields hydrated into message views.
    pub fn get_sender_profile(&self, id: UserId) -> Result<SenderProfile> {
        self.conn()
            .query_row(
                "SELECT id, full_name, avatar_url FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_profile,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Record when the user's last connection closed.
    pub fn set_last_seen(&self, id: UserId, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET last_seen = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    /// Last-seen timestamps for a room's participants, excluding `me`.
    pub fn last_seen_for_room(
        &self,
        room_id: RoomId,
        me: UserId,
    ) -> Result<Vec<(UserId, Option<DateTime<Utc>>)>> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.last_seen
             FROM users u
             JOIN room_participants rp ON rp.user_id = u.id
             WHERE rp.room_id = ?1 AND u.id != ?2",
        )?;

        let rows = stmt.query_map(params![room_id.to_string(), me.to_string()], |row| {
            let id_str: String = row.get(0)?;
            let seen_str: Option<String> = row.get(1)?;
            Ok((id_str, seen_str))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id_str, seen_str) = row?;
            let id = UserId::parse(&id_str)?;
            let last_seen = seen_str
                .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
                .transpose()?;
            out.push((id, last_seen));
        }
        Ok(out)
    }
}

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let full_name: String = row.get(1)?;
    let email: String = row.get(2)?;
    let avatar_url: Option<String> = row.get(3)?;
    let seen_str: Option<String> = row.get(4)?;
    let created_str: String = row.get(5)?;

    let id = UserId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let last_seen = seen_str
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        4,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })
        })
        .transpose()?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(User {
        id,
        full_name,
        email,
        avatar_url,
        last_seen,
        created_at,
    })
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<SenderProfile> {
    let id_str: String = row.get(0)?;
    let full_name: String = row.get(1)?;
    let avatar_url: Option<String> = row.get(2)?;

    let id = UserId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(SenderProfile {
        id,
        full_name,
        avatar_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_test_db, seed_user};

    #[test]
    fn create_and_get() {
        let (db, _dir) = open_test_db();
        let user = seed_user(&db, "Ada Lovelace");

        let fetched = db.get_user(user.id).unwrap();
        assert_eq!(fetched, user);
    }

    #[test]
    fn missing_user_is_not_found() {
        let (db, _dir) = open_test_db();
        assert!(matches!(
            db.get_user(UserId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn last_seen_updates() {
        let (db, _dir) = open_test_db();
        let user = seed_user(&db, "Grace Hopper");
        assert!(db.get_user(user.id).unwrap().last_seen.is_none());

        let now = Utc::now();
        db.set_last_seen(user.id, now).unwrap();

        let seen = db.get_user(user.id).unwrap().last_seen.unwrap();
        assert_eq!(seen.timestamp(), now.timestamp());
    }
}
