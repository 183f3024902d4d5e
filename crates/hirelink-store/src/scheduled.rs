//! CRUD operations for [`ScheduledMessage`] records.
//!
//! Status machine: `PENDING -> SENT` (promoted and removed) or
//! `PENDING -> CANCELLED` (removed). Terminal states never transition.

use chrono::{DateTime, Utc};
use rusqlite::params;

use hirelink_shared::{MessageId, RoomId, ScheduleId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ScheduleStatus, ScheduledMessage};

impl Database {
    /// Insert a new scheduled message.
    pub fn insert_scheduled(&self, scheduled: &ScheduledMessage) -> Result<()> {
        self.conn().execute(
            "INSERT INTO scheduled_messages (id, room_id, sender_id, text, parent_id,
                                             send_at, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                scheduled.id.to_string(),
                scheduled.room_id.to_string(),
                scheduled.sender_id.to_string(),
                scheduled.text,
                scheduled.parent_id.map(|p| p.to_string()),
                scheduled.send_at.to_rfc3339(),
                scheduled.status.as_str(),
                scheduled.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a scheduled message owned by `sender`.
    ///
    /// Ownership is part of the lookup so non-owners get `NotFound`
    /// rather than learning the entry exists.
    pub fn get_scheduled_owned(
        &self,
        id: ScheduleId,
        sender: UserId,
    ) -> Result<ScheduledMessage> {
        self.conn()
            .query_row(
                "SELECT id, room_id, sender_id, text, parent_id, send_at, status, created_at
                 FROM scheduled_messages WHERE id = ?1 AND sender_id = ?2",
                params![id.to_string(), sender.to_string()],
                row_to_scheduled,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// PENDING entries for `sender` in a room, soonest first.
    pub fn list_pending_scheduled(
        &self,
        room_id: RoomId,
        sender: UserId,
    ) -> Result<Vec<ScheduledMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, room_id, sender_id, text, parent_id, send_at, status, created_at
             FROM scheduled_messages
             WHERE room_id = ?1 AND sender_id = ?2 AND status = 'PENDING'
             ORDER BY send_at ASC",
        )?;
        let rows = stmt.query_map(
            params![room_id.to_string(), sender.to_string()],
            row_to_scheduled,
        )?;

        let mut scheduled = Vec::new();
        for row in rows {
            scheduled.push(row?);
        }
        Ok(scheduled)
    }

    /// All PENDING entries whose send time has passed, soonest first.
    pub fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, room_id, sender_id, text, parent_id, send_at, status, created_at
             FROM scheduled_messages
             WHERE status = 'PENDING' AND send_at <= ?1
             ORDER BY send_at ASC",
        )?;
        let rows = stmt.query_map(params![now.to_rfc3339()], row_to_scheduled)?;

        let mut due = Vec::new();
        for row in rows {
            due.push(row?);
        }
        Ok(due)
    }

    /// Update text and/or send time of a scheduled message.
    pub fn update_scheduled(
        &self,
        id: ScheduleId,
        text: Option<&str>,
        send_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(text) = text {
            self.conn().execute(
                "UPDATE scheduled_messages SET text = ?1 WHERE id = ?2",
                params![text, id.to_string()],
            )?;
        }
        if let Some(send_at) = send_at {
            self.conn().execute(
                "UPDATE scheduled_messages SET send_at = ?1 WHERE id = ?2",
                params![send_at.to_rfc3339(), id.to_string()],
            )?;
        }
        Ok(())
    }

    /// Transition a scheduled message's status.
    pub fn set_scheduled_status(&self, id: ScheduleId, status: ScheduleStatus) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE scheduled_messages SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Remove a scheduled message. Returns `true` if a row was deleted.
    pub fn delete_scheduled(&self, id: ScheduleId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM scheduled_messages WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

/// Map a `rusqlite::Row` to a [`ScheduledMessage`].
fn row_to_scheduled(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledMessage> {
    let id_str: String = row.get(0)?;
    let room_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let text: String = row.get(3)?;
    let parent_str: Option<String> = row.get(4)?;
    let send_at_str: String = row.get(5)?;
    let status_str: String = row.get(6)?;
    let created_str: String = row.get(7)?;

    let id = ScheduleId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let room_id = RoomId::parse(&room_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let sender_id = UserId::parse(&sender_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let parent_id = parent_str
        .map(|s| MessageId::parse(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let send_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&send_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let status = ScheduleStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown schedule status: {status_str}").into(),
        )
    })?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ScheduledMessage {
        id,
        room_id,
        sender_id,
        text,
        parent_id,
        send_at,
        status,
        created_at,
    })
}
