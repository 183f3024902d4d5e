//! CRUD operations for [`Message`] records and their per-user sets.
//!
//! Messages are never physically removed: "delete for me" accumulates
//! rows in `message_deleted_for`, "delete for everyone" flips a flag on
//! the message row, and every read path filters on both.

use chrono::{DateTime, Utc};
use rusqlite::params;

use hirelink_shared::{MessageId, RoomId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{
    Attachment, Location, Message, MessageView, ParentSummary, Preview, Reaction, ReactionView,
};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a message together with its seeded read-by set and
    /// attachments. The read-by set must already include the sender.
    pub fn insert_message(
        &self,
        message: &Message,
        read_by: &[UserId],
        attachments: &[Attachment],
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, room_id, sender_id, text, edited,
                                   is_deleted_for_everyone, parent_id, preview, location, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                message.id.to_string(),
                message.room_id.to_string(),
                message.sender_id.to_string(),
                message.text,
                message.edited,
                message.is_deleted_for_everyone,
                message.parent_id.map(|p| p.to_string()),
                message
                    .preview
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                message
                    .location
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                message.created_at.to_rfc3339(),
            ],
        )?;

        self.add_read_by(message.id, read_by)?;

        for attachment in attachments {
            self.conn().execute(
                "INSERT INTO message_attachments (message_id, url, filename, content_type)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    message.id.to_string(),
                    attachment.url,
                    attachment.filename,
                    attachment.content_type,
                ],
            )?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a message row by id.
    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, room_id, sender_id, text, edited, is_deleted_for_everyone,
                        parent_id, preview, location, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch a fully-hydrated message view (sender profile, parent
    /// summary, reactions, attachments, read-by and starred-by sets).
    pub fn get_message_view(&self, id: MessageId) -> Result<MessageView> {
        let message = self.get_message(id)?;
        self.hydrate_message(message)
    }

    /// Messages visible to `me` in a room, newest first. Excludes
    /// messages deleted for everyone and messages `me` soft-deleted.
    pub fn list_messages_for(&self, room_id: RoomId, me: UserId) -> Result<Vec<MessageView>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.id, m.room_id, m.sender_id, m.text, m.edited, m.is_deleted_for_everyone,
                    m.parent_id, m.preview, m.location, m.created_at
             FROM messages m
             WHERE m.room_id = ?1
               AND m.is_deleted_for_everyone = 0
               AND NOT EXISTS (
                   SELECT 1 FROM message_deleted_for d
                   WHERE d.message_id = m.id AND d.user_id = ?2
               )
             ORDER BY m.created_at DESC",
        )?;

        let rows = stmt.query_map(params![room_id.to_string(), me.to_string()], row_to_message)?;

        let mut views = Vec::new();
        for row in rows {
            views.push(self.hydrate_message(row?)?);
        }
        Ok(views)
    }

    /// Unread message counts per room for `user`, mirroring what the
    /// client shows on room badges. Only rooms the user participates in
    /// count, and soft-deleted messages are excluded.
    pub fn unread_counts(&self, user: UserId) -> Result<Vec<(RoomId, i64)>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.room_id, COUNT(*)
             FROM messages m
             JOIN room_participants rp ON rp.room_id = m.room_id AND rp.user_id = ?1
             WHERE m.is_deleted_for_everyone = 0
               AND NOT EXISTS (
                   SELECT 1 FROM message_read_by r
                   WHERE r.message_id = m.id AND r.user_id = ?1
               )
               AND NOT EXISTS (
                   SELECT 1 FROM message_deleted_for d
                   WHERE d.message_id = m.id AND d.user_id = ?1
               )
             GROUP BY m.room_id",
        )?;

        let rows = stmt.query_map(params![user.to_string()], |row| {
            let room_str: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((room_str, count))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (room_str, count) = row?;
            counts.push((RoomId::parse(&room_str)?, count));
        }
        Ok(counts)
    }

    /// The read-by set of a message.
    pub fn read_by(&self, id: MessageId) -> Result<Vec<UserId>> {
        self.user_set("message_read_by", id)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Append users to a message's read-by set (idempotent).
    pub fn add_read_by(&self, id: MessageId, users: &[UserId]) -> Result<()> {
        for user in users {
            self.conn().execute(
                "INSERT OR IGNORE INTO message_read_by (message_id, user_id) VALUES (?1, ?2)",
                params![id.to_string(), user.to_string()],
            )?;
        }
        Ok(())
    }

    /// Mark every unread, undeleted message in the room as read by
    /// `user`. Returns the number of newly-read messages.
    pub fn mark_room_read(&self, room_id: RoomId, user: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO message_read_by (message_id, user_id)
             SELECT m.id, ?2 FROM messages m
             WHERE m.room_id = ?1
               AND m.is_deleted_for_everyone = 0
               AND NOT EXISTS (
                   SELECT 1 FROM message_deleted_for d
                   WHERE d.message_id = m.id AND d.user_id = ?2
               )",
            params![room_id.to_string(), user.to_string()],
        )?;
        Ok(affected)
    }

    /// Replace the message text and set the edited flag.
    pub fn update_message_text(&self, id: MessageId, text: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE messages SET text = ?1, edited = 1 WHERE id = ?2",
            params![text, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Upsert `user`'s reaction. A prior reaction from the same user is
    /// replaced: latest emoji wins.
    pub fn set_reaction(&self, id: MessageId, user: UserId, emoji: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO message_reactions (message_id, user_id, emoji)
             VALUES (?1, ?2, ?3)",
            params![id.to_string(), user.to_string(), emoji],
        )?;
        Ok(())
    }

    /// Remove `user`'s reaction. Returns `true` if one existed.
    pub fn remove_reaction(&self, id: MessageId, user: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM message_reactions WHERE message_id = ?1 AND user_id = ?2",
            params![id.to_string(), user.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Add `user` to the starred-by set (idempotent).
    pub fn star_message(&self, id: MessageId, user: UserId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO message_starred_by (message_id, user_id) VALUES (?1, ?2)",
            params![id.to_string(), user.to_string()],
        )?;
        Ok(())
    }

    /// Remove `user` from the starred-by set.
    pub fn unstar_message(&self, id: MessageId, user: UserId) -> Result<()> {
        self.conn().execute(
            "DELETE FROM message_starred_by WHERE message_id = ?1 AND user_id = ?2",
            params![id.to_string(), user.to_string()],
        )?;
        Ok(())
    }

    /// Soft-delete a message for one user.
    pub fn mark_deleted_for(&self, id: MessageId, user: UserId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO message_deleted_for (message_id, user_id) VALUES (?1, ?2)",
            params![id.to_string(), user.to_string()],
        )?;
        Ok(())
    }

    /// Flag a message as deleted for everyone. The row persists.
    pub fn mark_deleted_for_everyone(&self, id: MessageId) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_deleted_for_everyone = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Soft-delete every message in the room for `user`.
    pub fn clear_room_for(&self, room_id: RoomId, user: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO message_deleted_for (message_id, user_id)
             SELECT id, ?2 FROM messages WHERE room_id = ?1",
            params![room_id.to_string(), user.to_string()],
        )?;
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Hydration
    // ------------------------------------------------------------------

    /// Attach sender profile, parent summary, reactions, attachments and
    /// the per-user sets to a message row.
    pub fn hydrate_message(&self, message: Message) -> Result<MessageView> {
        let sender = self.get_sender_profile(message.sender_id)?;

        let parent = match message.parent_id {
            Some(parent_id) => match self.get_message(parent_id) {
                Ok(parent_row) => {
                    let parent_sender = self.get_sender_profile(parent_row.sender_id)?;
                    Some(ParentSummary {
                        id: parent_row.id,
                        text: parent_row.text,
                        sender: parent_sender,
                        created_at: parent_row.created_at,
                    })
                }
                // Dangling parent reference; hydrate without it.
                Err(StoreError::NotFound) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        let reactions = self
            .reactions_for(message.id)?
            .into_iter()
            .map(|r| {
                let user = self.get_sender_profile(r.user)?;
                Ok(ReactionView {
                    user,
                    emoji: r.emoji,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let attachments = self.attachments_for(message.id)?;
        let read_by = self.user_set("message_read_by", message.id)?;
        let starred_by = self.user_set("message_starred_by", message.id)?;

        Ok(MessageView {
            id: message.id,
            room_id: message.room_id,
            sender,
            text: message.text,
            edited: message.edited,
            parent,
            preview: message.preview,
            location: message.location,
            attachments,
            reactions,
            read_by,
            starred_by,
            created_at: message.created_at,
        })
    }

    /// Raw reactions for a message.
    pub fn reactions_for(&self, id: MessageId) -> Result<Vec<Reaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, emoji FROM message_reactions WHERE message_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            let user_str: String = row.get(0)?;
            let emoji: String = row.get(1)?;
            Ok((user_str, emoji))
        })?;

        let mut reactions = Vec::new();
        for row in rows {
            let (user_str, emoji) = row?;
            reactions.push(Reaction {
                user: UserId::parse(&user_str)?,
                emoji,
            });
        }
        Ok(reactions)
    }

    fn attachments_for(&self, id: MessageId) -> Result<Vec<Attachment>> {
        let mut stmt = self.conn().prepare(
            "SELECT url, filename, content_type FROM message_attachments WHERE message_id = ?1",
        )?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            Ok(Attachment {
                url: row.get(0)?,
                filename: row.get(1)?,
                content_type: row.get(2)?,
            })
        })?;

        let mut attachments = Vec::new();
        for row in rows {
            attachments.push(row?);
        }
        Ok(attachments)
    }

    fn user_set(&self, table: &str, id: MessageId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT user_id FROM {table} WHERE message_id = ?1 ORDER BY user_id"
        ))?;
        let rows = stmt.query_map(params![id.to_string()], |row| {
            let user_str: String = row.get(0)?;
            Ok(user_str)
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(UserId::parse(&row?)?);
        }
        Ok(users)
    }
}

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let room_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let text: String = row.get(3)?;
    let edited: bool = row.get(4)?;
    let is_deleted_for_everyone: bool = row.get(5)?;
    let parent_str: Option<String> = row.get(6)?;
    let preview_json: Option<String> = row.get(7)?;
    let location_json: Option<String> = row.get(8)?;
    let created_str: String = row.get(9)?;

    let id = MessageId::parse(&id_str).map_err(|e| {
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
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let preview: Option<Preview> = preview_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let location: Option<Location> = location_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id,
        room_id,
        sender_id,
        text,
        edited,
        is_deleted_for_everyone,
        parent_id,
        preview,
        location,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_test_db, seed_message, seed_room, seed_user};

    #[test]
    fn insert_seeds_read_by() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let b = seed_user(&db, "Bob").id;
        let room = seed_room(&db, &[a, b]);

        let message = seed_message(&db, room.id, a, "hello", &[a, b]);

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(db.read_by(message.id).unwrap(), expected);
    }

    #[test]
    fn listing_hides_soft_deleted() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let b = seed_user(&db, "Bob").id;
        let room = seed_room(&db, &[a, b]);

        let m1 = seed_message(&db, room.id, a, "one", &[a]);
        let m2 = seed_message(&db, room.id, a, "two", &[a]);
        let m3 = seed_message(&db, room.id, a, "three", &[a]);

        db.mark_deleted_for(m1.id, b).unwrap();
        db.mark_deleted_for_everyone(m2.id).unwrap();

        let for_b: Vec<_> = db
            .list_messages_for(room.id, b)
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(for_b, vec![m3.id]);

        // The sender still sees m1; the row was only hidden for b.
        let for_a: Vec<_> = db
            .list_messages_for(room.id, a)
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(for_a, vec![m3.id, m1.id]);
    }

    #[test]
    fn reaction_replacement_latest_emoji_wins() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let room = seed_room(&db, &[a]);
        let message = seed_message(&db, room.id, a, "react to me", &[a]);

        db.set_reaction(message.id, a, "👍").unwrap();
        db.set_reaction(message.id, a, "🎉").unwrap();

        let reactions = db.reactions_for(message.id).unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].emoji, "🎉");

        assert!(db.remove_reaction(message.id, a).unwrap());
        assert!(db.reactions_for(message.id).unwrap().is_empty());
    }

    #[test]
    fn mark_room_read_skips_deleted() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let b = seed_user(&db, "Bob").id;
        let room = seed_room(&db, &[a, b]);

        seed_message(&db, room.id, a, "unread", &[a]);
        let gone = seed_message(&db, room.id, a, "deleted", &[a]);
        db.mark_deleted_for_everyone(gone.id).unwrap();

        let newly_read = db.mark_room_read(room.id, b).unwrap();
        assert_eq!(newly_read, 1);

        // Idempotent on the second pass.
        assert_eq!(db.mark_room_read(room.id, b).unwrap(), 0);
    }

    #[test]
    fn unread_counts_per_room() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let b = seed_user(&db, "Bob").id;
        let room = seed_room(&db, &[a, b]);

        seed_message(&db, room.id, a, "one", &[a]);
        seed_message(&db, room.id, a, "two", &[a]);

        let counts = db.unread_counts(b).unwrap();
        assert_eq!(counts, vec![(room.id, 2)]);

        db.mark_room_read(room.id, b).unwrap();
        assert!(db.unread_counts(b).unwrap().is_empty());
    }

    #[test]
    fn hydration_includes_parent_summary() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let room = seed_room(&db, &[a]);
        let parent = seed_message(&db, room.id, a, "original", &[a]);

        let reply = Message {
            id: MessageId::new(),
            room_id: room.id,
            sender_id: a,
            text: "replying".into(),
            edited: false,
            is_deleted_for_everyone: false,
            parent_id: Some(parent.id),
            preview: None,
            location: None,
            created_at: Utc::now(),
        };
        db.insert_message(&reply, &[a], &[]).unwrap();

        let view = db.get_message_view(reply.id).unwrap();
        let summary = view.parent.unwrap();
        assert_eq!(summary.id, parent.id);
        assert_eq!(summary.text, "original");
        assert_eq!(summary.sender.id, a);
    }

    #[test]
    fn edit_updates_text_and_flag() {
        let (db, _dir) = open_test_db();
        let a = seed_user(&db, "Alice").id;
        let room = seed_room(&db, &[a]);
        let message = seed_message(&db, room.id, a, "tpyo", &[a]);

        db.update_message_text(message.id, "typo").unwrap();

        let updated = db.get_message(message.id).unwrap();
        assert_eq!(updated.text, "typo");
        assert!(updated.edited);
    }
}
