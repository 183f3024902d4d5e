//! v001 -- Initial schema creation.
//!
//! Creates the chat domain tables: `users`, `jobs`, `chat_requests`,
//! `chat_rooms` (+ participants), `messages` (+ the per-message sets),
//! and `scheduled_messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    full_name  TEXT NOT NULL,
    email      TEXT NOT NULL,
    avatar_url TEXT,
    last_seen  TEXT,                         -- ISO-8601 / RFC-3339, NULL until first disconnect
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Jobs (origin context for rooms and chat requests)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS jobs (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    title      TEXT NOT NULL,
    created_by TEXT NOT NULL,                -- FK -> users(id)
    created_at TEXT NOT NULL,

    FOREIGN KEY (created_by) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Chat requests
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_requests (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    from_user  TEXT NOT NULL,                -- FK -> users(id)
    to_user    TEXT NOT NULL,                -- FK -> users(id)
    job_id     TEXT NOT NULL,                -- FK -> jobs(id)
    status     TEXT NOT NULL DEFAULT 'PENDING',  -- PENDING | ACCEPTED | REJECTED
    created_at TEXT NOT NULL,

    FOREIGN KEY (from_user) REFERENCES users(id),
    FOREIGN KEY (to_user)   REFERENCES users(id),
    FOREIGN KEY (job_id)    REFERENCES jobs(id)
);

CREATE INDEX IF NOT EXISTS idx_chat_requests_to_status
    ON chat_requests(to_user, status);

-- ----------------------------------------------------------------
-- Chat rooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_rooms (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    job_id     TEXT NOT NULL,                -- FK -> jobs(id)
    created_at TEXT NOT NULL,

    FOREIGN KEY (job_id) REFERENCES jobs(id)
);

CREATE TABLE IF NOT EXISTS room_participants (
    room_id TEXT NOT NULL,                   -- FK -> chat_rooms(id)
    user_id TEXT NOT NULL,                   -- FK -> users(id)

    PRIMARY KEY (room_id, user_id),
    FOREIGN KEY (room_id) REFERENCES chat_rooms(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_room_participants_user
    ON room_participants(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id                      TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    room_id                 TEXT NOT NULL,              -- FK -> chat_rooms(id)
    sender_id               TEXT NOT NULL,              -- FK -> users(id)
    text                    TEXT NOT NULL DEFAULT '',
    edited                  INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    is_deleted_for_everyone INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    parent_id               TEXT,                       -- nullable FK -> messages(id)
    preview                 TEXT,                       -- JSON, nullable
    location                TEXT,                       -- JSON, nullable
    created_at              TEXT NOT NULL,

    FOREIGN KEY (room_id)   REFERENCES chat_rooms(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (parent_id) REFERENCES messages(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_room_ts
    ON messages(room_id, created_at DESC);

-- Per-message user sets. Rows accumulate; messages are never physically
-- removed, only flagged.
CREATE TABLE IF NOT EXISTS message_read_by (
    message_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS message_deleted_for (
    message_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS message_starred_by (
    message_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

-- One reaction per (message, user); replacing the emoji overwrites the row.
CREATE TABLE IF NOT EXISTS message_reactions (
    message_id TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    emoji      TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS message_attachments (
    message_id   TEXT NOT NULL,
    url          TEXT NOT NULL,
    filename     TEXT NOT NULL,
    content_type TEXT NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_message_attachments_message
    ON message_attachments(message_id);

-- ----------------------------------------------------------------
-- Scheduled messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS scheduled_messages (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    room_id    TEXT NOT NULL,                -- FK -> chat_rooms(id)
    sender_id  TEXT NOT NULL,                -- FK -> users(id)
    text       TEXT NOT NULL,
    parent_id  TEXT,                         -- nullable FK -> messages(id)
    send_at    TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'PENDING',  -- PENDING | SENT | CANCELLED
    created_at TEXT NOT NULL,

    FOREIGN KEY (room_id)   REFERENCES chat_rooms(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_scheduled_status_send_at
    ON scheduled_messages(status, send_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
