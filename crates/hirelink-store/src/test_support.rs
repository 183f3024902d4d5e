//! Shared fixtures for the crate's unit tests.

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use hirelink_shared::{JobId, MessageId, RoomId, ScheduleId, UserId};

use crate::database::Database;
use crate::models::{ChatRoom, Job, Message, ScheduleStatus, ScheduledMessage, User};

pub fn open_test_db() -> (Database, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("test.db")).unwrap();
    (db, dir)
}

pub fn seed_user(db: &Database, name: &str) -> User {
    let user = User {
        id: UserId::new(),
        full_name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        avatar_url: None,
        last_seen: None,
        created_at: Utc::now(),
    };
    db.create_user(&user).unwrap();
    user
}

pub fn seed_job(db: &Database, owner: UserId, title: &str) -> Job {
    let job = Job {
        id: JobId::new(),
        title: title.to_string(),
        created_by: owner,
        created_at: Utc::now(),
    };
    db.create_job(&job).unwrap();
    job
}

/// Create a room (and a backing job owned by the first participant).
pub fn seed_room(db: &Database, participants: &[UserId]) -> ChatRoom {
    let job = seed_job(db, participants[0], "Test Job");
    let room = ChatRoom {
        id: RoomId::new(),
        job_id: job.id,
        participants: participants.to_vec(),
        created_at: Utc::now(),
    };
    db.create_room(&room).unwrap();
    room
}

pub fn seed_message(
    db: &Database,
    room_id: RoomId,
    sender: UserId,
    text: &str,
    read_by: &[UserId],
) -> Message {
    let message = Message {
        id: MessageId::new(),
        room_id,
        sender_id: sender,
        text: text.to_string(),
        edited: false,
        is_deleted_for_everyone: false,
        parent_id: None,
        preview: None,
        location: None,
        created_at: Utc::now(),
    };
    db.insert_message(&message, read_by, &[]).unwrap();
    message
}

pub fn seed_scheduled(
    db: &Database,
    room_id: RoomId,
    sender: UserId,
    text: &str,
    send_at: DateTime<Utc>,
) -> ScheduledMessage {
    let scheduled = ScheduledMessage {
        id: ScheduleId::new(),
        room_id,
        sender_id: sender,
        text: text.to_string(),
        parent_id: None,
        send_at,
        status: ScheduleStatus::Pending,
        created_at: Utc::now(),
    };
    db.insert_scheduled(&scheduled).unwrap();
    scheduled
}
