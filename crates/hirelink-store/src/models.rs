//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to REST responses and realtime event payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hirelink_shared::{JobId, MessageId, RequestId, RoomId, ScheduleId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user. Only the fields the chat core hydrates or mutates;
/// the full job-board profile lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    /// Set when the user's last connection closes; `None` until then.
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A job posting. Rooms and chat requests reference one for context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub title: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Accepted => "ACCEPTED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RequestStatus::Pending),
            "ACCEPTED" => Some(RequestStatus::Accepted),
            "REJECTED" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// A request to open a chat about a job. Accepting one creates a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub id: RequestId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub job_id: JobId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat room
// ---------------------------------------------------------------------------

/// A chat room scoped to one job and a fixed participant set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRoom {
    pub id: RoomId,
    pub job_id: JobId,
    pub participants: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Snapshot of link metadata captured at send time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preview {
    pub url: String,
    pub title: String,
    pub description: String,
    pub image: String,
}

/// A shared map location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

/// A single file attachment, already uploaded to the blob store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub content_type: String,
}

/// One user's reaction to a message. At most one per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub user: UserId,
    pub emoji: String,
}

/// A persisted chat message (row form, without the per-user sets).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub text: String,
    pub edited: bool,
    pub is_deleted_for_everyone: bool,
    pub parent_id: Option<MessageId>,
    pub preview: Option<Preview>,
    pub location: Option<Location>,
    pub created_at: DateTime<Utc>,
}

/// Sender fields hydrated into views and events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderProfile {
    pub id: UserId,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

/// Parent-message summary hydrated into replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParentSummary {
    pub id: MessageId,
    pub text: String,
    pub sender: SenderProfile,
    pub created_at: DateTime<Utc>,
}

/// A reaction with the reacting user's profile attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionView {
    pub user: SenderProfile,
    pub emoji: String,
}

/// Fully-hydrated message: what REST responses and realtime events carry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: SenderProfile,
    pub text: String,
    pub edited: bool,
    pub parent: Option<ParentSummary>,
    pub preview: Option<Preview>,
    pub location: Option<Location>,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<ReactionView>,
    pub read_by: Vec<UserId>,
    pub starred_by: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Scheduled message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Pending,
    Sent,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Pending => "PENDING",
            ScheduleStatus::Sent => "SENT",
            ScheduleStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ScheduleStatus::Pending),
            "SENT" => Some(ScheduleStatus::Sent),
            "CANCELLED" => Some(ScheduleStatus::Cancelled),
            _ => None,
        }
    }

    /// Only PENDING entries are editable or dispatchable.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScheduleStatus::Pending)
    }
}

/// A message queued for future dispatch by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub id: ScheduleId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub text: String,
    pub parent_id: Option<MessageId>,
    pub send_at: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_status_round_trip() {
        for status in [
            ScheduleStatus::Pending,
            ScheduleStatus::Sent,
            ScheduleStatus::Cancelled,
        ] {
            assert_eq!(ScheduleStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ScheduleStatus::parse("DRAFT"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(!ScheduleStatus::Pending.is_terminal());
        assert!(ScheduleStatus::Sent.is_terminal());
        assert!(ScheduleStatus::Cancelled.is_terminal());
    }
}
