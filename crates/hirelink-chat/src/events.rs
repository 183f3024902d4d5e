//! Typed realtime events exchanged with connected clients.
//!
//! Server -> client (JSON):
//! ```json
//! {"event": "userStatus", "data": {"userId": "...", "status": "Online"}}
//! {"event": "chatMessage", "data": { ...enriched message... }}
//! ```
//!
//! Client -> server (JSON):
//! ```json
//! {"event": "joinChatRoom", "data": {"roomId": "..."}}
//! {"event": "typing", "data": {"roomId": "..."}}
//! ```
//!
//! Message-bearing payloads carry the stable message id so clients can
//! de-duplicate; the transport itself makes no idempotence guarantee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hirelink_shared::{MessageId, RoomId, UserId, UserStatus};
use hirelink_store::{Location, MessageView};

/// Events pushed from the server to connected clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Greeting sent point-to-point on connect.
    InitialOnlineUsers { users: Vec<UserId> },
    /// Global presence transition.
    UserStatus { user_id: UserId, status: UserStatus },
    /// Broadcast alongside the offline transition.
    UserLastSeen {
        user_id: UserId,
        last_seen: DateTime<Utc>,
    },
    /// Room occupancy change; also replayed point-to-point to joiners.
    UserInRoom {
        room_id: RoomId,
        user_id: UserId,
        in_room: bool,
    },
    /// A new message, delivered to room occupants.
    ChatMessage(MessageView),
    /// Lightweight unread-badge signal for users not in the room.
    NewMessageNotification(MessageView),
    /// A user caught up on a room's messages.
    RoomMessagesRead { room_id: RoomId, user_id: UserId },
    Typing { room_id: RoomId, user_id: UserId },
    StopTyping { room_id: RoomId, user_id: UserId },
    MessageEdited(MessageView),
    MessageReacted(MessageView),
    MessageDeleted { message_id: MessageId },
    MessageStarred(MessageView),
}

/// Events received from clients over the WebSocket.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinChatRoom {
        room_id: RoomId,
    },
    LeaveChatRoom {
        room_id: RoomId,
    },
    SendChatMessage {
        room_id: RoomId,
        #[serde(default)]
        text: String,
        #[serde(default)]
        parent: Option<MessageId>,
        #[serde(default)]
        location: Option<Location>,
    },
    MarkRoomRead {
        room_id: RoomId,
    },
    Typing {
        room_id: RoomId,
    },
    StopTyping {
        room_id: RoomId,
    },
}
