//! # hirelink-chat
//!
//! The realtime chat core: presence tracking, room occupancy, message
//! ingestion and enrichment, delivery fan-out, and the scheduled-message
//! dispatcher.
//!
//! The crate is transport-agnostic. Components publish typed
//! [`events::ServerEvent`]s through a [`fanout::ClientRegistry`]; the
//! server's WebSocket layer owns the receiving half of each connection's
//! queue and serializes events to the wire. All state here is pure
//! runtime state, rebuilt empty on process restart.

pub mod events;
pub mod fanout;
pub mod notify;
pub mod occupancy;
pub mod pipeline;
pub mod presence;
pub mod preview;
pub mod scheduler;

pub use events::{ClientEvent, ServerEvent};
pub use fanout::{ClientRegistry, Fanout};
pub use notify::{BackoffPolicy, NoopNotifier, Notifier, SmtpNotifier};
pub use occupancy::RoomTracker;
pub use pipeline::{ChatService, MessageDraft};
pub use presence::PresenceRegistry;
pub use preview::{HttpPreviewResolver, LinkPreviewResolver, NoopPreviewResolver};
