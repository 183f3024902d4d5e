/// Application name
pub const APP_NAME: &str = "Hirelink";

/// How long after creation a message may still be edited by its sender.
pub const EDIT_WINDOW_SECS: i64 = 5 * 60;

/// Default interval between scheduled-message dispatcher ticks.
pub const SCHEDULER_INTERVAL_SECS: u64 = 60;

/// Timeout for a single link-preview metadata fetch.
pub const LINK_PREVIEW_TIMEOUT_SECS: u64 = 5;

/// Maximum attempts for one outbound email (first try included).
pub const EMAIL_MAX_ATTEMPTS: u32 = 4;

/// Base delay for email retry backoff; doubles per attempt.
pub const EMAIL_BACKOFF_BASE_MS: u64 = 500;

/// Maximum chat attachment size in bytes (25 MiB).
pub const MAX_ATTACHMENT_SIZE: usize = 25 * 1024 * 1024;

/// Maximum message text length in characters.
pub const MAX_MESSAGE_CHARS: usize = 4_000;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Capacity of each connection's outbound event queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;
