//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development. SMTP is the exception: without
//! the full set of SMTP_* variables, email notification is disabled.

use std::net::SocketAddr;
use std::path::PathBuf;

use hirelink_shared::constants::{
    DEFAULT_HTTP_PORT, MAX_ATTACHMENT_SIZE, SCHEDULER_INTERVAL_SECS,
};

/// SMTP relay credentials for notification email.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub relay: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file. `None` uses the platform data directory.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Filesystem path where uploaded attachments are stored.
    /// Env: `UPLOAD_PATH`
    /// Default: `./uploads`
    pub upload_path: PathBuf,

    /// Maximum attachment size in bytes.
    pub max_attachment_size: usize,

    /// Seconds between scheduled-message dispatch passes.
    /// Env: `SCHEDULER_INTERVAL_SECS`
    /// Default: `60`
    pub scheduler_interval_secs: u64,

    /// SMTP settings; `None` disables notification email.
    /// Env: `SMTP_RELAY`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
    pub smtp: Option<SmtpConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            upload_path: PathBuf::from("./uploads"),
            max_attachment_size: MAX_ATTACHMENT_SIZE,
            scheduler_interval_secs: SCHEDULER_INTERVAL_SECS,
            smtp: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("UPLOAD_PATH") {
            config.upload_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("SCHEDULER_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                if secs > 0 {
                    config.scheduler_interval_secs = secs;
                } else {
                    tracing::warn!("SCHEDULER_INTERVAL_SECS must be positive, using default");
                }
            } else {
                tracing::warn!(value = %val, "Invalid SCHEDULER_INTERVAL_SECS, using default");
            }
        }

        config.smtp = Self::smtp_from_env();

        config
    }

    fn smtp_from_env() -> Option<SmtpConfig> {
        let relay = std::env::var("SMTP_RELAY").ok();
        let username = std::env::var("SMTP_USERNAME").ok();
        let password = std::env::var("SMTP_PASSWORD").ok();
        let from = std::env::var("SMTP_FROM").ok();

        match (relay, username, password, from) {
            (Some(relay), Some(username), Some(password), Some(from)) => Some(SmtpConfig {
                relay,
                username,
                password,
                from,
            }),
            (None, None, None, None) => None,
            _ => {
                tracing::warn!(
                    "Partial SMTP configuration (need SMTP_RELAY, SMTP_USERNAME, \
                     SMTP_PASSWORD, SMTP_FROM), email notification disabled"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into());
        assert!(config.smtp.is_none());
        assert_eq!(config.scheduler_interval_secs, SCHEDULER_INTERVAL_SECS);
    }
}
