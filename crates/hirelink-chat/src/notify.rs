//! Email notification for offline chat participants.
//!
//! Sends go through a [`Notifier`] trait so the pipeline never touches
//! SMTP directly. The concrete [`SmtpNotifier`] retries with doubling
//! backoff; callers that must not block on mail use
//! [`notify_detached`], which spawns the send and logs failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::warn;

use hirelink_shared::constants::{EMAIL_BACKOFF_BASE_MS, EMAIL_MAX_ATTEMPTS};
use hirelink_shared::{ChatError, ChatResult};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> ChatResult<()>;
}

/// Retry schedule for transient SMTP failures.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: EMAIL_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(EMAIL_BACKOFF_BASE_MS),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given retry (`attempt` is zero-based): base,
    /// 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    backoff: BackoffPolicy,
}

impl SmtpNotifier {
    pub fn new(
        relay: &str,
        username: String,
        password: String,
        from: &str,
    ) -> ChatResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)
            .map_err(|e| ChatError::External(format!("smtp relay: {e}")))?
            .credentials(Credentials::new(username, password))
            .build();
        let from = from
            .parse()
            .map_err(|e| ChatError::Validation(format!("sender address: {e}")))?;
        Ok(Self {
            transport,
            from,
            backoff: BackoffPolicy::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> ChatResult<()> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| ChatError::Validation(format!("recipient address: {e}")))?;

        let mut last_err = String::new();
        for attempt in 0..self.backoff.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.backoff.delay_for(attempt - 1)).await;
            }
            let email = Message::builder()
                .from(self.from.clone())
                .to(to.clone())
                .subject(subject)
                .body(body.to_string())
                .map_err(|e| ChatError::External(format!("build email: {e}")))?;
            match self.transport.send(email).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    last_err = e.to_string();
                    warn!(to = %to, attempt, error = %last_err, "email send failed");
                }
            }
        }
        Err(ChatError::External(format!(
            "email to {to} failed after {} attempts: {last_err}",
            self.backoff.max_attempts
        )))
    }
}

/// Notifier that accepts everything. Used when SMTP is unconfigured and
/// in tests.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> ChatResult<()> {
        Ok(())
    }
}

/// Fire-and-forget send: message delivery must never wait on mail.
pub fn notify_detached(notifier: Arc<dyn Notifier>, to: String, subject: String, body: String) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&to, &subject, &body).await {
            warn!(to, error = %e, "notification email dropped");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = BackoffPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn noop_notifier_accepts() {
        assert!(NoopNotifier.send("a@b.c", "s", "b").await.is_ok());
    }
}
