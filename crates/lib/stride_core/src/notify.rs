//! Outbound user notifications (welcome mail, password-reset links).
//!
//! Delivery is an external concern. The core only depends on [`Notifier`];
//! [`LogNotifier`] writes to the log and is what the CLI wires in.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(&self, email: &str) -> Result<(), NotifyError>;

    /// `token` is the raw reset token; only its digest is stored.
    async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), NotifyError>;
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_welcome(&self, email: &str) -> Result<(), NotifyError> {
        info!(%email, "welcome notification");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), NotifyError> {
        info!(%email, "password reset notification");
        debug!(%email, %token, "password reset token");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_never_fails() {
        let notifier = LogNotifier;
        assert!(notifier.send_welcome("a@example.com").await.is_ok());
        assert!(
            notifier
                .send_password_reset("a@example.com", "deadbeef")
                .await
                .is_ok()
        );
    }
}
