//! Operator notifications.
//!
//! Notifying is best effort. A delivery failure is logged here and never
//! reaches the caller, so a broken transport cannot disturb reconciliation.
//!
//! Transports:
//! - `MailNotifier`: SMTP, the primary channel
//! - `WebhookNotifier`: JSON POST to an operator endpoint
//! - `LogNotifier`: used when neither is configured

mod mail;
mod webhook;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use mail::{MailConfig, MailNotifier};
pub use webhook::WebhookNotifier;

/// Delivers a message to the operator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message. Never fails; delivery errors are handled internally.
    async fn send(&self, subject: &str, body: &str);
}

/// Why a notification could not be delivered.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("failed to reach webhook: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("no mail recipient configured")]
    NoRecipient,

    #[error("failed to build mail: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) {
        info!(subject, body, "No notification transport configured, skipping delivery");
    }
}
