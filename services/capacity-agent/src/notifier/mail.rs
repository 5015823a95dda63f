//! SMTP delivery.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};

use super::{NotificationError, Notifier};

/// Port on which the server expects TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP settings.
#[derive(Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    /// Recipient. Falls back to `username`.
    pub to: Option<String>,

    /// Sender address. Falls back to `username`, then `noreply@localhost`.
    pub from: Option<String>,

    pub timeout: Duration,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("to", &self.to)
            .field("from", &self.from)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Sends each notification as a plain-text mail.
pub struct MailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl MailNotifier {
    pub const SENDER_NAME: &'static str = "capseek agent";
    pub const FALLBACK_SENDER: &'static str = "noreply@localhost";

    /// Build the transport. No connection is made until the first delivery.
    pub fn new(config: &MailConfig) -> Result<Self, NotificationError> {
        let sender = config
            .from
            .as_deref()
            .or(config.username.as_deref())
            .unwrap_or(Self::FALLBACK_SENDER);
        let from = Mailbox::new(Some(Self::SENDER_NAME.to_string()), sender.parse()?);

        let to: Mailbox = config
            .to
            .as_deref()
            .or(config.username.as_deref())
            .ok_or(NotificationError::NoRecipient)?
            .parse()?;

        // Other ports upgrade with STARTTLS when the server offers it.
        let parameters = TlsParameters::new(config.host.clone())?;
        let tls = if config.port == IMPLICIT_TLS_PORT {
            Tls::Wrapper(parameters)
        } else {
            Tls::Opportunistic(parameters)
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(tls)
            .timeout(Some(config.timeout));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn message(&self, subject: &str, body: &str) -> Result<Message, NotificationError> {
        Ok(Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?)
    }

    /// Deliver one notification, reporting the failure.
    pub async fn deliver(&self, subject: &str, body: &str) -> Result<(), NotificationError> {
        let message = self.message(subject, body)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn send(&self, subject: &str, body: &str) {
        match self.deliver(subject, body).await {
            Ok(()) => info!(subject, to = %self.to, "Notification mailed"),
            Err(e) => error!(subject, error = %e, "Failed to mail notification"),
        }
    }
}
