//! Email transport implementations.
//!
//! The transport is picked once, when the delivery handler is built, from
//! [`TransportKind`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::message::MessageBuilder;
use crate::{Email, MailError, Result, SmtpClient, SmtpConfig};

/// Email transport trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an email with the given server settings.
    async fn send(&self, email: &Email, smtp: &SmtpConfig) -> Result<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Which transport to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Deliver over SMTP.
    #[default]
    Smtp,
    /// Log the composed message instead of sending it.
    Log,
}

impl TransportKind {
    /// Build the selected transport.
    pub fn build(self) -> Arc<dyn Transport> {
        match self {
            Self::Smtp => Arc::new(SmtpTransport::new()),
            Self::Log => Arc::new(LogTransport::new()),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "log" => Ok(Self::Log),
            other => Err(MailError::Config(format!("unknown transport: {}", other))),
        }
    }
}

/// SMTP transport. Opens a new connection for every send.
#[derive(Debug, Clone, Default)]
pub struct SmtpTransport;

impl SmtpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, email: &Email, smtp: &SmtpConfig) -> Result<()> {
        debug!(
            host = %smtp.host,
            port = smtp.port,
            to = ?email.to.iter().map(|a| a.email()).collect::<Vec<_>>(),
            subject = %email.subject,
            "Sending email via SMTP"
        );
        SmtpClient::new(smtp.clone()).send(email).await
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Development transport: logs the message and counts sends.
#[derive(Debug, Default)]
pub struct LogTransport {
    sent: AtomicUsize,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages "sent" so far.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, email: &Email, smtp: &SmtpConfig) -> Result<()> {
        email.validate()?;
        let message = MessageBuilder::new().build(email);

        info!(
            from = %email.from,
            to = ?email.recipients().map(|a| a.email()).collect::<Vec<_>>(),
            subject = %email.subject,
            attachments = email.attachments.len(),
            bytes = message.len(),
            would_use = %smtp.address(),
            "Email logged instead of sent"
        );
        debug!(text = %email.text, "Logged email body");

        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Address;

    #[test]
    fn test_transport_kind() {
        assert_eq!("SMTP".parse::<TransportKind>().unwrap(), TransportKind::Smtp);
        assert_eq!("log".parse::<TransportKind>().unwrap(), TransportKind::Log);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());

        assert_eq!(TransportKind::default().build().name(), "smtp");
        assert_eq!(TransportKind::Log.build().name(), "log");
    }

    #[tokio::test]
    async fn test_log_transport_counts() {
        let transport = LogTransport::new();
        let email = Email::new(Address::new("a@example.com").unwrap(), "Hi")
            .to(Address::new("b@example.com").unwrap())
            .text("hello");

        transport.send(&email, &SmtpConfig::new("localhost")).await.unwrap();
        assert_eq!(transport.sent(), 1);

        let no_recipients = Email::new(Address::new("a@example.com").unwrap(), "Hi");
        assert!(transport.send(&no_recipients, &SmtpConfig::new("localhost")).await.is_err());
        assert_eq!(transport.sent(), 1);
    }
}
