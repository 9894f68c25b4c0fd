//! Mail error types.

use std::fmt;
use thiserror::Error;

/// Result type for mail operations.
pub type Result<T> = std::result::Result<T, MailError>;

/// Stage of an SMTP exchange, carried by transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpStage {
    Connect,
    Greeting,
    Ehlo,
    StartTls,
    Auth,
    MailFrom,
    RcptTo,
    Data,
    Quit,
}

impl SmtpStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Greeting => "greeting",
            Self::Ehlo => "ehlo",
            Self::StartTls => "starttls",
            Self::Auth => "auth",
            Self::MailFrom => "mail-from",
            Self::RcptTo => "rcpt-to",
            Self::Data => "data",
            Self::Quit => "quit",
        }
    }
}

impl fmt::Display for SmtpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mail errors.
#[derive(Debug, Error)]
pub enum MailError {
    /// Template not loaded.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Template failed while executing against its context.
    #[error("Template execution failed: {0}")]
    TemplateExecution(String),

    /// Rendered markup could not be converted to HTML.
    #[error("Markup conversion failed: {message} ({details})")]
    MarkupConversion { message: String, details: String },

    /// Could not reach the SMTP server.
    #[error("SMTP dial to {address} failed: {reason}")]
    TransportDial { address: String, reason: String },

    /// TLS handshake failed.
    #[error("TLS negotiation with {host} failed: {reason}")]
    TlsNegotiation { host: String, reason: String },

    /// Server rejected the credentials.
    #[error("SMTP authentication failed: {0}")]
    Auth(String),

    /// Server refused a recipient.
    #[error("Recipient {recipient} rejected: {reply}")]
    RecipientRejected { recipient: String, reply: String },

    /// Writing the message body failed.
    #[error("Failed to write message body: {0}")]
    AttachmentWrite(String),

    /// Any other protocol failure.
    #[error("SMTP {stage} failed: {message}")]
    Smtp { stage: SmtpStage, message: String },

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Task payload could not be decoded.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Timeout error.
    #[error("SMTP {0} timed out")]
    Timeout(SmtpStage),

    /// Queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] courier_queue::QueueError),
}

impl MailError {
    /// Check if this error is retryable.
    ///
    /// Rendering and transport failures are retried; errors that no later
    /// attempt could fix are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::TemplateNotFound(_)
                | Self::InvalidPayload(_)
                | Self::InvalidAddress(_)
                | Self::MissingField(_)
                | Self::Config(_)
        )
    }

    /// The SMTP stage this error belongs to, if any.
    pub fn stage(&self) -> Option<SmtpStage> {
        match self {
            Self::TransportDial { .. } => Some(SmtpStage::Connect),
            Self::TlsNegotiation { .. } => Some(SmtpStage::StartTls),
            Self::Auth(_) => Some(SmtpStage::Auth),
            Self::RecipientRejected { .. } => Some(SmtpStage::RcptTo),
            Self::AttachmentWrite(_) => Some(SmtpStage::Data),
            Self::Smtp { stage, .. } | Self::Timeout(stage) => Some(*stage),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MailError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<handlebars::RenderError> for MailError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::TemplateExecution(err.to_string())
    }
}

impl From<handlebars::TemplateError> for MailError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::TemplateExecution(err.to_string())
    }
}
