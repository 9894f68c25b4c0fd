//! # Courier Mail
//!
//! Rendering and delivery for queued emails.
//!
//! ## Features
//!
//! - **Templates**: handlebars over MJML, compiled to responsive HTML
//! - **Plain text**: a text alternative extracted from the rendered HTML
//! - **MIME**: hand-built `multipart/mixed` messages with base64 attachments
//! - **SMTP**: STARTTLS or implicit TLS, AUTH PLAIN, errors tagged with the
//!   failing protocol stage
//! - **Queue integration**: [`EmailDeliveryHandler`] runs `email:deliver`
//!   tasks, [`EmailService`] and [`EmailNotifier`] enqueue them
//!
//! ## Producer
//!
//! ```rust,no_run
//! use courier_mail::{Address, EmailNotifier, EmailService};
//! use courier_queue::{Queue, QueueConfig, RedisStoreConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = Queue::redis(RedisStoreConfig::new("redis://localhost:6379"), QueueConfig::default()).await?;
//! let service = EmailService::new(queue, Address::parse("Courier <noreply@example.com>")?);
//! let notifier = EmailNotifier::new(service, "https://app.example.com")?;
//!
//! notifier
//!     .send_verification_email(Address::parse("user@example.com")?, "abc123")
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Worker
//!
//! ```rust,no_run
//! use courier_mail::{EMAIL_DELIVERY_TASK, EmailDeliveryHandler, SmtpConfig, TemplateRenderer, TransportKind};
//! use courier_queue::{Handlers, Queue, Worker};
//! use std::sync::Arc;
//!
//! # async fn run(queue: Queue) -> Result<(), Box<dyn std::error::Error>> {
//! let renderer = Arc::new(TemplateRenderer::from_directory("templates")?);
//! let handler = EmailDeliveryHandler::new(renderer, TransportKind::Smtp.build())
//!     .with_default_smtp(SmtpConfig::new("smtp.example.com").credentials("user", "pass"));
//!
//! let mut worker = Worker::new(queue);
//! worker.start(Handlers::new().register(EMAIL_DELIVERY_TASK, Arc::new(handler)))?;
//! # Ok(())
//! # }
//! ```

mod address;
mod attachment;
mod email;
mod error;
mod handler;
mod message;
mod payload;
mod service;
mod smtp;
mod template;
mod transport;

pub mod markup;
pub mod mjml;
pub mod text;

pub use address::{Address, IntoAddress};
pub use attachment::{Attachment, DEFAULT_CONTENT_TYPE, guess_content_type};
pub use email::Email;
pub use error::{MailError, Result, SmtpStage};
pub use handler::EmailDeliveryHandler;
pub use message::MessageBuilder;
pub use payload::{EMAIL_DELIVERY_TASK, EmailDeliveryPayload};
pub use service::{EmailNotifier, EmailService};
pub use smtp::{Reply, SmtpClient, SmtpConfig, SmtpSecurity};
pub use template::{RenderedMessage, TEMPLATE_EXTENSION, TemplateRenderer, normalize_name};
pub use text::html_to_text;
pub use transport::{LogTransport, SmtpTransport, Transport, TransportKind};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::address::Address;
    pub use crate::attachment::Attachment;
    pub use crate::error::{MailError, Result};
    pub use crate::handler::EmailDeliveryHandler;
    pub use crate::payload::{EMAIL_DELIVERY_TASK, EmailDeliveryPayload};
    pub use crate::service::{EmailNotifier, EmailService};
    pub use crate::smtp::{SmtpConfig, SmtpSecurity};
    pub use crate::template::{RenderedMessage, TemplateRenderer};
    pub use crate::transport::{Transport, TransportKind};
}
