//! Producer side: turn "send this email" into a queued task.
//!
//! Enqueueing returns as soon as the task is stored. Delivery failures are
//! only visible in the logs and the dead-letter set, never to the caller.

use courier_queue::{Queue, QueueClass, TaskId};
use serde_json::{Map, Value};
use tracing::info;
use url::Url;

use crate::{
    Address, EMAIL_DELIVERY_TASK, EmailDeliveryPayload, IntoAddress, MailError, Result, SmtpConfig,
};

/// Enqueues email delivery tasks.
#[derive(Clone)]
pub struct EmailService {
    queue: Queue,
    from: Address,
    smtp: Option<SmtpConfig>,
}

impl EmailService {
    /// Create a service sending from `from`.
    pub fn new(queue: Queue, from: Address) -> Self {
        Self {
            queue,
            from,
            smtp: None,
        }
    }

    /// Embed these SMTP settings in every task that has none.
    pub fn with_smtp(mut self, smtp: SmtpConfig) -> Self {
        self.smtp = Some(smtp);
        self
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn from_address(&self) -> &Address {
        &self.from
    }

    /// Queue a prepared payload.
    pub async fn send(&self, class: QueueClass, mut payload: EmailDeliveryPayload) -> Result<TaskId> {
        payload.validate()?;
        if payload.smtp.is_none() {
            payload.smtp = self.smtp.clone();
        }

        let id = self
            .queue
            .enqueue(class, EMAIL_DELIVERY_TASK, payload.to_bytes()?)
            .await?;

        info!(
            task_id = %id,
            class = %class,
            template = %payload.template,
            recipients = payload.recipients().count(),
            "Email queued"
        );
        Ok(id)
    }

    /// Queue a templated email to one recipient from the default sender.
    pub async fn send_template(
        &self,
        class: QueueClass,
        to: impl IntoAddress,
        subject: impl Into<String>,
        template: impl Into<String>,
        context: Map<String, Value>,
    ) -> Result<TaskId> {
        let payload = EmailDeliveryPayload::new(self.from.clone(), to.into_address()?, subject, template)
            .with_context(context);
        self.send(class, payload).await
    }
}

/// Account notification emails.
#[derive(Clone)]
pub struct EmailNotifier {
    service: EmailService,
    app_url: Url,
}

impl EmailNotifier {
    /// `app_url` is the base for links placed in emails.
    pub fn new(service: EmailService, app_url: &str) -> Result<Self> {
        let app_url = Url::parse(app_url)
            .map_err(|e| MailError::Config(format!("invalid app url {:?}: {}", app_url, e)))?;
        Ok(Self { service, app_url })
    }

    pub fn service(&self) -> &EmailService {
        &self.service
    }

    /// `<app_url>/<page>?token=<token>`, keeping any base path.
    pub fn link(&self, page: &str, token: &str) -> String {
        let mut url = self.app_url.clone();
        let path = format!("{}/{}", url.path().trim_end_matches('/'), page);
        url.set_path(&path);
        url.query_pairs_mut().clear().append_pair("token", token);
        url.to_string()
    }

    /// Email-address verification; critical priority.
    pub async fn send_verification_email(&self, to: impl IntoAddress, token: &str) -> Result<TaskId> {
        let mut context = Map::new();
        context.insert("VerificationLink".into(), self.link("verify-email", token).into());
        context.insert("Token".into(), token.into());

        self.service
            .send_template(QueueClass::Critical, to, "Verify Your Email", "verify-email", context)
            .await
    }

    /// Password reset; critical priority.
    pub async fn send_password_reset_email(&self, to: impl IntoAddress, token: &str) -> Result<TaskId> {
        let mut context = Map::new();
        context.insert("ResetLink".into(), self.link("reset-password", token).into());
        context.insert("Token".into(), token.into());

        self.service
            .send_template(QueueClass::Critical, to, "Reset Your Password", "reset-password", context)
            .await
    }

    /// Welcome message; default priority. `AppUrl` is added to the context.
    pub async fn send_welcome_email(
        &self,
        to: impl IntoAddress,
        mut context: Map<String, Value>,
    ) -> Result<TaskId> {
        context
            .entry("AppUrl")
            .or_insert_with(|| self.app_url.as_str().trim_end_matches('/').into());

        self.service
            .send_template(QueueClass::Default, to, "Welcome", "welcome", context)
            .await
    }
}
