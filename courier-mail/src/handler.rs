//! Worker-side handler for `email:deliver` tasks.

use async_trait::async_trait;
use courier_queue::{Task, TaskError, TaskHandler};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    Email, EmailDeliveryPayload, MailError, Result, SmtpConfig, TemplateRenderer, Transport,
};

/// Renders and sends one queued email per task.
///
/// SMTP settings embedded in the task win over the handler default. A task
/// with neither fails permanently.
pub struct EmailDeliveryHandler {
    renderer: Arc<TemplateRenderer>,
    transport: Arc<dyn Transport>,
    default_smtp: Option<SmtpConfig>,
}

impl EmailDeliveryHandler {
    pub fn new(renderer: Arc<TemplateRenderer>, transport: Arc<dyn Transport>) -> Self {
        Self {
            renderer,
            transport,
            default_smtp: None,
        }
    }

    /// Process-wide SMTP settings.
    pub fn with_default_smtp(mut self, smtp: SmtpConfig) -> Self {
        self.default_smtp = Some(smtp);
        self
    }

    /// Render and send a payload.
    pub async fn deliver(&self, payload: &EmailDeliveryPayload) -> Result<()> {
        payload.validate()?;
        let smtp = payload
            .smtp
            .as_ref()
            .or(self.default_smtp.as_ref())
            .ok_or_else(|| MailError::Config("no SMTP settings in task or worker".to_string()))?;

        let rendered = self.renderer.render(&payload.template, &payload.context)?;
        let email = Email::from_payload(payload, rendered);
        self.transport.send(&email, smtp).await
    }
}

#[async_trait]
impl TaskHandler for EmailDeliveryHandler {
    async fn handle(&self, task: &Task) -> std::result::Result<(), TaskError> {
        let attempt = task.attempt + 1;
        let result = match EmailDeliveryPayload::from_bytes(&task.payload) {
            Ok(payload) => self.deliver(&payload).await.map(|()| payload),
            Err(e) => Err(e),
        };

        match result {
            Ok(payload) => {
                info!(
                    task_id = %task.id,
                    attempt,
                    template = %payload.template,
                    recipients = payload.recipients().count(),
                    transport = self.transport.name(),
                    "Email delivered"
                );
                Ok(())
            }
            Err(e) => {
                let stage = e.stage().map(|s| s.as_str()).unwrap_or("render");
                if e.is_retryable() {
                    warn!(
                        task_id = %task.id,
                        attempt,
                        max_attempts = task.max_attempts,
                        stage,
                        error = %e,
                        "Email delivery failed"
                    );
                    Err(TaskError::retryable(e.to_string()))
                } else {
                    error!(
                        task_id = %task.id,
                        attempt,
                        stage,
                        error = %e,
                        "Email delivery failed permanently"
                    );
                    Err(TaskError::permanent(e.to_string()))
                }
            }
        }
    }
}
