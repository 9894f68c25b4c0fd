//! Task payload for email delivery.

use crate::{Address, Attachment, MailError, Result, SmtpConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Task type handled by [`EmailDeliveryHandler`](crate::EmailDeliveryHandler).
pub const EMAIL_DELIVERY_TASK: &str = "email:deliver";

/// Everything a worker needs to render and send one email.
///
/// Built once by the producer and stored as the task body; never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDeliveryPayload {
    pub from: Address,
    pub to: Vec<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Address>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<Address>,
    pub subject: String,
    /// Template name, e.g. `verify-email`.
    pub template: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Per-task SMTP settings; the worker default is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpConfig>,
}

impl EmailDeliveryPayload {
    /// Start a payload with the required fields.
    pub fn new(
        from: Address,
        to: Address,
        subject: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            from,
            to: vec![to],
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            template: template.into(),
            context: Map::new(),
            attachments: Vec::new(),
            smtp: None,
        }
    }

    /// Add a template variable.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Replace the whole template context.
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn add_to(mut self, to: Address) -> Self {
        self.to.push(to);
        self
    }

    pub fn add_cc(mut self, cc: Address) -> Self {
        self.cc.push(cc);
        self
    }

    pub fn add_bcc(mut self, bcc: Address) -> Self {
        self.bcc.push(bcc);
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Embed SMTP settings in the task.
    pub fn with_smtp(mut self, smtp: SmtpConfig) -> Self {
        self.smtp = Some(smtp);
        self
    }

    /// Check the fields a send cannot do without.
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(MailError::MissingField("to"));
        }
        if self.template.trim().is_empty() {
            return Err(MailError::MissingField("template"));
        }
        if self.subject.contains(['\r', '\n']) {
            return Err(MailError::InvalidPayload(
                "subject must be a single line".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize as a task body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a task body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| MailError::InvalidPayload(e.to_string()))
    }

    /// All envelope recipients: to, then cc, then bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }
}
