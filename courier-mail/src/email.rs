//! Email message types.

use crate::{Address, Attachment, EmailDeliveryPayload, MailError, RenderedMessage, Result};
use serde::{Deserialize, Serialize};

/// A fully composed email, ready for MIME assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    /// Sender address.
    pub from: Address,
    /// To recipients.
    pub to: Vec<Address>,
    /// CC recipients.
    pub cc: Vec<Address>,
    /// BCC recipients; envelope only, never written to headers.
    pub bcc: Vec<Address>,
    /// Email subject.
    pub subject: String,
    /// Plain text body.
    pub text: String,
    /// HTML body.
    pub html: String,
    /// Attachments.
    pub attachments: Vec<Attachment>,
}

impl Email {
    /// Create an email with no recipients or body.
    pub fn new(from: Address, subject: impl Into<String>) -> Self {
        Self {
            from,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            text: String::new(),
            html: String::new(),
            attachments: Vec::new(),
        }
    }

    /// Compose from a task payload and its freshly rendered bodies.
    pub fn from_payload(payload: &EmailDeliveryPayload, rendered: RenderedMessage) -> Self {
        Self {
            from: payload.from.clone(),
            to: payload.to.clone(),
            cc: payload.cc.clone(),
            bcc: payload.bcc.clone(),
            subject: payload.subject.clone(),
            text: rendered.text,
            html: rendered.html,
            attachments: payload.attachments.clone(),
        }
    }

    /// Add a to recipient.
    pub fn to(mut self, to: Address) -> Self {
        self.to.push(to);
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, cc: Address) -> Self {
        self.cc.push(cc);
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, bcc: Address) -> Self {
        self.bcc.push(bcc);
        self
    }

    /// Set the plain text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set the HTML body.
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    /// Add an attachment.
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Envelope recipients: to, cc, then bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// Validate the email.
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(MailError::MissingField("to"));
        }
        if self.subject.contains(['\r', '\n']) {
            return Err(MailError::InvalidPayload(
                "subject must be a single line".to_string(),
            ));
        }
        Ok(())
    }

    /// Total attachment size in bytes.
    pub fn attachment_size(&self) -> usize {
        self.attachments.iter().map(Attachment::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload() {
        let payload = EmailDeliveryPayload::new(
            Address::parse("noreply@example.com").unwrap(),
            Address::parse("a@example.com").unwrap(),
            "Welcome",
            "welcome",
        )
        .add_bcc(Address::parse("audit@example.com").unwrap())
        .attach(Attachment::new("x.txt", "text/plain", b"x".to_vec()));

        let email = Email::from_payload(
            &payload,
            RenderedMessage {
                html: "<p>Hi</p>".into(),
                text: "Hi".into(),
            },
        );

        assert_eq!(email.subject, "Welcome");
        assert_eq!(email.text, "Hi");
        assert_eq!(email.recipients().count(), 2);
        assert_eq!(email.attachment_size(), 1);
        assert!(email.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_recipient() {
        let email = Email::new(Address::parse("noreply@example.com").unwrap(), "Hi");
        assert!(matches!(email.validate(), Err(MailError::MissingField("to"))));
    }
}
