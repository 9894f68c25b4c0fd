//! Submit an email delivery task.

use colored::Colorize;
use courier_config::CourierConfig;
use courier_mail::{Address, Attachment, EmailDeliveryPayload, EmailService};
use courier_queue::QueueClass;
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::{CliError, CliResult};
use crate::setup;

/// Everything needed to build one payload.
pub struct EnqueueRequest {
    pub class: QueueClass,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub template: String,
    pub context: Map<String, Value>,
    pub attachments: Vec<PathBuf>,
    pub embed_smtp: bool,
}

/// Build the payload a request describes, sending from `from`.
pub fn build_payload(request: &EnqueueRequest, from: Address) -> CliResult<EmailDeliveryPayload> {
    let (first, rest) = request
        .to
        .split_first()
        .ok_or_else(|| CliError::InvalidArgument("at least one --to is required".to_string()))?;

    let mut payload =
        EmailDeliveryPayload::new(from, Address::parse(first)?, &request.subject, &request.template)
            .with_context(request.context.clone());

    for to in rest {
        payload = payload.add_to(Address::parse(to)?);
    }
    for cc in &request.cc {
        payload = payload.add_cc(Address::parse(cc)?);
    }
    for bcc in &request.bcc {
        payload = payload.add_bcc(Address::parse(bcc)?);
    }
    for path in &request.attachments {
        payload = payload.attach(Attachment::from_file(path)?);
    }
    Ok(payload)
}

pub async fn run(config: &CourierConfig, request: EnqueueRequest) -> CliResult<()> {
    let queue = setup::open_queue(config).await?;
    let mut service = EmailService::new(queue, setup::sender(&config.mail)?);
    if request.embed_smtp {
        service = service.with_smtp(setup::smtp_config(&config.smtp));
    }

    let payload = build_payload(&request, service.from_address().clone())?;
    let id = service.send(request.class, payload).await?;

    println!("{} {} ({})", "queued".green().bold(), id, request.class);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EnqueueRequest {
        EnqueueRequest {
            class: QueueClass::Critical,
            to: vec!["Ada <ada@example.com>".to_string(), "bob@example.com".to_string()],
            cc: vec!["cc@example.com".to_string()],
            bcc: vec![],
            subject: "Hello".to_string(),
            template: "welcome".to_string(),
            context: Map::new(),
            attachments: vec![],
            embed_smtp: false,
        }
    }

    #[test]
    fn test_build_payload() {
        let from = Address::new("noreply@example.com").unwrap();
        let payload = build_payload(&request(), from).unwrap();

        assert_eq!(payload.to.len(), 2);
        assert_eq!(payload.to[0].name(), Some("Ada"));
        assert_eq!(payload.cc[0].email(), "cc@example.com");
        assert!(payload.smtp.is_none());
    }

    #[test]
    fn test_build_payload_rejects_bad_address() {
        let mut request = request();
        request.cc = vec!["not an address".to_string()];
        let from = Address::new("noreply@example.com").unwrap();
        assert!(build_payload(&request, from).is_err());
    }

    #[test]
    fn test_build_payload_reads_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let mut request = request();
        request.attachments = vec![path];
        let from = Address::new("noreply@example.com").unwrap();
        let payload = build_payload(&request, from).unwrap();

        assert_eq!(payload.attachments[0].filename, "invoice.pdf");
        assert_eq!(payload.attachments[0].content_type, "application/pdf");
        assert_eq!(payload.attachments[0].data, b"%PDF-1.4");
    }
}
