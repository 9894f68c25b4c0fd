//! Integration tests for courier-mail against a stub SMTP server.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use courier_mail::*;
use courier_queue::{
    Handlers, Queue, QueueClass, QueueConfig, RetryPolicy, TaskHandler, TaskState, Worker,
    WorkerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

const VERIFY_TEMPLATE: &str = r#"<mjml>
  <mj-head><mj-title>Verify</mj-title></mj-head>
  <mj-body>
    <mj-section>
      <mj-column>
        <mj-text>Your verification code is {{Token}}</mj-text>
        <mj-button href="{{VerificationLink}}">Verify Email</mj-button>
      </mj-column>
    </mj-section>
  </mj-body>
</mjml>"#;

#[derive(Default)]
struct Mailbox {
    connections: usize,
    recipients: Vec<String>,
    messages: Vec<String>,
}

/// Minimal SMTP server: accepts everything unless `reject_rcpt` is set.
async fn stub_server(reject_rcpt: bool) -> (u16, Arc<Mutex<Mailbox>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mailbox = Arc::new(Mutex::new(Mailbox::default()));

    let shared = mailbox.clone();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let mailbox = shared.clone();
            tokio::spawn(async move {
                mailbox.lock().await.connections += 1;
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                write.write_all(b"220 stub ESMTP ready\r\n").await.unwrap();

                while let Ok(Some(line)) = lines.next_line().await {
                    let upper = line.to_ascii_uppercase();
                    let reply: &[u8] = if upper.starts_with("EHLO") {
                        b"250-stub greets you\r\n250-PIPELINING\r\n250 AUTH PLAIN\r\n"
                    } else if upper.starts_with("AUTH PLAIN") {
                        b"235 2.7.0 Authentication successful\r\n"
                    } else if upper.starts_with("MAIL FROM") {
                        b"250 OK\r\n"
                    } else if upper.starts_with("RCPT TO") {
                        mailbox.lock().await.recipients.push(line[8..].to_string());
                        if reject_rcpt {
                            b"550 5.1.1 mailbox unavailable\r\n"
                        } else {
                            b"250 OK\r\n"
                        }
                    } else if upper == "DATA" {
                        write.write_all(b"354 end with .\r\n").await.unwrap();
                        let mut data = String::new();
                        while let Ok(Some(line)) = lines.next_line().await {
                            if line == "." {
                                break;
                            }
                            data.push_str(&line);
                            data.push_str("\r\n");
                        }
                        mailbox.lock().await.messages.push(data);
                        b"250 queued\r\n"
                    } else if upper == "QUIT" {
                        let _ = write.write_all(b"221 bye\r\n").await;
                        return;
                    } else {
                        b"502 command not implemented\r\n"
                    };
                    if write.write_all(reply).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    (port, mailbox)
}

fn smtp(port: u16) -> SmtpConfig {
    SmtpConfig::new("127.0.0.1")
        .port(port)
        .security(SmtpSecurity::None)
        .credentials("courier", "secret")
        .timeout(Duration::from_secs(5))
}

fn renderer() -> (tempfile::TempDir, Arc<TemplateRenderer>) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("verify-email.mjml"), VERIFY_TEMPLATE).unwrap();
    let renderer = TemplateRenderer::from_directory(dir.path()).unwrap();
    (dir, Arc::new(renderer))
}

fn queue() -> Queue {
    Queue::in_memory(QueueConfig::default().with_retry_policy(RetryPolicy::immediate()))
}

fn notifier(queue: &Queue) -> EmailNotifier {
    let from = Address::parse("Courier <noreply@example.com>").unwrap();
    EmailNotifier::new(EmailService::new(queue.clone(), from), "http://localhost:8080").unwrap()
}

/// Decoded text/plain body of a received message.
fn plain_text(message: &str) -> String {
    let start = message.find("Content-Type: text/plain").unwrap();
    let body_start = start + message[start..].find("\r\n\r\n").unwrap() + 4;
    let body_end = body_start + message[body_start..].find("--").unwrap();
    let encoded: String = message[body_start..body_end].split("\r\n").collect();
    String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap()
}

#[tokio::test]
async fn test_verification_email_end_to_end() {
    courier_log::init_for_tests();
    let (port, mailbox) = stub_server(false).await;
    let (_dir, renderer) = renderer();
    let queue = queue();

    let id = notifier(&queue)
        .send_verification_email("user@example.com", "abc123")
        .await
        .unwrap();
    assert_eq!(queue.get(id).await.unwrap().unwrap().class, QueueClass::Critical);

    let handler = EmailDeliveryHandler::new(renderer, TransportKind::Smtp.build())
        .with_default_smtp(smtp(port));
    let mut worker = Worker::with_config(
        queue.clone(),
        WorkerConfig {
            concurrency: 2,
            poll_interval: Duration::from_millis(10),
            ..WorkerConfig::default()
        },
    );
    worker
        .start(Handlers::new().register(EMAIL_DELIVERY_TASK, Arc::new(handler)))
        .unwrap();

    let mut state = TaskState::Pending;
    for _ in 0..500 {
        state = queue.get(id).await.unwrap().unwrap().state;
        if state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    worker.stop().await.unwrap();
    assert_eq!(state, TaskState::Completed);

    let mailbox = mailbox.lock().await;
    assert_eq!(mailbox.recipients, vec!["<user@example.com>".to_string()]);
    assert_eq!(mailbox.messages.len(), 1);

    let message = &mailbox.messages[0];
    assert!(message.contains("Subject: Verify Your Email\r\n"));
    assert!(message.contains("From: Courier <noreply@example.com>\r\n"));

    let text = plain_text(message);
    assert!(text.contains("Your verification code is abc123"));
    assert!(text.contains("Verify Email (http://localhost:8080/verify-email?token=abc123)"));
}

#[tokio::test]
async fn test_rejected_recipient_retries_then_dead() {
    let (port, mailbox) = stub_server(true).await;
    let (_dir, renderer) = renderer();
    let queue = queue();
    let handler = EmailDeliveryHandler::new(renderer, TransportKind::Smtp.build())
        .with_default_smtp(smtp(port));

    let id = notifier(&queue)
        .send_verification_email("ghost@example.com", "abc123")
        .await
        .unwrap();

    let mut states = Vec::new();
    while let Some(task) = queue.dequeue().await.unwrap() {
        let err = handler.handle(&task).await.unwrap_err();
        assert!(err.retryable);
        assert!(err.message.contains("ghost@example.com"));
        states.push(queue.nack(task.id, err.retryable, err.message).await.unwrap());
    }

    assert_eq!(
        states,
        vec![TaskState::Retrying, TaskState::Retrying, TaskState::Dead]
    );
    let dead = queue.dead_letters(10).await.unwrap();
    assert_eq!(dead[0].id, id);
    assert_eq!(dead[0].attempt, 3);

    let mailbox = mailbox.lock().await;
    assert_eq!(mailbox.connections, 3);
    assert!(mailbox.messages.is_empty());
}

#[tokio::test]
async fn test_cc_and_bcc_are_envelope_recipients() {
    let (port, mailbox) = stub_server(false).await;
    let (_dir, renderer) = renderer();
    let handler = EmailDeliveryHandler::new(renderer, Arc::new(SmtpTransport::new()));

    let payload = EmailDeliveryPayload::new(
        Address::parse("noreply@example.com").unwrap(),
        Address::parse("to@example.com").unwrap(),
        "Copies",
        "templates/verify-email.mjml",
    )
    .add_cc(Address::parse("cc@example.com").unwrap())
    .add_bcc(Address::parse("bcc@example.com").unwrap())
    .with_var("Token", "t")
    .with_var("VerificationLink", "http://x.com")
    .attach(Attachment::from_bytes("report.csv", b"a,b\n1,2\n".to_vec()))
    .with_smtp(smtp(port));

    handler.deliver(&payload).await.unwrap();

    let mailbox = mailbox.lock().await;
    assert_eq!(
        mailbox.recipients,
        vec!["<to@example.com>", "<cc@example.com>", "<bcc@example.com>"]
    );
    let message = &mailbox.messages[0];
    assert!(message.contains("Cc: cc@example.com\r\n"));
    assert!(!message.contains("bcc@example.com"));
    assert!(message.contains("Content-Disposition: attachment; filename=\"report.csv\"\r\n"));
    assert!(message.contains("Content-Type: text/csv; name=\"report.csv\"\r\n"));
}

#[tokio::test]
async fn test_starttls_required_but_not_offered() {
    let (port, _mailbox) = stub_server(false).await;
    let email = Email::new(Address::parse("a@example.com").unwrap(), "s")
        .to(Address::parse("b@example.com").unwrap())
        .text("x");

    let config = smtp(port).security(SmtpSecurity::StartTls);
    let err = SmtpClient::new(config).send(&email).await.unwrap_err();
    assert!(matches!(err, MailError::TlsNegotiation { .. }));
    assert_eq!(err.stage(), Some(SmtpStage::StartTls));
}
