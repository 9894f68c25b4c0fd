//! MIME message assembly.
//!
//! Layout:
//!
//! ```text
//! multipart/mixed
//! ├── multipart/alternative
//! │   ├── text/plain  (base64, UTF-8)
//! │   └── text/html   (base64, UTF-8)
//! └── one part per attachment (base64, Content-Disposition: attachment)
//! ```
//!
//! All lines end in CRLF. Bcc recipients are never written to headers.

use crate::attachment::{DEFAULT_CONTENT_TYPE, encode_wrapped};
use crate::{Address, Attachment, Email};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use std::fmt::Write;
use uuid::Uuid;

const CRLF: &str = "\r\n";

/// Preferred header line length before folding.
const MAX_LINE: usize = 78;

/// Payload bytes per encoded word: 56 base64 characters in the 12-character
/// `=?UTF-8?B?...?=` frame, so `Subject: ` plus one word fits [`MAX_LINE`].
const WORD_BYTES: usize = 42;

/// Builds the wire form of an [`Email`].
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    date: DateTime<Utc>,
    boundary: String,
    message_id: String,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    /// Current time and random boundary and message id.
    pub fn new() -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            date: Utc::now(),
            boundary: id.clone(),
            message_id: id,
        }
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = id.into();
        self
    }

    /// Render the full message, headers and body.
    pub fn build(&self, email: &Email) -> String {
        let mixed = format!("mixed-{}", self.boundary);
        let alternative = format!("alt-{}", self.boundary);
        let domain = email
            .from
            .email()
            .rsplit_once('@')
            .map(|(_, d)| d)
            .unwrap_or("localhost");

        let mut out = String::new();
        header(&mut out, "From", &mailbox(&email.from));
        header(&mut out, "To", &mailbox_list(&email.to));
        if !email.cc.is_empty() {
            header(&mut out, "Cc", &mailbox_list(&email.cc));
        }
        header(&mut out, "Subject", &encode_word(&email.subject));
        header(&mut out, "Date", &self.date.to_rfc2822());
        header(&mut out, "Message-ID", &format!("<{}@{}>", self.message_id, domain));
        header(&mut out, "MIME-Version", "1.0");
        header(
            &mut out,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{}\"", mixed),
        );
        out.push_str(CRLF);

        let _ = write!(out, "--{}{}", mixed, CRLF);
        header(
            &mut out,
            "Content-Type",
            &format!("multipart/alternative; boundary=\"{}\"", alternative),
        );
        out.push_str(CRLF);
        text_part(&mut out, &alternative, "text/plain", &email.text);
        text_part(&mut out, &alternative, "text/html", &email.html);
        let _ = write!(out, "--{}--{}", alternative, CRLF);

        for attachment in &email.attachments {
            let _ = write!(out, "--{}{}", mixed, CRLF);
            attachment_part(&mut out, attachment);
        }
        let _ = write!(out, "--{}--{}", mixed, CRLF);
        out
    }
}

/// Write one header, folding at spaces once a line would pass [`MAX_LINE`].
fn header(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "{}:", name);
    let mut line_len = name.len() + 1;

    for (i, word) in value.split(' ').enumerate() {
        if i > 0 && line_len + 1 + word.len() > MAX_LINE {
            out.push_str(CRLF);
            line_len = 0;
        }
        out.push(' ');
        out.push_str(word);
        line_len += 1 + word.len();
    }
    out.push_str(CRLF);
}

fn text_part(out: &mut String, boundary: &str, content_type: &str, body: &str) {
    let _ = write!(out, "--{}{}", boundary, CRLF);
    header(out, "Content-Type", &format!("{}; charset=UTF-8", content_type));
    header(out, "Content-Transfer-Encoding", "base64");
    out.push_str(CRLF);
    out.push_str(&encode_wrapped(body.as_bytes()));
}

fn attachment_part(out: &mut String, attachment: &Attachment) {
    let content_type = attachment
        .content_type
        .parse::<mime::Mime>()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_string());
    let filename = quoted(&encode_word(&sanitize_filename(&attachment.filename)));

    header(out, "Content-Type", &format!("{}; name={}", content_type, filename));
    header(out, "Content-Transfer-Encoding", "base64");
    header(out, "Content-Disposition", &format!("attachment; filename={}", filename));
    out.push_str(CRLF);
    out.push_str(&encode_wrapped(&attachment.data));
}

/// Drop characters that would break out of a quoted header parameter.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    if cleaned.trim().is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}

fn mailbox(address: &Address) -> String {
    match address.name() {
        Some(name) if name.is_ascii() => {
            if name.chars().any(|c| "()<>[]:;@\\,.\"".contains(c)) {
                format!("\"{}\" <{}>", name.replace(['"', '\\'], ""), address.email())
            } else {
                format!("{} <{}>", name, address.email())
            }
        }
        Some(name) => format!("{} <{}>", encode_word(name), address.email()),
        None => address.email().to_string(),
    }
}

fn mailbox_list(addresses: &[Address]) -> String {
    addresses.iter().map(mailbox).collect::<Vec<_>>().join(", ")
}

/// RFC 2047 encoded words for non-ASCII header text, split on character
/// boundaries and separated by spaces; ASCII passes through with line
/// breaks removed.
fn encode_word(value: &str) -> String {
    if value.is_ascii() {
        return value.replace(['\r', '\n'], " ");
    }

    let mut words = Vec::new();
    let mut rest = value;
    while !rest.is_empty() {
        let mut end = rest.len().min(WORD_BYTES);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (chunk, tail) = rest.split_at(end);
        words.push(format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk.as_bytes())));
        rest = tail;
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn email() -> Email {
        Email::new(Address::with_name("noreply@example.com", "Courier").unwrap(), "Verify your email")
            .to(Address::new("user@example.com").unwrap())
            .cc(Address::with_name("boss@example.com", "Boss, The").unwrap())
            .bcc(Address::new("audit@example.com").unwrap())
            .text("Hello")
            .html("<p>Hello</p>")
    }

    fn builder() -> MessageBuilder {
        MessageBuilder::new()
            .date(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
            .boundary("b1")
            .message_id("m1")
    }

    /// Body of the first part whose headers contain `marker`.
    fn part_body<'a>(message: &'a str, marker: &str) -> &'a str {
        let start = message.find(marker).unwrap();
        let body_start = start + message[start..].find("\r\n\r\n").unwrap() + 4;
        let body_end = body_start + message[body_start..].find("--").unwrap();
        &message[body_start..body_end]
    }

    fn decode(body: &str) -> Vec<u8> {
        STANDARD.decode(body.replace("\r\n", "")).unwrap()
    }

    #[test]
    fn test_headers() {
        let message = builder().build(&email());
        assert!(message.starts_with("From: Courier <noreply@example.com>\r\n"));
        assert!(message.contains("To: user@example.com\r\n"));
        assert!(message.contains("Cc: \"Boss, The\" <boss@example.com>\r\n"));
        assert!(message.contains("Subject: Verify your email\r\n"));
        assert!(message.contains("Date: Tue, 2 Jan 2024 03:04:05 +0000\r\n"));
        assert!(message.contains("Message-ID: <m1@example.com>\r\n"));
        assert!(message.contains("MIME-Version: 1.0\r\n"));
        assert!(message.contains("Content-Type: multipart/mixed; boundary=\"mixed-b1\"\r\n"));
        assert!(!message.contains("audit@example.com"));
        assert!(message.ends_with("--mixed-b1--\r\n"));
    }

    #[test]
    fn test_bodies_are_base64() {
        let message = builder().build(&email());
        assert_eq!(decode(part_body(&message, "text/plain")), b"Hello");
        assert_eq!(decode(part_body(&message, "text/html")), b"<p>Hello</p>");
        assert!(message.find("text/plain").unwrap() < message.find("text/html").unwrap());
    }

    #[test]
    fn test_attachment_round_trip() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let email = email().attach(Attachment::new("report.bin", "application/octet-stream", data.clone()));
        let message = builder().build(&email);

        assert!(message.contains(
            "Content-Disposition: attachment; filename=\"report.bin\"\r\n"
        ));
        let body = part_body(&message, "Content-Type: application/octet-stream");
        assert!(body.lines().all(|line| line.len() <= 76));
        assert_eq!(decode(body), data);
    }

    #[test]
    fn test_non_ascii_headers() {
        let mut email = email();
        email.subject = "Vérifiez votre e-mail".to_string();
        email.attachments.push(Attachment::new("résumé.pdf", "not a mime", b"x".to_vec()));
        let message = builder().build(&email);

        let encoded = STANDARD.encode("Vérifiez votre e-mail");
        assert!(message.contains(&format!("Subject: =?UTF-8?B?{}?=\r\n", encoded)));
        assert!(message.contains("Content-Type: application/octet-stream; name=\"=?UTF-8?B?"));
    }

    #[test]
    fn test_header_injection_is_neutralised() {
        let mut email = email();
        email.subject = "Hi\r\nBcc: x@evil.com".to_string();
        email.attachments.push(Attachment::new("a\"\r\nX: y.txt", "text/plain", b"x".to_vec()));
        let message = builder().build(&email);
        assert!(!message.contains("\r\nBcc:"));
        assert!(!message.contains("\r\nX: y"));
    }

    /// The Subject header with continuation lines unfolded.
    fn subject_header(message: &str) -> String {
        let start = message.find("\r\nSubject:").unwrap() + 2;
        let mut lines = message[start..].split("\r\n");
        let mut value = lines.next().unwrap().to_string();
        for line in lines.take_while(|line| line.starts_with(' ')) {
            value.push_str(line);
        }
        value
    }

    #[test]
    fn test_long_non_ascii_subject_is_split_and_folded() {
        let subject = "Überprüfen Sie Ihre E-Mail-Adresse, um Ihr Konto zu aktivieren. Grüße!".repeat(3);
        let mut email = email();
        email.subject = subject.clone();
        let message = builder().build(&email);

        let headers = &message[..message.find("\r\n\r\n").unwrap()];
        assert!(headers.split("\r\n").all(|line| line.len() <= MAX_LINE));

        let value = subject_header(&message);
        let words: Vec<&str> = value["Subject:".len()..].split_whitespace().collect();
        assert!(words.len() > 1);

        let mut decoded = String::new();
        for word in words {
            assert!(word.len() <= 75, "encoded word too long: {}", word);
            let payload = word.strip_prefix("=?UTF-8?B?").unwrap().strip_suffix("?=").unwrap();
            decoded.push_str(&String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap());
        }
        assert_eq!(decoded, subject);
    }

    #[test]
    fn test_long_ascii_subject_folds_at_spaces() {
        let subject = "Your weekly delivery report is ready to download".repeat(4);
        let mut email = email();
        email.subject = subject.clone();
        let message = builder().build(&email);

        let start = message.find("Subject:").unwrap();
        let end = start + message[start..].find("\r\nDate:").unwrap();
        let folded = &message[start..end];
        assert!(folded.contains("\r\n "));
        assert!(folded.split("\r\n").all(|line| line.len() <= MAX_LINE));
        assert_eq!(folded.replace("\r\n", ""), format!("Subject: {}", subject));
    }
}
