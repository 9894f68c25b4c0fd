//! SMTP client.
//!
//! One connection per send: dial, optional implicit TLS or STARTTLS, EHLO,
//! AUTH PLAIN, envelope, DATA, QUIT. Every failure names the protocol stage
//! it happened in.

use crate::error::SmtpStage;
use crate::message::MessageBuilder;
use crate::{Email, MailError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// SMTP security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// No encryption (local relays and tests only).
    None,
    /// STARTTLS upgrade (port 587).
    #[default]
    StartTls,
    /// Implicit TLS (port 465).
    Tls,
}

/// SMTP connection settings.
///
/// Serializable so a producer can embed per-request settings in a task.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username for authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for authentication.
    #[serde(default)]
    pub password: Option<String>,
    /// Security mode.
    #[serde(default)]
    pub security: SmtpSecurity,
    /// Skip certificate verification. Off unless explicitly enabled.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Per-step timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name sent with EHLO.
    #[serde(default = "default_helo_name")]
    pub helo_name: String,
}

fn default_port() -> u16 {
    587
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("security", &self.security)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout_secs", &self.timeout_secs)
            .field("helo_name", &self.helo_name)
            .finish()
    }
}

impl SmtpConfig {
    /// Create a new SMTP configuration.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: None,
            password: None,
            security: SmtpSecurity::StartTls,
            accept_invalid_certs: false,
            timeout_secs: default_timeout_secs(),
            helo_name: default_helo_name(),
        }
    }

    /// Set credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the security mode.
    pub fn security(mut self, security: SmtpSecurity) -> Self {
        self.security = security;
        self
    }

    /// Accept invalid TLS certificates. Only for development relays.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Set the per-step timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the EHLO name.
    pub fn helo_name(mut self, name: impl Into<String>) -> Self {
        self.helo_name = name.into();
        self
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// A parsed server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is_positive(&self) -> bool {
        (200..400).contains(&self.code)
    }

    /// Whether an EHLO reply advertises an extension keyword.
    fn has_extension(&self, keyword: &str) -> bool {
        self.lines.iter().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        })
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" "))
    }
}

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

type Stream = BufReader<Box<dyn AsyncStream>>;

/// Longest reply line accepted, CRLF included.
const MAX_REPLY_LINE: usize = 2048;

/// Most lines accepted in one multi-line reply.
const MAX_REPLY_LINES: usize = 128;

/// Sends composed emails over SMTP.
#[derive(Debug, Clone)]
pub struct SmtpClient {
    config: SmtpConfig,
}

impl SmtpClient {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    /// Deliver one email on a fresh connection.
    pub async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;
        let message = MessageBuilder::new().build(email);

        let mut session = Session::connect(&self.config).await?;
        session.expect(SmtpStage::Greeting, &[220]).await?;
        let mut ehlo = session.ehlo().await?;

        if self.config.security == SmtpSecurity::StartTls {
            if !ehlo.has_extension("STARTTLS") {
                return Err(MailError::TlsNegotiation {
                    host: self.config.host.clone(),
                    reason: "server does not offer STARTTLS".to_string(),
                });
            }
            session
                .command("STARTTLS", SmtpStage::StartTls, &[220])
                .await?;
            session = session.upgrade().await?;
            ehlo = session.ehlo().await?;
        }

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            if self.config.security == SmtpSecurity::None {
                warn!(host = %self.config.host, "sending SMTP credentials without TLS");
            }
            if !ehlo.has_extension("AUTH") {
                debug!(host = %self.config.host, "server does not advertise AUTH, trying anyway");
            }
            let token = STANDARD.encode(format!("\0{}\0{}", username, password));
            session
                .command(&format!("AUTH PLAIN {}", token), SmtpStage::Auth, &[235])
                .await?;
        }

        session
            .command(
                &format!("MAIL FROM:<{}>", email.from.email()),
                SmtpStage::MailFrom,
                &[250],
            )
            .await?;

        for recipient in email.recipients() {
            let reply = session
                .send_line(&format!("RCPT TO:<{}>", recipient.email()), SmtpStage::RcptTo)
                .await?;
            if !matches!(reply.code, 250 | 251) {
                return Err(MailError::RecipientRejected {
                    recipient: recipient.email().to_string(),
                    reply: reply.to_string(),
                });
            }
        }

        session.command("DATA", SmtpStage::Data, &[354]).await?;
        session.write_data(&message).await?;
        session.expect(SmtpStage::Data, &[250]).await?;

        if let Err(e) = session.command("QUIT", SmtpStage::Quit, &[221]).await {
            debug!(error = %e, "QUIT failed after successful delivery");
        }

        debug!(
            host = %self.config.host,
            recipients = email.recipients().count(),
            bytes = message.len(),
            "SMTP delivery accepted"
        );
        Ok(())
    }
}

struct Session<'a> {
    config: &'a SmtpConfig,
    stream: Stream,
    timeout: Duration,
}

impl<'a> Session<'a> {
    async fn connect(config: &'a SmtpConfig) -> Result<Session<'a>> {
        let timeout = config.step_timeout();
        let address = config.address();

        let tcp = match tokio::time::timeout(
            timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(e)) => {
                return Err(MailError::TransportDial {
                    address,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(MailError::TransportDial {
                    address,
                    reason: "connection timed out".to_string(),
                });
            }
        };
        debug!(address = %address, "SMTP connected");

        let stream: Box<dyn AsyncStream> = if config.security == SmtpSecurity::Tls {
            Box::new(tls_connect(config, Box::new(tcp), timeout).await?)
        } else {
            Box::new(tcp)
        };

        Ok(Session {
            config,
            stream: BufReader::new(stream),
            timeout,
        })
    }

    async fn upgrade(self) -> Result<Session<'a>> {
        let inner = self.stream.into_inner();
        let tls = tls_connect(self.config, inner, self.timeout).await?;
        Ok(Session {
            config: self.config,
            stream: BufReader::new(Box::new(tls)),
            timeout: self.timeout,
        })
    }

    async fn ehlo(&mut self) -> Result<Reply> {
        let line = format!("EHLO {}", self.config.helo_name);
        self.command(&line, SmtpStage::Ehlo, &[250]).await
    }

    async fn write_all(&mut self, bytes: &[u8], stage: SmtpStage) -> Result<()> {
        let stream = self.stream.get_mut();
        let write = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        };
        match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if stage == SmtpStage::Data => Err(MailError::AttachmentWrite(e.to_string())),
            Ok(Err(e)) => Err(MailError::Smtp {
                stage,
                message: e.to_string(),
            }),
            Err(_) => Err(MailError::Timeout(stage)),
        }
    }

    async fn read_reply(&mut self, stage: SmtpStage) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            if lines.len() >= MAX_REPLY_LINES {
                return Err(MailError::Smtp {
                    stage,
                    message: format!("reply exceeds {} lines", MAX_REPLY_LINES),
                });
            }

            let mut line = String::new();
            let mut limited = (&mut self.stream).take(MAX_REPLY_LINE as u64);
            let read = match tokio::time::timeout(self.timeout, limited.read_line(&mut line)).await {
                Ok(read) => read.map_err(|e| MailError::Smtp {
                    stage,
                    message: e.to_string(),
                })?,
                Err(_) => return Err(MailError::Timeout(stage)),
            };
            if read == 0 {
                return Err(MailError::Smtp {
                    stage,
                    message: "connection closed by server".to_string(),
                });
            }
            if !line.ends_with('\n') && read >= MAX_REPLY_LINE {
                return Err(MailError::Smtp {
                    stage,
                    message: format!("reply line exceeds {} bytes", MAX_REPLY_LINE),
                });
            }

            let line = line.trim_end_matches(['\r', '\n']);
            let code = line
                .get(..3)
                .and_then(|c| c.parse::<u16>().ok())
                .ok_or_else(|| MailError::Smtp {
                    stage,
                    message: format!("malformed reply: {:?}", line),
                })?;
            lines.push(line.get(4..).unwrap_or("").to_string());

            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok(Reply { code, lines });
            }
        }
    }

    /// Read a reply and require one of `codes`.
    async fn expect(&mut self, stage: SmtpStage, codes: &[u16]) -> Result<Reply> {
        let reply = self.read_reply(stage).await?;
        check(reply, stage, codes)
    }

    async fn send_line(&mut self, line: &str, stage: SmtpStage) -> Result<Reply> {
        self.write_all(format!("{}\r\n", line).as_bytes(), stage).await?;
        self.read_reply(stage).await
    }

    async fn command(&mut self, line: &str, stage: SmtpStage, codes: &[u16]) -> Result<Reply> {
        let reply = self.send_line(line, stage).await?;
        check(reply, stage, codes)
    }

    async fn write_data(&mut self, message: &str) -> Result<()> {
        let mut data = dot_stuff(message);
        data.push_str(".\r\n");
        self.write_all(data.as_bytes(), SmtpStage::Data).await
    }
}

fn check(reply: Reply, stage: SmtpStage, codes: &[u16]) -> Result<Reply> {
    if codes.contains(&reply.code) {
        return Ok(reply);
    }
    Err(match stage {
        SmtpStage::Auth => MailError::Auth(reply.to_string()),
        _ => MailError::Smtp {
            stage,
            message: reply.to_string(),
        },
    })
}

async fn tls_connect(
    config: &SmtpConfig,
    stream: Box<dyn AsyncStream>,
    timeout: Duration,
) -> Result<tokio_native_tls::TlsStream<Box<dyn AsyncStream>>> {
    let tls_error = |reason: String| MailError::TlsNegotiation {
        host: config.host.clone(),
        reason,
    };

    let mut builder = native_tls::TlsConnector::builder();
    if config.accept_invalid_certs {
        warn!(host = %config.host, "TLS certificate verification is disabled");
        builder.danger_accept_invalid_certs(true);
    }
    let connector = builder.build().map_err(|e| tls_error(e.to_string()))?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    match tokio::time::timeout(timeout, connector.connect(&config.host, stream)).await {
        Ok(Ok(tls)) => Ok(tls),
        Ok(Err(e)) => Err(tls_error(e.to_string())),
        Err(_) => Err(tls_error("handshake timed out".to_string())),
    }
}

/// Normalise line endings to CRLF and escape lines starting with a dot.
/// The result always ends with CRLF.
fn dot_stuff(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 64);
    for line in message.lines() {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}
