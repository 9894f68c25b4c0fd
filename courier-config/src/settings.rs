// Typed settings for the delivery pipeline

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, Result};
pub use courier_mail::{SmtpSecurity, TransportKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const REDACTED: &str = "********";

/// Complete process configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub smtp: SmtpSettings,
    pub queue: QueueSettings,
    pub worker: WorkerSettings,
    pub mail: MailSettings,
}

impl CourierConfig {
    /// Copy suitable for printing, with secrets masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.smtp.password.is_some() {
            copy.smtp.password = Some(REDACTED.to_string());
        }
        copy
    }
}

impl Validate for CourierConfig {
    fn validate(&self) -> Result<()> {
        self.smtp.validate()?;
        self.queue.validate()?;
        self.worker.validate()?;
        self.mail.validate()?;

        // A task still inside its handler timeout must never look stale.
        if self.queue.stale_after_secs <= self.worker.task_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "queue.stale_after_secs ({}) must be greater than worker.task_timeout_secs ({})",
                self.queue.stale_after_secs, self.worker.task_timeout_secs
            )));
        }
        Ok(())
    }
}

// ========== SMTP ==========

/// Default SMTP server used when a task carries no settings of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security: SmtpSecurity,
    pub accept_invalid_certs: bool,
    pub timeout_secs: u64,
    pub helo_name: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            security: SmtpSecurity::StartTls,
            accept_invalid_certs: false,
            timeout_secs: 30,
            helo_name: "localhost".to_string(),
        }
    }
}

impl SmtpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Validate for SmtpSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.host, "smtp.host")?;
        ConfigValidator::is_port(self.port, "smtp.port")?;
        ConfigValidator::in_range(self.timeout_secs, 1, 600, "smtp.timeout_secs")?;
        ConfigValidator::not_empty(&self.helo_name, "smtp.helo_name")?;
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::Invalid(
                "smtp.password is set but smtp.username is not".to_string(),
            ));
        }
        Ok(())
    }
}

// ========== Queue ==========

/// Where queued tasks are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Redis,
    /// In-process only; tasks are lost on exit
    Memory,
}

/// Relative share of dequeues per priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightSettings {
    pub critical: u32,
    pub default: u32,
    pub low: u32,
}

impl Default for WeightSettings {
    fn default() -> Self {
        Self {
            critical: 6,
            default: 3,
            low: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub backend: QueueBackend,
    pub redis_url: String,
    pub key_prefix: String,
    pub weights: WeightSettings,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub stale_after_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "courier:queue".to_string(),
            weights: WeightSettings::default(),
            max_attempts: 3,
            retry_base_ms: 10_000,
            retry_max_ms: 3_600_000,
            stale_after_secs: 600,
        }
    }
}

impl QueueSettings {
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Validate for QueueSettings {
    fn validate(&self) -> Result<()> {
        if self.backend == QueueBackend::Redis {
            ConfigValidator::is_redis_url(&self.redis_url, "queue.redis_url")?;
        }
        ConfigValidator::not_empty(&self.key_prefix, "queue.key_prefix")?;

        let w = self.weights;
        if w.critical == 0 && w.default == 0 && w.low == 0 {
            return Err(ConfigError::Invalid(
                "queue.weights must not all be zero".to_string(),
            ));
        }

        ConfigValidator::in_range(self.max_attempts, 1, 100, "queue.max_attempts")?;
        if self.retry_max_ms < self.retry_base_ms {
            return Err(ConfigError::Invalid(
                "queue.retry_max_ms must not be smaller than queue.retry_base_ms".to_string(),
            ));
        }
        ConfigValidator::in_range(self.stale_after_secs, 1, u64::MAX, "queue.stale_after_secs")
    }
}

// ========== Worker ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub task_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub recover_interval_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval_ms: 1_000,
            task_timeout_secs: 300,
            shutdown_grace_secs: 30,
            recover_interval_secs: 60,
        }
    }
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Zero disables the periodic stale-task sweep.
    pub fn recover_interval(&self) -> Duration {
        Duration::from_secs(self.recover_interval_secs)
    }
}

impl Validate for WorkerSettings {
    fn validate(&self) -> Result<()> {
        ConfigValidator::in_range(self.concurrency, 1, 1024, "worker.concurrency")?;
        ConfigValidator::in_range(self.poll_interval_ms, 1, 60_000, "worker.poll_interval_ms")?;
        ConfigValidator::in_range(self.task_timeout_secs, 1, 86_400, "worker.task_timeout_secs")?;
        ConfigValidator::in_range(self.recover_interval_secs, 0, 86_400, "worker.recover_interval_secs")
    }
}

// ========== Mail ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub template_dir: PathBuf,
    pub from_email: String,
    pub from_name: Option<String>,
    pub app_url: String,
    pub transport: TransportKind,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("templates"),
            from_email: "noreply@example.com".to_string(),
            from_name: Some("Courier".to_string()),
            app_url: "http://localhost:8080".to_string(),
            transport: TransportKind::Smtp,
        }
    }
}

impl Validate for MailSettings {
    fn validate(&self) -> Result<()> {
        if self.template_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "mail.template_dir cannot be empty".to_string(),
            ));
        }
        ConfigValidator::is_email(&self.from_email, "mail.from_email")?;
        ConfigValidator::is_url(&self.app_url, "mail.app_url")
    }
}
