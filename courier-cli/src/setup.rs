//! Builds runtime components from the loaded [`CourierConfig`].

use courier_config::{
    CourierConfig, MailSettings, QueueBackend, QueueSettings, SmtpSettings, WorkerSettings,
};
use courier_mail::{Address, SmtpConfig};
use courier_queue::{ClassWeights, Queue, QueueConfig, RedisStoreConfig, RetryPolicy, WorkerConfig};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{CliError, CliResult};

pub fn smtp_config(settings: &SmtpSettings) -> SmtpConfig {
    let mut smtp = SmtpConfig::new(&settings.host)
        .port(settings.port)
        .security(settings.security)
        .accept_invalid_certs(settings.accept_invalid_certs)
        .timeout(settings.timeout())
        .helo_name(&settings.helo_name);
    smtp.username = settings.username.clone();
    smtp.password = settings.password.clone();
    smtp
}

pub fn queue_config(settings: &QueueSettings) -> QueueConfig {
    let weights = &settings.weights;
    QueueConfig::default()
        .with_weights(ClassWeights::new(weights.critical, weights.default, weights.low))
        .with_max_attempts(settings.max_attempts)
        .with_retry_policy(RetryPolicy::new(settings.retry_base(), settings.retry_max()))
        .with_stale_after(settings.stale_after())
}

pub fn worker_config(settings: &WorkerSettings) -> WorkerConfig {
    WorkerConfig {
        concurrency: settings.concurrency,
        poll_interval: settings.poll_interval(),
        task_timeout: settings.task_timeout(),
        shutdown_grace: settings.shutdown_grace(),
        recover_interval: settings.recover_interval(),
    }
}

/// Connect to the configured queue backend.
pub async fn open_queue(config: &CourierConfig) -> CliResult<Queue> {
    let settings = &config.queue;
    let queue_config = queue_config(settings);

    match settings.backend {
        QueueBackend::Redis => {
            let store = RedisStoreConfig::new(&settings.redis_url).with_key_prefix(&settings.key_prefix);
            let queue = Queue::redis(store, queue_config).await?;
            info!(prefix = %settings.key_prefix, "connected to redis queue");
            Ok(queue)
        }
        QueueBackend::Memory => {
            warn!("using the in-memory queue; tasks do not outlive this process");
            Ok(Queue::in_memory(queue_config))
        }
    }
}

/// Default sender from the mail settings.
pub fn sender(settings: &MailSettings) -> CliResult<Address> {
    let address = match &settings.from_name {
        Some(name) => Address::with_name(&settings.from_email, name)?,
        None => Address::new(&settings.from_email)?,
    };
    Ok(address)
}

/// Merge a JSON object and `key=value` pairs into a template context.
///
/// Pair values are parsed as JSON when possible, so `count=3` is a number
/// and `name=Ada` a string.
pub fn template_context(json: Option<&str>, vars: &[String]) -> CliResult<Map<String, Value>> {
    let mut context = match json {
        Some(raw) => match serde_json::from_str(raw)? {
            Value::Object(map) => map,
            other => {
                return Err(CliError::InvalidArgument(format!(
                    "context must be a JSON object, got {}",
                    other
                )));
            }
        },
        None => Map::new(),
    };

    for var in vars {
        let (key, raw) = var
            .split_once('=')
            .ok_or_else(|| CliError::InvalidArgument(format!("expected KEY=VALUE, got {:?}", var)))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        context.insert(key.trim().to_string(), value);
    }

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_mail::SmtpSecurity;
    use std::time::Duration;

    #[test]
    fn test_smtp_mapping() {
        let mut config = CourierConfig::default();
        config.smtp.host = "relay.example.com".to_string();
        config.smtp.port = 465;
        config.smtp.security = SmtpSecurity::Tls;
        config.smtp.username = Some("courier".to_string());
        config.smtp.password = Some("secret".to_string());

        let smtp = smtp_config(&config.smtp);
        assert_eq!(smtp.address(), "relay.example.com:465");
        assert_eq!(smtp.security, SmtpSecurity::Tls);
        assert_eq!(smtp.username.as_deref(), Some("courier"));
        assert_eq!(smtp.password.as_deref(), Some("secret"));
        assert!(!smtp.accept_invalid_certs);
    }

    #[test]
    fn test_queue_and_worker_mapping() {
        let config = CourierConfig::default();
        let queue = queue_config(&config.queue);
        assert_eq!(queue.max_attempts, config.queue.max_attempts);
        assert_eq!(queue.weights, ClassWeights::new(6, 3, 1));

        let worker = worker_config(&config.worker);
        assert_eq!(worker.concurrency, config.worker.concurrency);
        assert_eq!(worker.shutdown_grace, Duration::from_secs(config.worker.shutdown_grace_secs));
        assert_eq!(worker.recover_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_sender() {
        let config = CourierConfig::default();
        let from = sender(&config.mail).unwrap();
        assert_eq!(from.email(), config.mail.from_email);
        assert_eq!(from.name(), config.mail.from_name.as_deref());
    }

    #[test]
    fn test_template_context() {
        let vars = vec!["Token=abc123".to_string(), "count=3".to_string()];
        let context = template_context(Some(r#"{"Name": "Ada"}"#), &vars).unwrap();
        assert_eq!(context["Name"], "Ada");
        assert_eq!(context["Token"], "abc123");
        assert_eq!(context["count"], 3);

        assert!(template_context(Some("[1, 2]"), &[]).is_err());
        assert!(template_context(None, &["novalue".to_string()]).is_err());
    }
}
