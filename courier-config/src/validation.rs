// Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is within range
    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::Invalid(format!(
                "{} must be between {} and {} (got {})",
                field, min, max, value
            )));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of(value: &str, allowed: &[&str], field: &str) -> Result<()> {
        if !allowed.contains(&value) {
            return Err(ConfigError::Invalid(format!(
                "{} must be one of {} (got {:?})",
                field,
                allowed.join(", "),
                value
            )));
        }
        Ok(())
    }

    /// Validate URL format
    pub fn is_url(value: &str, field: &str) -> Result<()> {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "{} must be a valid URL",
                field
            )));
        }
        Ok(())
    }

    /// Validate a redis connection URL
    pub fn is_redis_url(value: &str, field: &str) -> Result<()> {
        if !value.starts_with("redis://")
            && !value.starts_with("rediss://")
            && !value.starts_with("redis+unix://")
        {
            return Err(ConfigError::Invalid(format!(
                "{} must be a redis:// or rediss:// URL",
                field
            )));
        }
        Ok(())
    }

    /// Validate email format (basic)
    pub fn is_email(value: &str, field: &str) -> Result<()> {
        let valid = value
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);

        if !valid {
            return Err(ConfigError::Invalid(format!(
                "{} must be a valid email",
                field
            )));
        }
        Ok(())
    }

    /// Validate port number
    pub fn is_port(value: u16, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must be a valid port number",
                field
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty_validation() {
        assert!(ConfigValidator::not_empty("value", "field").is_ok());
        assert!(ConfigValidator::not_empty("", "field").is_err());
        assert!(ConfigValidator::not_empty("  ", "field").is_err());
    }

    #[test]
    fn test_range_validation() {
        assert!(ConfigValidator::in_range(5, 1, 10, "field").is_ok());
        assert!(ConfigValidator::in_range(0, 1, 10, "field").is_err());
        let err = ConfigValidator::in_range(11, 1, 10, "worker.concurrency").unwrap_err();
        assert!(err.to_string().contains("between 1 and 10"));
    }

    #[test]
    fn test_one_of_validation() {
        let allowed = ["none", "starttls", "tls"];
        assert!(ConfigValidator::one_of("tls", &allowed, "field").is_ok());
        assert!(ConfigValidator::one_of("ssl", &allowed, "field").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(ConfigValidator::is_url("https://example.com", "field").is_ok());
        assert!(ConfigValidator::is_url("example.com", "field").is_err());
        assert!(ConfigValidator::is_redis_url("redis://127.0.0.1:6379", "field").is_ok());
        assert!(ConfigValidator::is_redis_url("http://127.0.0.1", "field").is_err());
    }

    #[test]
    fn test_email_validation() {
        assert!(ConfigValidator::is_email("noreply@example.com", "field").is_ok());
        assert!(ConfigValidator::is_email("@example.com", "field").is_err());
        assert!(ConfigValidator::is_email("noreply", "field").is_err());
    }

    #[test]
    fn test_port_validation() {
        assert!(ConfigValidator::is_port(8080, "field").is_ok());
        assert!(ConfigValidator::is_port(0, "field").is_err());
    }
}
