//! Configuration management for the Courier email pipeline.
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults ([`CourierConfig::default`])
//! 2. an optional JSON or TOML file
//! 3. a `.env` file in the working directory (never overrides real variables)
//! 4. `COURIER_`-prefixed environment variables, `__` selecting nested keys
//!
//! ```rust,no_run
//! use courier_config::CourierConfig;
//!
//! let config = CourierConfig::load(None)?;
//! println!("delivering through {}:{}", config.smtp.host, config.smtp.port);
//! # Ok::<(), courier_config::ConfigError>(())
//! ```

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::{EnvLoader, apply_env};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat, merge};
pub use settings::{
    CourierConfig, MailSettings, QueueBackend, QueueSettings, SmtpSecurity, SmtpSettings,
    TransportKind, WeightSettings, WorkerSettings,
};
pub use validation::{ConfigValidator, Validate};

use std::path::Path;

impl CourierConfig {
    /// Load from defaults, `path`, `.env` and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(file) => tracing::debug!(path = %file.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ConfigError::DotEnv(e.to_string())),
        }

        Self::load_from(path, EnvLoader::default().load())
    }

    /// Load from defaults, `path` and explicit unprefixed environment pairs.
    pub fn load_from<I>(path: Option<&Path>, env_pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut value = serde_json::to_value(Self::default())
            .map_err(|e| ConfigError::Shape(e.to_string()))?;

        if let Some(path) = path {
            let file = ConfigLoader::auto(path)?.load_file(path)?;
            merge(&mut value, file);
            tracing::debug!(path = %path.display(), "loaded configuration file");
        }

        apply_env(&mut value, env_pairs)?;

        let config: Self = serde_json::from_value(value)
            .map_err(|e| ConfigError::Shape(e.to_string()))?;
        config.validate()?;

        Ok(config)
    }
}
