//! Error types for the Courier CLI.

use std::fmt;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Debug)]
pub enum CliError {
    /// IO error (signals, reading context files, etc.)
    Io(std::io::Error),

    /// Configuration could not be loaded or is invalid
    Config(courier_config::ConfigError),

    /// Queue operation failed
    Queue(courier_queue::QueueError),

    /// Rendering or delivery failed
    Mail(courier_mail::MailError),

    /// Invalid argument
    InvalidArgument(String),

    /// Output formatting failed
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Queue(e) => write!(f, "Queue error: {}", e),
            CliError::Mail(e) => write!(f, "Mail error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<courier_config::ConfigError> for CliError {
    fn from(e: courier_config::ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<courier_queue::QueueError> for CliError {
    fn from(e: courier_queue::QueueError) -> Self {
        CliError::Queue(e)
    }
}

impl From<courier_mail::MailError> for CliError {
    fn from(e: courier_mail::MailError) -> Self {
        CliError::Mail(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(e: toml::ser::Error) -> Self {
        CliError::Output(e.to_string())
    }
}
