//! Print the effective configuration.

use courier_config::CourierConfig;

use crate::error::CliResult;

/// The configuration as TOML or JSON, secrets masked.
pub fn display(config: &CourierConfig, json: bool) -> CliResult<String> {
    let redacted = config.redacted();
    if json {
        Ok(serde_json::to_string_pretty(&redacted)?)
    } else {
        Ok(toml::to_string_pretty(&redacted)?)
    }
}

pub fn run(config: &CourierConfig, json: bool) -> CliResult<()> {
    println!("{}", display(config, json)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_masked() {
        let mut config = CourierConfig::default();
        config.smtp.username = Some("courier".to_string());
        config.smtp.password = Some("hunter2".to_string());

        for json in [false, true] {
            let out = display(&config, json).unwrap();
            assert!(!out.contains("hunter2"));
            assert!(out.contains("courier"));
        }

        let toml = display(&config, false).unwrap();
        assert!(toml.contains("[smtp]"));
        assert!(toml.contains("port = 587"));
    }
}
