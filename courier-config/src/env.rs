// Environment variable loading

use crate::{ConfigError, Result};
use serde_json::Value;
use std::env;

/// Separator between nesting levels in variable names
/// (`COURIER_SMTP__HOST` -> `smtp.host`).
pub const NESTING_SEPARATOR: &str = "__";

/// Environment variable loader
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Collect all variables carrying the prefix, with the prefix removed.
    pub fn load(&self) -> Vec<(String, String)> {
        self.filter(env::vars())
    }

    /// Select prefixed pairs from an arbitrary source.
    pub fn filter<I>(&self, vars: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{}_", self.prefix);
        let mut pairs: Vec<(String, String)> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&marker)
                    .map(|rest| (rest.to_string(), value))
            })
            .collect();
        pairs.sort();
        pairs
    }

    /// Apply the prefixed process environment to a configuration tree.
    pub fn apply(&self, config: &mut Value) -> Result<()> {
        apply_env(config, self.load())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new("COURIER")
    }
}

/// Overlay unprefixed `SECTION__KEY=value` pairs onto a configuration tree.
///
/// Only nested names are considered and the top-level section must already
/// exist, so single-segment variables such as `COURIER_LOG_LEVEL` are left to
/// other consumers. Values are coerced to the type already present at the
/// target path; absent or null targets receive the raw string.
pub fn apply_env<I>(config: &mut Value, pairs: I) -> Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, raw) in pairs {
        let path: Vec<String> = key
            .split(NESTING_SEPARATOR)
            .map(|segment| segment.to_lowercase())
            .collect();

        if path.len() < 2 || path.iter().any(|s| s.is_empty()) {
            continue;
        }

        let Some(Value::Object(section)) = config.get_mut(&path[0]) else {
            continue;
        };

        let mut slot = section;
        for segment in &path[1..path.len() - 1] {
            let entry = slot
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Default::default()));
            match entry {
                Value::Object(map) => slot = map,
                _ => {
                    return Err(ConfigError::Parse(format!(
                        "{} addresses a nested key below a scalar value",
                        key
                    )));
                }
            }
        }

        let leaf = &path[path.len() - 1];
        let coerced = coerce(slot.get(leaf), &raw)
            .map_err(|expected| ConfigError::Parse(format!("{}: expected {}", key, expected)))?;
        slot.insert(leaf.clone(), coerced);
    }

    Ok(())
}

fn coerce(existing: Option<&Value>, raw: &str) -> std::result::Result<Value, &'static str> {
    match existing {
        Some(Value::Bool(_)) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
            "0" | "false" | "no" | "off" => Ok(Value::Bool(false)),
            _ => Err("a boolean"),
        },
        Some(Value::Number(n)) if n.is_u64() => raw
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| "an unsigned integer"),
        Some(Value::Number(n)) if n.is_i64() => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| "an integer"),
        Some(Value::Number(_)) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or("a number"),
        Some(Value::Array(_)) => Ok(Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        )),
        Some(Value::Object(_)) => Err("a nested key, not a value"),
        Some(Value::String(_)) | Some(Value::Null) | None => Ok(Value::String(raw.to_string())),
    }
}
