//! Typed environment-variable lookups

use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading configuration from the environment
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvError {
    #[error("Missing required environment variable {0}")]
    Missing(String),

    #[error("Invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

/// Read a variable, trimmed. Unset or non-unicode values yield `None`.
pub fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}

/// Read a variable that must be present and non-empty
pub fn required(name: &str) -> Result<String, EnvError> {
    match var(name) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(EnvError::Missing(name.to_string())),
    }
}

/// Read a string variable, falling back to `default` when unset or empty
pub fn string_or(name: &str, default: &str) -> String {
    match var(name) {
        Some(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// Parse a variable, falling back to `default` when unset or empty
pub fn parse_or<T>(name: &str, default: T) -> Result<T, EnvError>
where
    T: FromStr,
    T::Err: Display,
{
    match var(name) {
        Some(value) if !value.is_empty() => value.parse().map_err(|e: T::Err| EnvError::Invalid {
            name: name.to_string(),
            value,
            reason: e.to_string(),
        }),
        _ => Ok(default),
    }
}

/// Parse a boolean flag, accepting `true/false`, `1/0`, `yes/no` and `on/off`
pub fn flag_or(name: &str, default: bool) -> Result<bool, EnvError> {
    let Some(value) = var(name).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };

    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(EnvError::Invalid {
            name: name.to_string(),
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}
