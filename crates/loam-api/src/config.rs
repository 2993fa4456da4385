use std::collections::HashMap;
use std::env;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_token: String,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

impl AppConfig {
    pub fn new(bind_addr: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            api_token: api_token.into(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "LOAM_API_BIND_ADDR", "127.0.0.1:8088");
        if !bind_addr.contains(':') {
            return Err(ConfigError::Invalid(
                "LOAM_API_BIND_ADDR must be in host:port form".to_string(),
            ));
        }

        let api_token = required_trimmed(&lookup, "LOAM_API_TOKEN")?;
        if api_token.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "LOAM_API_TOKEN must not contain whitespace".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            api_token,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
