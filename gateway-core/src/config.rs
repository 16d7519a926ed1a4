//! Process-wide configuration loaded from the environment (spec.md §6,
//! SPEC_FULL.md §6). Fail-fast: a required variable missing or malformed is
//! a startup error, never a runtime surprise.

use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing required environment variable {key}"),
            ConfigError::Invalid { key, reason } => {
                write!(f, "invalid value for environment variable {key}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Gateway process configuration. Constructed once at startup via
/// [`GatewayConfig::from_env`] and shared read-only thereafter.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 32-byte master encryption key (see gateway-crypto).
    pub master_key: [u8; 32],
    pub database_url: String,
    pub bind_addr: String,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl GatewayConfig {
    /// Load configuration from the process environment, first merging in a
    /// `.env` file if present (dotenvy, as the teacher's example apps do).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let master_key_hex = require_env("GATEWAY_MASTER_KEY")?;
        let master_key = parse_master_key(&master_key_hex)?;

        let database_url = require_env("DATABASE_URL")?;

        let bind_addr = std::env::var("GATEWAY_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let request_timeout_secs = optional_env_parse::<u64>(
            "GATEWAY_REQUEST_TIMEOUT_SECS",
            30,
        )?;

        let max_body_bytes = optional_env_parse::<usize>(
            "GATEWAY_MAX_BODY_BYTES",
            1_048_576,
        )?;

        Ok(Self {
            master_key,
            database_url,
            bind_addr,
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_body_bytes,
        })
    }
}

fn require_env(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional_env_parse<T: std::str::FromStr>(
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid {
            key,
            reason: "not a valid number".to_string(),
        }),
    }
}

fn parse_master_key(hex_str: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(hex_str.trim()).map_err(|_| ConfigError::Invalid {
        key: "GATEWAY_MASTER_KEY",
        reason: "must be hex-encoded".to_string(),
    })?;
    bytes.try_into().map_err(|_| ConfigError::Invalid {
        key: "GATEWAY_MASTER_KEY",
        reason: "must decode to exactly 32 bytes".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_master_key_accepts_64_hex_chars() {
        let hex_str = "ab".repeat(32);
        let key = parse_master_key(&hex_str).unwrap();
        assert_eq!(key.len(), 32);
        assert_eq!(key[0], 0xab);
    }

    #[test]
    fn parse_master_key_rejects_non_hex() {
        assert!(matches!(
            parse_master_key("not-hex-at-all!!"),
            Err(ConfigError::Invalid { key: "GATEWAY_MASTER_KEY", .. })
        ));
    }

    #[test]
    fn parse_master_key_rejects_wrong_length() {
        assert!(matches!(
            parse_master_key("abcd"),
            Err(ConfigError::Invalid { key: "GATEWAY_MASTER_KEY", .. })
        ));
    }
}
