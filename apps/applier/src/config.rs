use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_BACKEND_URL: &str = "http://localhost:8765";
const DEFAULT_SESSION_STORE_PATH: &str = ".applier/session.json";

/// Application configuration loaded from environment variables.
/// Every variable has a default except `MAX_CODE_ATTEMPTS`, which is
/// unlimited when unset.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub backend_timeout: Duration,
    pub bulk_apply_timeout: Duration,
    pub session_store_path: PathBuf,
    pub max_code_attempts: Option<NonZeroU32>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            backend_url: env_or("BACKEND_URL", DEFAULT_BACKEND_URL),
            backend_timeout: Duration::from_secs(parse_env("BACKEND_TIMEOUT_SECS", 30)?),
            bulk_apply_timeout: Duration::from_secs(parse_env("BULK_APPLY_TIMEOUT_SECS", 900)?),
            session_store_path: PathBuf::from(env_or(
                "SESSION_STORE_PATH",
                DEFAULT_SESSION_STORE_PATH,
            )),
            max_code_attempts: parse_attempt_limit(std::env::var("MAX_CODE_ATTEMPTS").ok())?,
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// A limit of zero would make verification impossible, so it is refused here.
fn parse_attempt_limit(raw: Option<String>) -> Result<Option<NonZeroU32>> {
    raw.map(|raw| {
        raw.trim()
            .parse::<NonZeroU32>()
            .with_context(|| format!("MAX_CODE_ATTEMPTS must be a positive integer, got '{raw}'"))
    })
    .transpose()
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_limit_unset_is_unlimited() {
        assert_eq!(parse_attempt_limit(None).unwrap(), None);
    }

    #[test]
    fn test_attempt_limit_accepts_positive_values() {
        assert_eq!(
            parse_attempt_limit(Some("3".to_string())).unwrap(),
            NonZeroU32::new(3)
        );
    }

    #[test]
    fn test_attempt_limit_rejects_zero_and_garbage() {
        for raw in ["0", "-1", "three"] {
            let err = parse_attempt_limit(Some(raw.to_string())).unwrap_err();
            assert!(err.to_string().contains("MAX_CODE_ATTEMPTS"));
        }
    }
}
