use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the spreadsheet backend, e.g. `http://127.0.0.1:8000`.
    pub backend_url: String,
    pub backend_timeout: Duration,
    pub max_upload_bytes: usize,
    /// How long finished jobs and idle export sessions are kept.
    pub retention: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            backend_url: require_env("BACKEND_URL")?,
            backend_timeout: Duration::from_secs(parse_env("BACKEND_TIMEOUT_SECS", 600)?),
            max_upload_bytes: parse_env::<usize>("MAX_UPLOAD_MB", 50)? * 1024 * 1024,
            retention: Duration::from_secs(parse_env::<u64>("RETENTION_MINUTES", 120)? * 60),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}
