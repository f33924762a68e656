use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if the model credential is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: String,
    pub port: u16,
    /// Scratch directory for staged uploads. Created at boot if absent.
    pub upload_dir: PathBuf,
    /// Overall deadline for one model call, retries included.
    pub analysis_timeout: Duration,
    pub llm_max_retries: u32,
    /// Base delay before the first retry; doubles per attempt, plus jitter.
    pub llm_retry_backoff: Duration,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            google_api_key: require_env("GOOGLE_API_KEY")?,
            port: parse_env("PORT", 5000).context("PORT must be a valid port number")?,
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            analysis_timeout: Duration::from_secs(
                parse_env("ANALYSIS_TIMEOUT_SECS", 30)
                    .context("ANALYSIS_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            llm_max_retries: parse_env("LLM_MAX_RETRIES", 2)
                .context("LLM_MAX_RETRIES must be a non-negative integer")?,
            llm_retry_backoff: Duration::from_millis(
                parse_env("LLM_RETRY_BACKOFF_MS", 500)
                    .context("LLM_RETRY_BACKOFF_MS must be a whole number of milliseconds")?,
            ),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    let value = std::env::var(key)
        .with_context(|| format!("Required environment variable '{key}' is not set"))?;
    if value.trim().is_empty() {
        anyhow::bail!("Required environment variable '{key}' is empty");
    }
    Ok(value)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => Ok(raw.trim().parse::<T>()?),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_falls_back_to_default() {
        let value: u64 = parse_env("RESUME_ANALYZER_TEST_UNSET_VAR", 30).unwrap();
        assert_eq!(value, 30);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("RESUME_ANALYZER_TEST_BAD_PORT", "not-a-port");
        let result: Result<u16> = parse_env("RESUME_ANALYZER_TEST_BAD_PORT", 5000);
        assert!(result.is_err());
    }

    #[test]
    fn test_require_env_rejects_blank() {
        std::env::set_var("RESUME_ANALYZER_TEST_BLANK_KEY", "   ");
        assert!(require_env("RESUME_ANALYZER_TEST_BLANK_KEY").is_err());
    }

    #[test]
    fn test_require_env_missing_names_the_variable() {
        let err = require_env("RESUME_ANALYZER_TEST_MISSING_KEY").unwrap_err();
        assert!(err.to_string().contains("RESUME_ANALYZER_TEST_MISSING_KEY"));
    }
}
