use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::faculty::DirectoryConfig;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or a value is out of range.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    /// Sampling temperature for match analysis and drafting.
    pub llm_temperature: f64,
    /// Optional: without it enrichment runs on scraped data only.
    pub serper_api_key: Option<String>,
    pub faculty_base_url: String,
    pub scraper_delay_ms: u64,
    pub scraper_timeout_secs: u64,
    /// Threshold applied when a run request does not carry `min_score`.
    pub default_min_score: f64,
    pub pipeline_concurrency: usize,
    pub upload_dir: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            llm_temperature: env_or("LLM_TEMPERATURE", 0.3)?,
            serper_api_key: std::env::var("SERPER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            faculty_base_url: std::env::var("FACULTY_BASE_URL")
                .unwrap_or_else(|_| "https://www.iitkgp.ac.in".to_string()),
            scraper_delay_ms: env_or("SCRAPER_DELAY_MS", 2000)?,
            scraper_timeout_secs: env_or("SCRAPER_TIMEOUT_SECS", 30)?,
            default_min_score: env_or("DEFAULT_MIN_SCORE", 0.3)?,
            pipeline_concurrency: env_or("PIPELINE_CONCURRENCY", 4)?,
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./data/uploads".to_string()),
            port: env_or("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_min_score) {
            bail!(
                "DEFAULT_MIN_SCORE must be between 0.0 and 1.0, got {}",
                self.default_min_score
            );
        }
        if !(0.0..=1.0).contains(&self.llm_temperature) {
            bail!(
                "LLM_TEMPERATURE must be between 0.0 and 1.0, got {}",
                self.llm_temperature
            );
        }
        if self.pipeline_concurrency == 0 {
            bail!("PIPELINE_CONCURRENCY must be at least 1");
        }
        if self.scraper_timeout_secs == 0 {
            bail!("SCRAPER_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }

    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            base_url: self.faculty_base_url.clone(),
            request_delay: Duration::from_millis(self.scraper_delay_ms),
            timeout: Duration::from_secs(self.scraper_timeout_secs),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    parse_setting(key, std::env::var(key).ok(), default)
}

/// Parses an optional raw value; unset or blank falls back to `default`.
fn parse_setting<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|e| anyhow!("Environment variable '{key}' has invalid value '{value}': {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            database_url: "postgres://localhost/outreach".to_string(),
            anthropic_api_key: "key".to_string(),
            llm_temperature: 0.3,
            serper_api_key: None,
            faculty_base_url: "https://www.iitkgp.ac.in".to_string(),
            scraper_delay_ms: 2000,
            scraper_timeout_secs: 30,
            default_min_score: 0.3,
            pipeline_concurrency: 4,
            upload_dir: "./data/uploads".to_string(),
            port: 8080,
            rust_log: "info".to_string(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_min_score_out_of_range_is_rejected() {
        let mut c = config();
        c.default_min_score = 1.5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_temperature_out_of_range_is_rejected() {
        let mut c = config();
        c.llm_temperature = -0.1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let mut c = config();
        c.pipeline_concurrency = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_parse_setting_falls_back_on_blank() {
        assert_eq!(parse_setting::<u64>("X", None, 7).unwrap(), 7);
        assert_eq!(parse_setting::<u64>("X", Some("  ".to_string()), 7).unwrap(), 7);
        assert_eq!(parse_setting::<u64>("X", Some(" 12 ".to_string()), 7).unwrap(), 12);
    }

    #[test]
    fn test_parse_setting_reports_key_on_error() {
        let err = parse_setting::<u16>("PORT", Some("eighty".to_string()), 8080).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_directory_config_uses_durations() {
        let dc = config().directory_config();
        assert_eq!(dc.request_delay, Duration::from_millis(2000));
        assert_eq!(dc.timeout, Duration::from_secs(30));
    }
}
