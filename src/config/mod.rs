use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Complete Timeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineConfig {
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Listing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    /// Maximum records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Calendars to list; one listing task runs per calendar
    #[serde(default = "default_calendars")]
    pub calendars: Vec<String>,
    /// Capacity of the bounded output channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_page_size() -> u32 {
    10
}

fn default_calendars() -> Vec<String> {
    vec!["primary".to_string()]
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            calendars: default_calendars(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Content download configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after a transport-level failure (seconds)
    #[serde(default = "default_transport_retry_secs")]
    pub transport_retry_secs: u64,
    /// Delay after a non-success HTTP status (seconds)
    #[serde(default = "default_status_retry_secs")]
    pub status_retry_secs: u64,
    /// Upper bound on the response body kept in error messages
    #[serde(default = "default_max_error_body_bytes")]
    pub max_error_body_bytes: usize,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_transport_retry_secs() -> u64 {
    30
}

fn default_status_retry_secs() -> u64 {
    15
}

fn default_max_error_body_bytes() -> usize {
    256 * 1024
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            transport_retry_secs: default_transport_retry_secs(),
            status_retry_secs: default_status_retry_secs(),
            max_error_body_bytes: default_max_error_body_bytes(),
        }
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_user_agent() -> String {
    "timeline-connector/1.0".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<TimelineConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: TimelineConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TimelineConfig::default();
        assert_eq!(config.listing.page_size, 10);
        assert_eq!(config.listing.calendars, vec!["primary"]);
        assert_eq!(config.listing.channel_capacity, 64);
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(config.fetch.transport_retry_secs, 30);
        assert_eq!(config.fetch.status_retry_secs, 15);
        assert_eq!(config.fetch.max_error_body_bytes, 262144);
        assert_eq!(config.api.base_url, "https://www.googleapis.com/calendar/v3");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TimelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.listing.page_size, 10);
        assert_eq!(config.fetch.max_attempts, 5);
    }

    #[test]
    fn test_partial_override() {
        let toml_str = r#"
            [listing]
            page_size = 5
            calendars = ["primary", "team@example.com"]

            [fetch]
            status_retry_secs = 1
        "#;
        let config: TimelineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.listing.page_size, 5);
        assert_eq!(config.listing.calendars.len(), 2);
        assert_eq!(config.listing.channel_capacity, 64);
        assert_eq!(config.fetch.status_retry_secs, 1);
        assert_eq!(config.fetch.transport_retry_secs, 30);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nbase_url = \"http://localhost:9999\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:9999");
        assert_eq!(config.api.user_agent, "timeline-connector/1.0");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/timeline.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
