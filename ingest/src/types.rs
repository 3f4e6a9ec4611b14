use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use timeline::rate_limit::RateLimit;
use timeline::ListingWindow;

/// OAuth configuration for a data source.
///
/// Declares the provider and scopes the host must obtain a token for. Token
/// acquisition itself happens outside this crate.
///
/// # Example
/// ```
/// use timeline_ingest::OAuthConfig;
///
/// let config = OAuthConfig {
///     provider_id: "google".to_string(),
///     scopes: vec!["https://www.googleapis.com/auth/calendar.readonly".to_string()],
/// };
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth provider the host should authenticate against
    pub provider_id: String,

    /// Required OAuth scopes for this data source
    pub scopes: Vec<String>,
}

/// Declarative registration metadata for one data source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    /// Stable identifier (e.g. "google_calendar")
    pub id: String,

    /// Human-readable name
    pub name: String,

    pub oauth: OAuthConfig,

    /// Outbound request budget shared by all listing tasks of the source
    pub rate_limit: RateLimit,
}

/// Options for one listing invocation.
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    /// Only records inside this window are requested
    pub timeframe: ListingWindow,

    /// Offline import file. Remote-only connectors reject this.
    pub filename: Option<PathBuf>,
}
