use crate::types::{DataSource, OAuthConfig};
use timeline::rate_limit::RateLimit;

pub const SOURCE_ID: &str = "google_calendar";
pub const SOURCE_NAME: &str = "Google Calendar";
pub const BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const OAUTH_PROVIDER: &str = "google";
pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar.readonly"];

/// Daily quota of 10,000 requests spread evenly over the day.
pub const REQUESTS_PER_HOUR: u32 = 10_000 / 24;
pub const BURST: u32 = 3;

/// Default and upper bound for `maxResults` on one listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 250;

pub const DEFAULT_CALENDAR: &str = "primary";

/// Registration metadata for the Google Calendar source.
pub fn data_source() -> DataSource {
    DataSource {
        id: SOURCE_ID.to_string(),
        name: SOURCE_NAME.to_string(),
        oauth: OAuthConfig {
            provider_id: OAUTH_PROVIDER.to_string(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        },
        rate_limit: RateLimit {
            requests_per_hour: REQUESTS_PER_HOUR,
            burst: BURST,
        },
    }
}
