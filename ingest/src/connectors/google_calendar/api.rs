use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::config::BASE_URL;
use crate::error::{IngestError, Result};
use crate::fetcher::read_snippet;

/// Bytes of an error response kept in listing error messages.
const ERROR_BODY_LIMIT: usize = 1024;

/// One page of `GET /calendars/{id}/events`.
///
/// Records stay raw JSON here and are decoded one by one, so a single
/// mistyped record cannot fail the whole page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsPage {
    #[serde(default)]
    pub items: Vec<Value>,
    pub next_page_token: Option<String>,
}

/// The subset of a calendar event needed to build a CommonItem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventRecord {
    pub id: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Free-form text, never coordinates.
    pub location: Option<String>,
    pub html_link: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub start: Option<EventDateTime>,
    pub end: Option<EventDateTime>,
    pub creator: Option<EventPerson>,
    pub organizer: Option<EventPerson>,
    pub attendees: Vec<EventAttendee>,
    pub attachments: Vec<EventAttachment>,
    /// Present on media-bearing records only.
    pub base_url: Option<String>,
    pub mime_type: Option<String>,
    pub media_metadata: Option<MediaMetadata>,
}

/// Either `date` (all-day, `yyyy-mm-dd`) or `dateTime` (RFC3339) is set.
///
/// `timeZone` is an IANA name. It resolves a `dateTime` sent without an
/// offset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDateTime {
    pub date: Option<String>,
    pub date_time: Option<String>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventPerson {
    pub id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "self")]
    pub is_self: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventAttendee {
    pub id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub organizer: bool,
    pub resource: bool,
    pub optional: bool,
    /// "needsAction", "declined", "tentative" or "accepted"
    pub response_status: Option<String>,
    #[serde(rename = "self")]
    pub is_self: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventAttachment {
    pub file_url: String,
    pub title: Option<String>,
    pub mime_type: Option<String>,
    pub file_id: Option<String>,
}

/// Media facts. Width and height arrive as decimal text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaMetadata {
    pub creation_time: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub photo: Option<PhotoMetadata>,
    pub video: Option<VideoMetadata>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhotoMetadata {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub focal_length: Option<f64>,
    pub aperture_f_number: Option<f64>,
    pub iso_equivalent: Option<u32>,
    /// Duration text such as "0.008s".
    pub exposure_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoMetadata {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub fps: Option<f64>,
    /// Processing status; content is downloadable only when "READY".
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parameters of one listing request.
///
/// Deleted records and recurring-series masters are always excluded, and
/// results are ordered by start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsQuery {
    pub time_min: DateTime<Utc>,
    pub time_max: Option<DateTime<Utc>>,
    pub max_results: u32,
    pub page_token: Option<String>,
}

impl EventsQuery {
    /// Query-string pairs, continuation token last.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("showDeleted", "false".to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", self.max_results.to_string()),
            ("timeMin", format_time(&self.time_min)),
        ];
        if let Some(time_max) = &self.time_max {
            params.push(("timeMax", format_time(time_max)));
        }
        if let Some(token) = &self.page_token {
            params.push(("pageToken", token.clone()));
        }
        params
    }
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The remote listing call, as seen by the lister.
#[async_trait]
pub trait EventsApi: Send + Sync {
    async fn list_events(&self, calendar_id: &str, query: &EventsQuery) -> Result<EventsPage>;
}

/// HTTP client for the Google Calendar v3 REST API.
///
/// Expects an already-authenticated `reqwest::Client` (see
/// [`authenticated_client`](crate::transport::authenticated_client)).
pub struct CalendarClient {
    http_client: Client,
    base_url: String,
}

impl CalendarClient {
    /// Create a client using the default Google Calendar API base URL.
    pub fn new(http_client: Client) -> Self {
        Self::with_base_url(http_client, BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing with a mock server).
    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl EventsApi for CalendarClient {
    async fn list_events(&self, calendar_id: &str, query: &EventsQuery) -> Result<EventsPage> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );
        let response = self
            .http_client
            .get(&url)
            .query(&query.to_params())
            .send()
            .await
            .map_err(|e| IngestError::Transport(format!("sending list events request: {}", e)))?;

        let response = check_response_status(response).await?;
        response
            .json::<EventsPage>()
            .await
            .map_err(|e| IngestError::Transport(format!("malformed list events response: {}", e)))
    }
}

/// Check the response status and map known error codes to descriptive errors.
///
/// - 401 → auth error (token expired or invalid)
/// - 403/429 → quota or permission error
/// - Other non-2xx → generic API error
async fn check_response_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = read_snippet(response, ERROR_BODY_LIMIT).await;

    let message = match status {
        StatusCode::UNAUTHORIZED => {
            "Google Calendar auth error: token expired or invalid".to_string()
        }
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            format!("Google Calendar quota or permission error ({}): {}", status, body)
        }
        _ => format!("Google Calendar API error: {}: {}", status, body),
    };
    Err(IngestError::Transport(message))
}
