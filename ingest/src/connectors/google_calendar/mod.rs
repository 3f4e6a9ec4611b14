pub mod api;
pub mod config;
pub mod lister;
pub mod normalizer;

use crate::error::Result;
use crate::pipeline::{IngestionPipeline, ListingTask};
use crate::{Connector, DataSource, ListOptions};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use timeline::config::ListingConfig;
use timeline::rate_limit::RateLimiter;
use timeline::CommonItem;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use self::api::{CalendarClient, EventsApi};
use self::lister::CalendarLister;

/// Google Calendar connector. Lists upcoming events of the configured
/// calendars and emits them as CommonItems.
///
/// One limiter is shared by every calendar of the connector, so the request
/// budget holds for the source as a whole.
pub struct GoogleCalendarConnector {
    source: DataSource,
    api: Arc<dyn EventsApi>,
    limiter: Arc<RateLimiter>,
    calendars: Vec<String>,
    page_size: u32,
}

impl GoogleCalendarConnector {
    /// Create a connector against the real API using an authenticated client.
    pub fn new(http_client: Client, listing: &ListingConfig) -> Self {
        Self::with_api(Arc::new(CalendarClient::new(http_client)), listing)
    }

    /// Create a connector with a custom API base URL (for testing).
    pub fn with_base_url(http_client: Client, base_url: String, listing: &ListingConfig) -> Self {
        Self::with_api(
            Arc::new(CalendarClient::with_base_url(http_client, base_url)),
            listing,
        )
    }

    pub fn with_api(api: Arc<dyn EventsApi>, listing: &ListingConfig) -> Self {
        let source = config::data_source();
        let limiter = Arc::new(RateLimiter::new(source.rate_limit));
        let mut calendars: Vec<String> = listing
            .calendars
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if calendars.is_empty() {
            calendars.push(config::DEFAULT_CALENDAR.to_string());
        }

        Self {
            source,
            api,
            limiter,
            calendars,
            page_size: listing.page_size,
        }
    }

    pub fn calendars(&self) -> &[String] {
        &self.calendars
    }

    fn pipeline(&self) -> IngestionPipeline {
        let tasks = self
            .calendars
            .iter()
            .map(|calendar| {
                Arc::new(CalendarLister::new(
                    Arc::clone(&self.api),
                    Arc::clone(&self.limiter),
                    calendar.clone(),
                    self.page_size,
                )) as Arc<dyn ListingTask>
            })
            .collect();
        IngestionPipeline::new(self.source.id.clone(), tasks)
    }
}

#[async_trait]
impl Connector for GoogleCalendarConnector {
    fn data_source(&self) -> &DataSource {
        &self.source
    }

    async fn list_items(
        &self,
        cancel: CancellationToken,
        items: mpsc::Sender<CommonItem>,
        options: ListOptions,
    ) -> Result<()> {
        info!(
            source = %self.source.id,
            calendars = self.calendars.len(),
            window_start = ?options.timeframe.start,
            window_end = ?options.timeframe.end,
            "Listing items"
        );
        self.pipeline().run(cancel, items, options).await
    }
}
