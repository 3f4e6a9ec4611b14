use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use timeline::config::{load_config, TimelineConfig};
use timeline::ListingWindow;
use timeline_ingest::connectors::google_calendar::normalizer::{parse_date, parse_rfc3339};
use timeline_ingest::connectors::google_calendar::{config::SOURCE_ID, GoogleCalendarConnector};
use timeline_ingest::transport::authenticated_client;
use timeline_ingest::{ListOptions, SourceRegistry};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timeline_ingest=info,timeline=info".into()),
        )
        .init();

    info!("Timeline ingest starting...");

    // Read configuration from environment
    let config = match std::env::var("TIMELINE_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => TimelineConfig::default(),
    };

    let access_token = std::env::var("TIMELINE_ACCESS_TOKEN")
        .context("TIMELINE_ACCESS_TOKEN is required (OAuth bearer token)")?;

    let window = ListingWindow::new(
        window_bound("TIMELINE_WINDOW_START")?,
        window_bound("TIMELINE_WINDOW_END")?,
    );

    info!(
        base_url = %config.api.base_url,
        calendars = ?config.listing.calendars,
        page_size = config.listing.page_size,
        window_start = ?window.start,
        window_end = ?window.end,
        "Configuration loaded"
    );

    let client = authenticated_client(&access_token, &config.api.user_agent)
        .context("Failed to build HTTP client")?;

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(GoogleCalendarConnector::with_base_url(
        client,
        config.api.base_url.clone(),
        &config.listing,
    )))?;
    let connector = registry
        .get(SOURCE_ID)
        .context("Google Calendar connector is not registered")?;

    let (tx, rx) = mpsc::channel::<timeline::CommonItem>(config.listing.channel_capacity.max(1));
    let cancel = CancellationToken::new();

    // Print every item as one JSON line
    let consumer = tokio::spawn(async move {
        let mut items = ReceiverStream::new(rx);
        let mut count = 0usize;
        while let Some(item) = items.next().await {
            match serde_json::to_string(&item) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(item = %item.id, error = %e, "Failed to serialize item"),
            }
            count += 1;
        }
        count
    });

    // Cancel listing on ctrl_c
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_cancel.cancel();
        }
    });

    let options = ListOptions {
        timeframe: window,
        filename: None,
    };
    let result = connector.list_items(cancel, tx, options).await;
    let count = consumer.await.context("Item consumer task failed")?;

    match result {
        Ok(()) => {
            info!(items = count, "Listing complete");
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            info!(items = count, "Listing cancelled");
            Ok(())
        }
        Err(e) => {
            error!(items = count, error = %e, "Listing failed");
            Err(e.into())
        }
    }
}

/// Reads an optional window bound, accepting RFC3339 or `YYYY-MM-DD`.
fn window_bound(var: &'static str) -> Result<Option<DateTime<Utc>>> {
    let Ok(value) = std::env::var(var) else {
        return Ok(None);
    };
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let parsed = if value.len() == 10 {
        parse_date(var, value)
    } else {
        parse_rfc3339(var, value)
    };
    parsed
        .map(Some)
        .with_context(|| format!("{} must be RFC3339 or YYYY-MM-DD", var))
}
