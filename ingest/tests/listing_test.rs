// End-to-end listing tests for the Google Calendar connector.
//
// A small axum server stands in for the Calendar API so each calendar can be
// scripted independently (paged success, mid-listing failure, hanging call).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reqwest::Client;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use timeline::config::ListingConfig;
use timeline::CommonItem;
use timeline_ingest::connectors::google_calendar::GoogleCalendarConnector;
use timeline_ingest::{Connector, IngestError, ListOptions};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ── Fake Calendar API ─────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct FakeCalendar {
    requests: Arc<AtomicUsize>,
}

fn event(id: &str, day: u32) -> serde_json::Value {
    json!({
        "id": id,
        "summary": format!("Event {}", id),
        "start": {"dateTime": format!("2026-07-{:02}T10:00:00Z", day)}
    })
}

async fn list_events(
    State(state): State<FakeCalendar>,
    Path(calendar): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let token = params.get("pageToken").map(String::as_str);

    match (calendar.as_str(), token) {
        ("flaky", None) => Json(json!({
            "items": [event("flaky-1", 1), event("flaky-2", 2), event("flaky-3", 3)],
            "nextPageToken": "page-2"
        }))
        .into_response(),
        ("flaky", Some("page-2")) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "backend unavailable").into_response()
        }
        ("steady", None) => Json(json!({
            "items": [event("steady-1", 4), event("steady-2", 5)]
        }))
        .into_response(),
        ("slow", _) => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Json(json!({"items": []})).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_api() -> (String, FakeCalendar) {
    let state = FakeCalendar::default();
    let app = Router::new()
        .route("/calendars/:calendar/events", get(list_events))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn connector(base_url: String, calendars: &[&str]) -> GoogleCalendarConnector {
    let listing = ListingConfig {
        page_size: 3,
        calendars: calendars.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    };
    GoogleCalendarConnector::with_base_url(Client::new(), base_url, &listing)
}

async fn drain(mut rx: mpsc::Receiver<CommonItem>) -> Vec<CommonItem> {
    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    items
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_partial_failure_keeps_emitted_items() {
    let (base_url, state) = spawn_api().await;
    let connector = connector(base_url, &["flaky", "steady"]);
    let (tx, rx) = mpsc::channel(2);

    let consumer = tokio::spawn(drain(rx));
    let err = connector
        .list_items(CancellationToken::new(), tx, ListOptions::default())
        .await
        .unwrap_err();
    let items = consumer.await.unwrap();

    let mut ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
    ids.sort();
    assert_eq!(
        ids,
        vec!["flaky-1", "flaky-2", "flaky-3", "steady-1", "steady-2"]
    );

    // Items of one calendar keep provider order.
    let flaky: Vec<_> = items
        .iter()
        .filter(|i| i.id.starts_with("flaky"))
        .map(|i| i.id.as_str())
        .collect();
    assert_eq!(flaky, vec!["flaky-1", "flaky-2", "flaky-3"]);

    match &err {
        IngestError::Aggregate(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].task, "calendar/flaky");
        }
        other => panic!("Expected Aggregate, got {:?}", other),
    }
    let message = err.to_string();
    assert!(message.starts_with("one or more errors: calendar/flaky:"));
    assert!(message.contains("backend unavailable"));
    assert_eq!(state.requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_all_calendars_succeed() {
    let (base_url, _state) = spawn_api().await;
    let connector = connector(base_url, &["steady"]);
    let (tx, rx) = mpsc::channel(1);

    let consumer = tokio::spawn(drain(rx));
    connector
        .list_items(CancellationToken::new(), tx, ListOptions::default())
        .await
        .unwrap();

    let items = consumer.await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].metadata.title.as_deref(), Some("Event steady-1"));
}

#[tokio::test]
async fn test_cancellation_returns_promptly() {
    let (base_url, _state) = spawn_api().await;
    let connector = connector(base_url, &["slow", "steady"]);
    let (tx, rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    let consumer = tokio::spawn(drain(rx));
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        connector.list_items(cancel, tx, ListOptions::default()),
    )
    .await
    .expect("listing did not observe cancellation");

    // The slow calendar is cancelled; the steady one may have finished first.
    let err = result.unwrap_err();
    match &err {
        IngestError::Cancelled => {}
        IngestError::Aggregate(failures) => {
            assert!(failures.iter().all(|f| f.error.is_cancelled()));
        }
        other => panic!("Expected cancellation, got {:?}", other),
    }

    let items = tokio::time::timeout(Duration::from_secs(1), consumer)
        .await
        .expect("output channel was not closed")
        .unwrap();
    assert!(items.iter().all(|i| i.id.starts_with("steady")));
}
