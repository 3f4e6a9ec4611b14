//! Lazy, rate-limited pagination over one calendar.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use timeline::rate_limit::RateLimiter;
use timeline::{CommonItem, ListingWindow};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::api::{EventsApi, EventsQuery};
use super::config::MAX_PAGE_SIZE;
use super::normalizer::{normalize_value, raw_id};
use crate::error::{IngestError, Result};
use crate::pipeline::{ItemSink, ListingSummary, ListingTask};

/// Lists one calendar page by page.
///
/// A page is requested only once the previous one has been consumed, and
/// every request takes a permit from the shared limiter first.
pub struct CalendarLister {
    api: Arc<dyn EventsApi>,
    limiter: Arc<RateLimiter>,
    calendar_id: String,
    page_size: u32,
}

impl CalendarLister {
    pub fn new(
        api: Arc<dyn EventsApi>,
        limiter: Arc<RateLimiter>,
        calendar_id: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            limiter,
            calendar_id: calendar_id.into(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Normalized items in provider order. The first `Err` ends the stream.
    pub fn list(
        &self,
        window: ListingWindow,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<CommonItem>> + Send + 'static {
        self.list_counted(window, cancel, Arc::new(AtomicUsize::new(0)))
    }

    fn list_counted(
        &self,
        window: ListingWindow,
        cancel: CancellationToken,
        skipped: Arc<AtomicUsize>,
    ) -> impl Stream<Item = Result<CommonItem>> + Send + 'static {
        let cursor = PageCursor {
            api: Arc::clone(&self.api),
            limiter: Arc::clone(&self.limiter),
            calendar_id: self.calendar_id.clone(),
            query: EventsQuery {
                time_min: window.start_or(Utc::now()),
                time_max: window.end,
                max_results: self.page_size,
                page_token: None,
            },
            buffer: VecDeque::new(),
            seen_tokens: HashSet::new(),
            pages: 0,
            exhausted: false,
            pending_error: None,
            failed: false,
            cancel,
            skipped,
        };

        stream::unfold(cursor, |mut cursor| async move {
            cursor.next_item().await.map(|item| (item, cursor))
        })
    }
}

struct PageCursor {
    api: Arc<dyn EventsApi>,
    limiter: Arc<RateLimiter>,
    calendar_id: String,
    query: EventsQuery,
    buffer: VecDeque<Value>,
    seen_tokens: HashSet<String>,
    pages: usize,
    exhausted: bool,
    /// Reported once the records already received have been drained.
    pending_error: Option<IngestError>,
    failed: bool,
    cancel: CancellationToken,
    skipped: Arc<AtomicUsize>,
}

impl PageCursor {
    async fn next_item(&mut self) -> Option<Result<CommonItem>> {
        loop {
            if self.failed {
                return None;
            }

            if let Some(raw) = self.buffer.pop_front() {
                match normalize_value(&raw) {
                    Ok(item) => return Some(Ok(item)),
                    Err(e) => {
                        self.skipped.fetch_add(1, Ordering::Relaxed);
                        let error = IngestError::from(e);
                        warn!(
                            calendar = %self.calendar_id,
                            record = %raw_id(&raw),
                            error = %error,
                            "Skipping record that failed normalization"
                        );
                        continue;
                    }
                }
            }

            if self.exhausted {
                return self.pending_error.take().map(|e| {
                    self.failed = true;
                    Err(e)
                });
            }

            if let Err(e) = self.fetch_page().await {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let _permit = self.limiter.acquire(&self.cancel).await?;

        let page = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(IngestError::Cancelled),
            page = self.api.list_events(&self.calendar_id, &self.query) => page?,
        };
        self.pages += 1;

        debug!(
            calendar = %self.calendar_id,
            page = self.pages,
            records = page.items.len(),
            has_next = page.next_page_token.is_some(),
            "Fetched listing page"
        );

        self.buffer.extend(page.items);

        match page.next_page_token.filter(|t| !t.is_empty()) {
            None => {
                self.exhausted = true;
                self.query.page_token = None;
            }
            Some(token) if !self.seen_tokens.insert(token.clone()) => {
                self.exhausted = true;
                self.pending_error = Some(IngestError::Transport(format!(
                    "calendar {} returned page token {} twice",
                    self.calendar_id, token
                )));
            }
            Some(token) => self.query.page_token = Some(token),
        }
        Ok(())
    }
}

#[async_trait]
impl ListingTask for CalendarLister {
    fn label(&self) -> String {
        format!("calendar/{}", self.calendar_id)
    }

    async fn run(&self, window: ListingWindow, sink: ItemSink) -> Result<ListingSummary> {
        let skipped = Arc::new(AtomicUsize::new(0));
        let items = self.list_counted(window, sink.cancellation().clone(), Arc::clone(&skipped));
        futures::pin_mut!(items);

        let mut emitted = 0;
        while let Some(item) = items.next().await {
            sink.send(item?).await?;
            emitted += 1;
        }

        Ok(ListingSummary {
            emitted,
            skipped: skipped.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::api::EventsPage;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use timeline::rate_limit::RateLimit;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Serves scripted pages keyed by the incoming page token.
    #[derive(Default)]
    struct FakeApi {
        pages: HashMap<Option<String>, std::result::Result<EventsPage, String>>,
        queries: Mutex<Vec<(String, EventsQuery)>>,
        /// Records scripted so far; each one starts a minute after the previous.
        scripted: u32,
    }

    impl FakeApi {
        fn page(mut self, token: Option<&str>, ids: &[&str], next: Option<&str>) -> Self {
            let mut items = Vec::new();
            for id in ids {
                items.push(record_at(id, self.scripted));
                self.scripted += 1;
            }
            self.pages.insert(
                token.map(str::to_string),
                Ok(EventsPage {
                    items,
                    next_page_token: next.map(str::to_string),
                }),
            );
            self
        }

        fn raw_page(mut self, token: Option<&str>, items: Vec<Value>, next: Option<&str>) -> Self {
            self.pages.insert(
                token.map(str::to_string),
                Ok(EventsPage {
                    items,
                    next_page_token: next.map(str::to_string),
                }),
            );
            self
        }

        fn failure(mut self, token: Option<&str>, message: &str) -> Self {
            self.pages
                .insert(token.map(str::to_string), Err(message.to_string()));
            self
        }

        fn tokens_seen(&self) -> Vec<Option<String>> {
            self.queries
                .lock()
                .unwrap()
                .iter()
                .map(|(_, q)| q.page_token.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EventsApi for FakeApi {
        async fn list_events(&self, calendar_id: &str, query: &EventsQuery) -> Result<EventsPage> {
            self.queries
                .lock()
                .unwrap()
                .push((calendar_id.to_string(), query.clone()));
            match self.pages.get(&query.page_token) {
                Some(Ok(page)) => Ok(page.clone()),
                Some(Err(message)) => Err(IngestError::Transport(message.clone())),
                None => Err(IngestError::Transport(format!(
                    "unexpected page token {:?}",
                    query.page_token
                ))),
            }
        }
    }

    fn record_at(id: &str, minute: u32) -> Value {
        json!({
            "id": id,
            "summary": format!("Event {}", id),
            "start": {"dateTime": format!("2026-04-01T09:{:02}:00Z", minute)}
        })
    }

    fn generous_limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(RateLimit {
            requests_per_hour: 3_600_000,
            burst: 100,
        }))
    }

    fn window() -> ListingWindow {
        ListingWindow::new(
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()),
        )
    }

    async fn collect(lister: &CalendarLister, cancel: CancellationToken) -> Vec<Result<CommonItem>> {
        lister.list(window(), cancel).collect().await
    }

    #[tokio::test]
    async fn test_pages_are_followed_in_order() {
        let api = Arc::new(
            FakeApi::default()
                .page(None, &["a", "b"], Some("t1"))
                .page(Some("t1"), &["c"], Some("t2"))
                .page(Some("t2"), &["d"], None),
        );
        let lister = CalendarLister::new(api.clone(), generous_limiter(), "primary", 2);

        let items: Vec<CommonItem> = collect(&lister, CancellationToken::new())
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(items.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(
            items[3].timestamp,
            Utc.with_ymd_and_hms(2026, 4, 1, 9, 3, 0).unwrap()
        );
        assert_eq!(
            api.tokens_seen(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );

        let queries = api.queries.lock().unwrap();
        let (calendar, first) = &queries[0];
        assert_eq!(calendar, "primary");
        assert_eq!(first.max_results, 2);
        assert_eq!(first.time_min, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(
            first.time_max,
            Some(Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_pages_are_requested_lazily() {
        let api = Arc::new(
            FakeApi::default()
                .page(None, &["a"], Some("t1"))
                .page(Some("t1"), &["b"], None),
        );
        let lister = CalendarLister::new(api.clone(), generous_limiter(), "primary", 1);

        let items = lister.list(window(), CancellationToken::new());
        futures::pin_mut!(items);
        let first = items.next().await.unwrap().unwrap();
        assert_eq!(first.id, "a");
        assert_eq!(api.tokens_seen().len(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_window_starts_now() {
        let api = Arc::new(FakeApi::default().page(None, &[], None));
        let lister = CalendarLister::new(api.clone(), generous_limiter(), "primary", 10);

        let before = Utc::now();
        let items: Vec<_> = lister
            .list(ListingWindow::default(), CancellationToken::new())
            .collect()
            .await;
        assert!(items.is_empty());

        let queries = api.queries.lock().unwrap();
        assert!(queries[0].1.time_min >= before - chrono::Duration::seconds(1));
        assert!(queries[0].1.time_max.is_none());
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        let api = Arc::new(FakeApi::default());
        assert_eq!(
            CalendarLister::new(api.clone(), generous_limiter(), "primary", 0).page_size(),
            1
        );
        assert_eq!(
            CalendarLister::new(api, generous_limiter(), "primary", 10_000).page_size(),
            MAX_PAGE_SIZE
        );
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let broken = json!({
            "id": "broken",
            "start": {"dateTime": "not a time"}
        });
        let api = Arc::new(FakeApi::default().raw_page(
            None,
            vec![record_at("a", 0), broken, record_at("b", 1)],
            None,
        ));
        let lister = CalendarLister::new(api, generous_limiter(), "primary", 10);

        let (tx, mut rx) = mpsc::channel(8);
        let summary = lister
            .run(window(), ItemSink::new(tx, CancellationToken::new()))
            .await
            .unwrap();

        assert_eq!(
            summary,
            ListingSummary {
                emitted: 2,
                skipped: 1
            }
        );
        assert_eq!(rx.recv().await.unwrap().id, "a");
        assert_eq!(rx.recv().await.unwrap().id, "b");
    }

    #[tokio::test]
    async fn test_mistyped_record_is_skipped_and_counted() {
        let mistyped = json!({
            "id": "bad",
            "start": {"dateTime": "2026-04-01T09:05:00Z"},
            "mediaMetadata": {"width": 1920}
        });
        let null_attendees = json!({
            "id": "worse",
            "start": {"dateTime": "2026-04-01T09:06:00Z"},
            "attendees": null
        });
        let api = Arc::new(FakeApi::default().raw_page(
            None,
            vec![record_at("good", 0), mistyped, null_attendees, record_at("later", 7)],
            None,
        ));
        let lister = CalendarLister::new(api, generous_limiter(), "primary", 10);

        let (tx, mut rx) = mpsc::channel(8);
        let summary = lister
            .run(window(), ItemSink::new(tx, CancellationToken::new()))
            .await
            .unwrap();

        assert_eq!(
            summary,
            ListingSummary {
                emitted: 2,
                skipped: 2
            }
        );
        assert_eq!(rx.recv().await.unwrap().id, "good");
        assert_eq!(rx.recv().await.unwrap().id, "later");
    }

    #[tokio::test]
    async fn test_listing_error_ends_stream_after_earlier_items() {
        let api = Arc::new(
            FakeApi::default()
                .page(None, &["a", "b"], Some("t1"))
                .failure(Some("t1"), "HTTP 500"),
        );
        let lister = CalendarLister::new(api, generous_limiter(), "work", 2);

        let results = collect(&lister, CancellationToken::new()).await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        let err = results[2].as_ref().unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_repeated_page_token_is_an_error() {
        let api = Arc::new(
            FakeApi::default()
                .page(None, &["a"], Some("loop"))
                .page(Some("loop"), &["b", "c"], Some("loop")),
        );
        let lister = CalendarLister::new(api.clone(), generous_limiter(), "primary", 2);

        let results = collect(&lister, CancellationToken::new()).await;
        assert_eq!(results.len(), 4);

        // Records on the page carrying the repeated token are still emitted.
        let ids: Vec<_> = results[..3]
            .iter()
            .map(|r| r.as_ref().unwrap().id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(results[3].as_ref().unwrap_err().to_string().contains("twice"));
        assert_eq!(api.tokens_seen().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let api = Arc::new(FakeApi::default().page(None, &["a"], None));
        let lister = CalendarLister::new(api.clone(), generous_limiter(), "primary", 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = collect(&lister, cancel).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].as_ref().unwrap_err().is_cancelled());
        assert!(api.tokens_seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_paced_by_limiter() {
        let api = Arc::new(
            FakeApi::default()
                .page(None, &["a"], Some("t1"))
                .page(Some("t1"), &["b"], Some("t2"))
                .page(Some("t2"), &["c"], None),
        );
        // One request per second, no burst headroom.
        let limiter = Arc::new(RateLimiter::new(RateLimit {
            requests_per_hour: 3600,
            burst: 1,
        }));
        let lister = CalendarLister::new(api, limiter, "primary", 1);

        let started = Instant::now();
        let results = collect(&lister, CancellationToken::new()).await;
        assert_eq!(results.len(), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_label() {
        let lister = CalendarLister::new(Arc::new(FakeApi::default()), generous_limiter(), "team@example.com", 10);
        assert_eq!(lister.label(), "calendar/team@example.com");
        assert_eq!(lister.calendar_id(), "team@example.com");
    }
}
