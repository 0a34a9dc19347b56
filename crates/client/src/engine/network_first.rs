//! Network-first strategy with a TTL-bounded stale fallback.
//!
//! Only `Error::Network` takes the fallback path. Other fetch errors, such as
//! an oversized body, are returned as they are.
//!
//! ```text
//! fetch ──ok──▶ 2xx? store(cachedAt = now) ──▶ live response
//!   │
//!   └─network err──▶ stored entry fresh? ──yes──▶ stale response
//!                   │
//!                   no ──▶ navigation? ──yes──▶ offline page / built-in document
//!                                │
//!                                no ──▶ network error
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::fetch::Fetcher;
use crate::request::{Request, Response, ResponseSource};
use rampart_core::{Clock, Error, Store, StoreBackend};

const OFFLINE_DOCUMENT: &str = "<!doctype html>\
<html lang=\"en\"><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>Offline</title></head>\
<body><h1>You are offline</h1><p>This page is not available right now. Check your connection and try again.</p></body></html>";

/// Minimal document returned to navigations when nothing else is available.
pub fn offline_document() -> Response {
    Response {
        status: 503,
        headers: vec![
            ("content-type".to_string(), "text/html; charset=utf-8".to_string()),
            ("cache-control".to_string(), "no-store".to_string()),
        ],
        body: OFFLINE_DOCUMENT.into(),
        source: ResponseSource::Offline,
        cached_at: None,
    }
}

/// Location of a precached offline page.
#[derive(Debug, Clone)]
pub struct OfflinePage {
    pub namespace: String,
    pub key: String,
}

/// Fetches first and falls back to the store only on transport failure.
#[derive(Clone)]
pub struct NetworkFirstHandler {
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    backend: Arc<dyn StoreBackend>,
    offline_page: Option<OfflinePage>,
}

impl NetworkFirstHandler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>, clock: Arc<dyn Clock>, backend: Arc<dyn StoreBackend>,
        offline_page: Option<OfflinePage>,
    ) -> Self {
        Self { fetcher, clock, backend, offline_page }
    }

    /// Handle `request` against `store`. `ttl = None` means stored entries never expire.
    pub async fn handle(&self, store: &Store, request: &Request, ttl: Option<Duration>) -> Result<Response, Error> {
        let network_err = match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    let entry = response.to_entry(request, self.clock.now());
                    if let Err(e) = store.put(&entry).await {
                        tracing::warn!(url = %request.url, error = %e, "cache refresh failed");
                    }
                }
                return Ok(response);
            }
            Err(Error::Network(msg)) => Error::Network(msg),
            Err(e) => return Err(e),
        };

        match store.get(&request.cache_key()).await {
            Ok(Some(entry)) if entry.is_fresh(self.clock.now(), ttl) => {
                tracing::debug!(
                    url = %request.url,
                    cached_at = %entry.cached_at,
                    error = %network_err,
                    "network failed, serving stale entry"
                );
                return Ok(Response::from_entry(entry, ResponseSource::Stale));
            }
            Ok(Some(entry)) => {
                tracing::debug!(url = %request.url, cached_at = %entry.cached_at, "stored entry expired");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(url = %request.url, error = %e, "cache read failed during fallback"),
        }

        if request.is_navigation() {
            tracing::debug!(url = %request.url, error = %network_err, "serving offline document");
            return Ok(self.offline_response().await);
        }

        Err(network_err)
    }

    async fn offline_response(&self) -> Response {
        if let Some(page) = &self.offline_page {
            match self.backend.get(&page.namespace, &page.key).await {
                Ok(Some(entry)) => {
                    let mut response = Response::from_entry(entry, ResponseSource::Offline);
                    response.status = 503;
                    return response;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "offline page lookup failed"),
            }
        }
        offline_document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Destination;
    use crate::testing::MockFetcher;
    use chrono::Duration as ChronoDuration;
    use rampart_core::{ManualClock, MemoryStore};
    use url::Url;

    const API_URL: &str = "https://app.example.com/api/items";
    const TTL: Duration = Duration::from_secs(300);

    struct Fixture {
        fetcher: Arc<MockFetcher>,
        clock: Arc<ManualClock>,
        backend: Arc<dyn StoreBackend>,
        store: Store,
        handler: NetworkFirstHandler,
    }

    async fn fixture(offline_page: Option<OfflinePage>) -> Fixture {
        let fetcher = Arc::new(MockFetcher::new());
        let clock = Arc::new(ManualClock::default());
        let backend: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
        let store = Store::open(backend.clone(), "app-api-v1").await.unwrap();
        let handler = NetworkFirstHandler::new(fetcher.clone(), clock.clone(), backend.clone(), offline_page);
        Fixture { fetcher, clock, backend, store, handler }
    }

    fn api_request() -> Request {
        Request::get(Url::parse(API_URL).unwrap())
    }

    async fn seed(f: &Fixture, request: &Request, age: ChronoDuration) {
        let entry = Response::network(200, vec![], "[\"cached\"]").to_entry(request, f.clock.now() - age);
        f.store.put(&entry).await.unwrap();
    }

    fn ttl_ms() -> ChronoDuration {
        ChronoDuration::from_std(TTL).unwrap()
    }

    #[tokio::test]
    async fn test_success_refreshes_store() {
        let f = fixture(None).await;
        f.fetcher.route(API_URL, 200, "[\"live\"]");
        seed(&f, &api_request(), ChronoDuration::minutes(1)).await;

        let response = f.handler.handle(&f.store, &api_request(), Some(TTL)).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(&response.body[..], b"[\"live\"]");

        let stored = f.store.get(&api_request().cache_key()).await.unwrap().unwrap();
        assert_eq!(stored.payload, b"[\"live\"]");
        assert_eq!(stored.cached_at, f.clock.now());
    }

    #[tokio::test]
    async fn test_stamp_not_injected_into_headers() {
        let f = fixture(None).await;
        f.fetcher.route(API_URL, 200, "[]");

        let response = f.handler.handle(&f.store, &api_request(), Some(TTL)).await.unwrap();
        let stored = f.store.get(&api_request().cache_key()).await.unwrap().unwrap();
        assert_eq!(stored.headers, response.headers);
    }

    #[tokio::test]
    async fn test_failure_within_ttl_serves_stale() {
        let f = fixture(None).await;
        seed(&f, &api_request(), ttl_ms() - ChronoDuration::milliseconds(1)).await;
        f.fetcher.set_offline(true);

        let response = f.handler.handle(&f.store, &api_request(), Some(TTL)).await.unwrap();
        assert_eq!(response.source, ResponseSource::Stale);
        assert_eq!(&response.body[..], b"[\"cached\"]");
    }

    #[tokio::test]
    async fn test_failure_past_ttl_propagates_error() {
        let f = fixture(None).await;
        seed(&f, &api_request(), ttl_ms() + ChronoDuration::milliseconds(1)).await;
        f.fetcher.set_offline(true);

        let result = f.handler.handle(&f.store, &api_request(), Some(TTL)).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_failure_without_entry_propagates_error() {
        let f = fixture(None).await;
        f.fetcher.set_offline(true);

        let result = f.handler.handle(&f.store, &api_request(), Some(TTL)).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_no_ttl_serves_any_age() {
        let f = fixture(None).await;
        seed(&f, &api_request(), ChronoDuration::days(365)).await;
        f.fetcher.set_offline(true);

        let response = f.handler.handle(&f.store, &api_request(), None).await.unwrap();
        assert_eq!(response.source, ResponseSource::Stale);
    }

    #[tokio::test]
    async fn test_non_success_returned_live_without_store() {
        let f = fixture(None).await;
        f.fetcher.route(API_URL, 503, "maintenance");
        seed(&f, &api_request(), ChronoDuration::seconds(1)).await;

        let response = f.handler.handle(&f.store, &api_request(), Some(TTL)).await.unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Network);

        let stored = f.store.get(&api_request().cache_key()).await.unwrap().unwrap();
        assert_eq!(stored.payload, b"[\"cached\"]");
    }

    #[tokio::test]
    async fn test_navigation_gets_builtin_offline_document() {
        let f = fixture(None).await;
        f.fetcher.set_offline(true);
        let nav = Request::get(Url::parse("https://app.example.com/dashboard").unwrap())
            .with_destination(Destination::Document);

        let response = f.handler.handle(&f.store, &nav, None).await.unwrap();
        assert_eq!(response.source, ResponseSource::Offline);
        assert_eq!(response.status, 503);
        assert!(String::from_utf8_lossy(&response.body).contains("offline"));
    }

    #[tokio::test]
    async fn test_navigation_prefers_precached_offline_page() {
        let offline_req = Request::get(Url::parse("https://app.example.com/offline.html").unwrap());
        let page = OfflinePage { namespace: "app-static-v1".into(), key: offline_req.cache_key() };
        let f = fixture(Some(page)).await;
        let entry = Response::network(200, vec![], "<h1>custom offline</h1>").to_entry(&offline_req, f.clock.now());
        f.backend.put("app-static-v1", &entry).await.unwrap();
        f.fetcher.set_offline(true);

        let nav = Request::get(Url::parse("https://app.example.com/settings").unwrap())
            .with_destination(Destination::Document);
        let response = f.handler.handle(&f.store, &nav, None).await.unwrap();
        assert_eq!(response.source, ResponseSource::Offline);
        assert_eq!(&response.body[..], b"<h1>custom offline</h1>");
    }

    #[tokio::test]
    async fn test_oversized_body_skips_stale_fallback() {
        let f = fixture(None).await;
        seed(&f, &api_request(), ChronoDuration::seconds(1)).await;
        f.fetcher.mark_oversized(API_URL);

        let result = f.handler.handle(&f.store, &api_request(), Some(TTL)).await;
        assert!(matches!(result, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_oversized_navigation_skips_offline_document() {
        let f = fixture(None).await;
        let url = "https://app.example.com/report";
        f.fetcher.mark_oversized(url);
        let nav = Request::get(Url::parse(url).unwrap()).with_destination(Destination::Document);

        let result = f.handler.handle(&f.store, &nav, None).await;
        assert!(matches!(result, Err(Error::FetchTooLarge(_))));
    }
}
