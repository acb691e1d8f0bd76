//! Paginated retrieval of a user's authored casts.
//!
//! Pages are requested strictly one after another: each request needs the
//! cursor from the previous response. The loop ends when the upstream stops
//! handing out a cursor, when a page comes back empty, or when the target is
//! reached, whichever happens first. The size of a partial page is not used
//! as an exhaustion signal.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result, Stage, TransportError};
use crate::pacing::Pacing;
use crate::types::RawCast;

/// Largest page the feed API will serve.
pub const PAGE_CAP: usize = 150;

/// Default number of casts collected for long-term memory.
pub const DEFAULT_TARGET_LIMIT: usize = 500;

/// One page request against the feed API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub fid: u64,
    /// Never above [`PAGE_CAP`].
    pub limit: usize,
    pub cursor: Option<String>,
    pub include_replies: bool,
}

/// One page of feed results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    pub casts: Vec<RawCast>,
    pub next_cursor: Option<String>,
}

/// Feed API collaborator. Transport and auth live behind this trait.
#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn user_casts(&self, request: &FeedRequest) -> Result<FeedPage, TransportError>;
}

/// Collects up to `target_limit` casts for a user, page by page.
pub struct FeedFetcher {
    api: Arc<dyn FeedApi>,
    pacing: Pacing,
    page_cap: usize,
    include_replies: bool,
}

impl FeedFetcher {
    pub fn new(api: Arc<dyn FeedApi>, pacing: Pacing) -> Self {
        Self {
            api,
            pacing,
            page_cap: PAGE_CAP,
            include_replies: true,
        }
    }

    /// Lower the per-request page size. Values above [`PAGE_CAP`] are clamped.
    pub fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = page_cap.clamp(1, PAGE_CAP);
        self
    }

    pub fn with_include_replies(mut self, include_replies: bool) -> Self {
        self.include_replies = include_replies;
        self
    }

    /// Fetch a user's casts in API order.
    ///
    /// Returns at most `target_limit` casts, fewer if the upstream runs out.
    /// Duplicates across overlapping pages are passed through untouched.
    /// Any transport failure discards everything collected so far.
    pub async fn fetch_user_casts(&self, fid: u64, target_limit: usize) -> Result<Vec<RawCast>> {
        let mut accumulated: Vec<RawCast> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut requests = 0usize;

        while accumulated.len() < target_limit {
            let remaining = target_limit - accumulated.len();
            let request = FeedRequest {
                fid,
                limit: self.page_cap.min(remaining),
                cursor: cursor.take(),
                include_replies: self.include_replies,
            };

            let page = self.request_page(&request).await?;
            requests += 1;

            let received = page.casts.len();
            if received > remaining {
                warn!(
                    "Feed: upstream returned {received} casts for a limit of {}, truncating",
                    request.limit
                );
            }
            accumulated.extend(page.casts.into_iter().take(remaining));

            info!(
                "Feed: fetched {received} casts (total: {})",
                accumulated.len()
            );
            debug!(fid, requests, cursor = ?page.next_cursor, "feed page received");

            cursor = match page.next_cursor {
                Some(c) if !c.is_empty() => Some(c),
                _ => break,
            };
            if received == 0 || accumulated.len() >= target_limit {
                break;
            }

            tokio::time::sleep(self.pacing.inter_request_delay).await;
        }

        info!(
            "Feed: completed fetching {} total casts in {requests} requests",
            accumulated.len()
        );
        Ok(accumulated)
    }

    async fn request_page(&self, request: &FeedRequest) -> Result<FeedPage> {
        let mut attempt = 1;
        loop {
            match self.api.user_casts(request).await {
                Ok(page) => return Ok(page),
                Err(e) if self.pacing.should_retry(attempt) => {
                    attempt += 1;
                    warn!("Feed: request failed ({e}), retrying (attempt {attempt})");
                    tokio::time::sleep(self.pacing.delay_for(attempt)).await;
                }
                Err(e) => return Err(Error::transport(Stage::Feed, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn casts(prefix: &str, n: usize) -> Vec<RawCast> {
        (0..n)
            .map(|i| RawCast {
                hash: Some(format!("{prefix}-{i}")),
                text: Some(format!("cast {i}")),
                ..Default::default()
            })
            .collect()
    }

    /// Replays scripted responses and records every request.
    struct ScriptedFeed {
        responses: Mutex<VecDeque<Result<FeedPage, TransportError>>>,
        requests: Mutex<Vec<FeedRequest>>,
    }

    impl ScriptedFeed {
        fn new(responses: Vec<Result<FeedPage, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<FeedRequest> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl FeedApi for ScriptedFeed {
        async fn user_casts(&self, request: &FeedRequest) -> Result<FeedPage, TransportError> {
            self.requests.lock().push(request.clone());
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::unreachable("script exhausted")))
        }
    }

    /// Always hands back a full page and a fresh cursor.
    struct EndlessFeed {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl FeedApi for EndlessFeed {
        async fn user_casts(&self, request: &FeedRequest) -> Result<FeedPage, TransportError> {
            let mut calls = self.calls.lock();
            *calls += 1;
            let n = *calls;
            Ok(FeedPage {
                casts: casts(&format!("p{n}"), request.limit),
                next_cursor: Some(format!("cursor-{n}")),
            })
        }
    }

    fn page(prefix: &str, n: usize, cursor: Option<&str>) -> Result<FeedPage, TransportError> {
        Ok(FeedPage {
            casts: casts(prefix, n),
            next_cursor: cursor.map(String::from),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn three_pages_until_cursor_runs_out() {
        let api = ScriptedFeed::new(vec![
            page("a", 150, Some("c1")),
            page("b", 150, Some("c2")),
            page("c", 40, None),
        ]);
        let fetcher = FeedFetcher::new(api.clone(), Pacing::default());

        let got = fetcher.fetch_user_casts(12021, 500).await.unwrap();
        assert_eq!(got.len(), 340);

        let reqs = api.requests();
        assert_eq!(reqs.len(), 3, "no fourth request after a null cursor");
        assert_eq!(reqs[0].limit, 150);
        assert_eq!(reqs[0].cursor, None);
        assert_eq!(reqs[1].cursor.as_deref(), Some("c1"));
        assert_eq!(reqs[2].cursor.as_deref(), Some("c2"));
        assert_eq!(reqs[2].limit, 150);
        assert!(reqs.iter().all(|r| r.fid == 12021 && r.include_replies));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_exactly_at_target_with_endless_upstream() {
        let api = Arc::new(EndlessFeed {
            calls: Mutex::new(0),
        });
        let fetcher = FeedFetcher::new(api.clone(), Pacing::default());

        let got = fetcher.fetch_user_casts(1, 500).await.unwrap();
        assert_eq!(got.len(), 500);
        // 150 + 150 + 150 + 50
        assert_eq!(*api.calls.lock(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn last_request_asks_only_for_the_remainder() {
        let api = ScriptedFeed::new(vec![page("a", 150, Some("c1")), page("b", 20, Some("c2"))]);
        let fetcher = FeedFetcher::new(api.clone(), Pacing::default());

        let got = fetcher.fetch_user_casts(1, 170).await.unwrap();
        assert_eq!(got.len(), 170);
        assert_eq!(api.requests()[1].limit, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_page_with_cursor_keeps_going() {
        let api = ScriptedFeed::new(vec![
            page("a", 30, Some("c1")),
            page("b", 30, Some("c2")),
            page("c", 10, None),
        ]);
        let fetcher = FeedFetcher::new(api.clone(), Pacing::default());

        let got = fetcher.fetch_user_casts(1, 500).await.unwrap();
        assert_eq!(got.len(), 70);
        assert_eq!(api.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_page_with_cursor_terminates() {
        let api = ScriptedFeed::new(vec![page("a", 10, Some("c1")), page("b", 0, Some("c2"))]);
        let fetcher = FeedFetcher::new(api.clone(), Pacing::default());

        let got = fetcher.fetch_user_casts(1, 500).await.unwrap();
        assert_eq!(got.len(), 10);
        assert_eq!(api.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn over_delivery_is_truncated() {
        let api = ScriptedFeed::new(vec![page("a", 80, Some("c1"))]);
        let fetcher = FeedFetcher::new(api.clone(), Pacing::default());

        let got = fetcher.fetch_user_casts(1, 50).await.unwrap();
        assert_eq!(got.len(), 50);
        assert_eq!(got[49].hash.as_deref(), Some("a-49"));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_from_overlapping_pages_pass_through() {
        let api = ScriptedFeed::new(vec![page("a", 5, Some("c1")), page("a", 5, None)]);
        let fetcher = FeedFetcher::new(api, Pacing::default());

        let got = fetcher.fetch_user_casts(1, 100).await.unwrap();
        assert_eq!(got.len(), 10);
        assert_eq!(got[0].hash, got[5].hash);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_target_issues_no_request() {
        let api = ScriptedFeed::new(vec![]);
        let fetcher = FeedFetcher::new(api.clone(), Pacing::default());

        let got = fetcher.fetch_user_casts(1, 0).await.unwrap();
        assert!(got.is_empty());
        assert!(api.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_discards_partial_results() {
        let api = ScriptedFeed::new(vec![
            page("a", 150, Some("c1")),
            Err(TransportError::status(503, "unavailable")),
        ]);
        let fetcher = FeedFetcher::new(api, Pacing::default());

        let err = fetcher.fetch_user_casts(1, 500).await.unwrap_err();
        match err {
            Error::Transport { stage, source } => {
                assert_eq!(stage, Stage::Feed);
                assert_eq!(source.status, Some(503));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_reuses_the_same_cursor() {
        let api = ScriptedFeed::new(vec![
            page("a", 150, Some("c1")),
            Err(TransportError::status(429, "slow down")),
            page("b", 10, None),
        ]);
        let pacing = Pacing::default().with_max_attempts(2);
        let fetcher = FeedFetcher::new(api.clone(), pacing);

        let got = fetcher.fetch_user_casts(1, 500).await.unwrap();
        assert_eq!(got.len(), 160);
        let reqs = api.requests();
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[1].cursor.as_deref(), Some("c1"));
        assert_eq!(reqs[2].cursor.as_deref(), Some("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_pages() {
        let api = ScriptedFeed::new(vec![
            page("a", 150, Some("c1")),
            page("b", 150, Some("c2")),
            page("c", 40, None),
        ]);
        let fetcher = FeedFetcher::new(api, Pacing::fixed(Duration::from_secs(1)));

        let start = tokio::time::Instant::now();
        fetcher.fetch_user_casts(1, 500).await.unwrap();
        // two waits: after page one and after page two, none after the last
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn page_cap_is_respected() {
        let api = ScriptedFeed::new(vec![page("a", 25, Some("c1")), page("b", 25, None)]);
        let fetcher = FeedFetcher::new(api.clone(), Pacing::default()).with_page_cap(25);

        fetcher.fetch_user_casts(1, 500).await.unwrap();
        assert!(api.requests().iter().all(|r| r.limit == 25));
    }
}
