//! Neynar v2 HTTP client for the feed and reaction endpoints.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::Duration;
use tracing::debug;

use cast_memory::{
    FeedApi, FeedPage, FeedRequest, RawCast, ReactionApi, ReactionEvent, ReactionPage,
    TransportError,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest page the reactions endpoint serves.
const REACTIONS_PAGE_CAP: usize = 100;

#[derive(Debug, Deserialize)]
struct NextCursor {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    casts: Vec<RawCast>,
    #[serde(default)]
    next: Option<NextCursor>,
}

#[derive(Debug, Deserialize)]
struct ReactionItem {
    #[serde(default)]
    reaction_timestamp: Option<String>,
    cast: RawCast,
}

#[derive(Debug, Deserialize)]
struct ReactionsResponse {
    #[serde(default)]
    reactions: Vec<ReactionItem>,
}

#[derive(Debug, Clone)]
pub struct NeynarClient {
    client: Client,
    base_url: String,
    api_key: String,
    viewer_fid: u64,
}

impl NeynarClient {
    /// `viewer_fid` is the user whose likes the reaction endpoint returns.
    pub fn new(base_url: &str, api_key: &str, viewer_fid: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            viewer_fid,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("accept", "application/json")
            .header("x-api-key", &self.api_key)
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::status(status.as_u16(), truncate(&body, 200)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::status(status.as_u16(), format!("malformed response: {e}")))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[async_trait]
impl FeedApi for NeynarClient {
    async fn user_casts(&self, request: &FeedRequest) -> Result<FeedPage, TransportError> {
        let mut query: Vec<(&str, String)> = vec![
            ("fid", request.fid.to_string()),
            ("limit", request.limit.to_string()),
            ("include_replies", request.include_replies.to_string()),
        ];
        if let Some(cursor) = &request.cursor {
            query.push(("cursor", cursor.clone()));
        }

        let response: FeedResponse =
            Self::send(self.get("/farcaster/feed/user/casts").query(&query)).await?;

        debug!(
            casts = response.casts.len(),
            has_cursor = response.next.as_ref().is_some_and(|n| n.cursor.is_some()),
            "Feed: API response"
        );

        Ok(FeedPage {
            casts: response.casts,
            next_cursor: response.next.and_then(|n| n.cursor),
        })
    }
}

#[async_trait]
impl ReactionApi for NeynarClient {
    async fn liked_casts(&self, limit: usize) -> Result<ReactionPage, TransportError> {
        let query = [
            ("fid", self.viewer_fid.to_string()),
            ("type", "likes".to_string()),
            ("limit", limit.clamp(1, REACTIONS_PAGE_CAP).to_string()),
        ];

        let response: ReactionsResponse =
            Self::send(self.get("/farcaster/reactions/user").query(&query)).await?;

        let reactions = response
            .reactions
            .into_iter()
            .map(|item| ReactionEvent {
                cast_hash: item.cast.hash.clone(),
                liked_at: item
                    .reaction_timestamp
                    .as_deref()
                    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
                cast: item.cast,
            })
            .collect();

        Ok(ReactionPage { reactions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn feed_response_tolerates_missing_next() {
        let r: FeedResponse = serde_json::from_str(r#"{"casts": []}"#).unwrap();
        assert!(r.next.is_none());

        let r: FeedResponse =
            serde_json::from_str(r#"{"casts": [], "next": {"cursor": null}}"#).unwrap();
        assert!(r.next.unwrap().cursor.is_none());
    }
}
