//! Recently liked casts of the pipeline owner.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::error::{Error, Result, Stage, TransportError};
use crate::types::{RawCast, ReactionEvent};

/// Default number of likes pulled for short-term memory.
pub const DEFAULT_REACTION_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactionPage {
    pub reactions: Vec<ReactionEvent>,
}

/// Reaction API collaborator. The reacting user is implied by the client.
#[async_trait]
pub trait ReactionApi: Send + Sync {
    async fn liked_casts(&self, limit: usize) -> Result<ReactionPage, TransportError>;
}

pub struct ReactionFetcher {
    api: Arc<dyn ReactionApi>,
    limit: usize,
}

impl ReactionFetcher {
    pub fn new(api: Arc<dyn ReactionApi>, limit: usize) -> Self {
        Self { api, limit }
    }

    /// Fetch the liked casts in API delivery order, capped at the configured limit.
    pub async fn fetch_liked_casts(&self) -> Result<Vec<RawCast>> {
        let page = self
            .api
            .liked_casts(self.limit)
            .await
            .map_err(|e| Error::transport(Stage::Reactions, e))?;

        let casts: Vec<RawCast> = page
            .reactions
            .into_iter()
            .take(self.limit)
            .map(|r| r.cast)
            .collect();

        info!("Reactions: fetched {} liked casts", casts.len());
        Ok(casts)
    }
}
