//! One end-to-end run: fetch, build both tiers, score, hand off.
//!
//! Stages run in sequence and any failure aborts the run. The only overlap
//! is between the two fetches, which do not depend on each other.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use cast_memory::{
    metric_by_name, Embedder, FeedApi, FeedFetcher, InMemoryVectorStore, ReactionApi,
    ReactionFetcher, ScoreStore, SimilarityScore, SimilarityScorer, SqliteScoreStore,
    SqliteVectorStore, TierBuild, TierBuilder, TierKind, VectorStore,
};

use crate::config::Config;
use crate::embedder::create_embedder;
use crate::neynar::NeynarClient;

/// External services a run talks to.
pub struct Collaborators {
    pub feed: Arc<dyn FeedApi>,
    pub reactions: Arc<dyn ReactionApi>,
    pub embedder: Arc<dyn Embedder>,
    pub vectors: Arc<dyn VectorStore>,
    pub scores: Arc<dyn ScoreStore>,
}

impl Collaborators {
    /// Wire up the Neynar client, configured embedder and SQLite stores.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.neynar_api_key()?;
        let neynar = Arc::new(NeynarClient::new(
            &config.neynar.base_url,
            api_key,
            config.viewer_fid(),
        )?);

        let vectors: Arc<dyn VectorStore> = match &config.memory.db_path {
            Some(path) => Arc::new(
                SqliteVectorStore::open(Path::new(path))
                    .with_context(|| format!("Failed to open memory store at {path}"))?,
            ),
            None => Arc::new(InMemoryVectorStore::new()),
        };

        Ok(Self {
            feed: neynar.clone(),
            reactions: neynar,
            embedder: create_embedder(&config.embedding)?,
            vectors,
            scores: open_score_store(config)?,
        })
    }
}

pub fn open_score_store(config: &Config) -> Result<Arc<dyn ScoreStore>> {
    let store = SqliteScoreStore::open(Path::new(&config.analytics.db_path))
        .with_context(|| format!("Failed to open analytics store at {}", config.analytics.db_path))?;
    Ok(Arc::new(store))
}

/// What a successful run hands to the generation stage.
///
/// Both tiers are non-empty: scoring refuses empty tiers.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub long_term: TierBuild,
    pub short_term: TierBuild,
    pub score: SimilarityScore,
}

pub struct Pipeline {
    feed: FeedFetcher,
    reactions: ReactionFetcher,
    builder: TierBuilder,
    scorer: SimilarityScorer,
    target_fid: u64,
    target_limit: usize,
}

impl Pipeline {
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self> {
        let metric = metric_by_name(&config.analytics.metric)
            .with_context(|| format!("Unknown similarity metric: {}", config.analytics.metric))?;

        Ok(Self {
            feed: FeedFetcher::new(collaborators.feed, config.pacing())
                .with_page_cap(config.feed.page_size)
                .with_include_replies(config.feed.include_replies),
            reactions: ReactionFetcher::new(collaborators.reactions, config.reactions.limit),
            builder: TierBuilder::new(collaborators.vectors, collaborators.embedder)
                .with_concurrency(config.embedding.concurrency)
                .with_reset(config.memory.reset_tiers),
            scorer: SimilarityScorer::with_metric(collaborators.scores, metric),
            target_fid: config.neynar.target_fid,
            target_limit: config.feed.target_limit,
        })
    }

    /// Run for the configured user, or `fid` when given.
    pub async fn run(&self, fid: Option<u64>) -> Result<PipelineOutcome> {
        let fid = fid.unwrap_or(self.target_fid);
        info!("Starting run for fid {fid}");

        let (casts, liked) = tokio::try_join!(
            self.feed.fetch_user_casts(fid, self.target_limit),
            self.reactions.fetch_liked_casts(),
        )
        .context("Ingestion failed")?;

        let long_term = self
            .builder
            .build_tier(TierKind::LongTerm, &casts)
            .await
            .context("Failed to build long-term memory")?;
        let short_term = self
            .builder
            .build_tier(TierKind::ShortTerm, &liked)
            .await
            .context("Failed to build short-term memory")?;

        let score = self
            .scorer
            .compute_alignment(&long_term.handle, &short_term.handle)
            .await
            .context("Failed to score tier alignment")?;

        info!(
            "Run complete: {} long-term, {} short-term records, score {:.4}",
            score.long_term_size, score.short_term_size, score.value
        );

        Ok(PipelineOutcome {
            long_term,
            short_term,
            score,
        })
    }
}
