//! Two-tier cast memory for castmind.
//!
//! A user's authored casts become the long-term tier and their recent likes
//! the short-term tier. Each tier is an embedded collection; the alignment
//! between the two is scored and appended to a durable history.
//!
//! The feed API, embedding model and vector store are reached through the
//! [`FeedApi`], [`ReactionApi`], [`Embedder`] and [`VectorStore`] traits.

pub mod analytics;
pub mod embedding;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod pacing;
pub mod reactions;
pub mod similarity;
pub mod tier;
pub mod types;
pub mod vector;

pub use analytics::{ScoreStore, SqliteScoreStore};
pub use embedding::{Embedder, HashingEmbedder};
pub use error::{Error, Result, Stage, TransportError, ValidationError};
pub use feed::{FeedApi, FeedFetcher, FeedPage, FeedRequest, DEFAULT_TARGET_LIMIT, PAGE_CAP};
pub use ingest::validate_casts;
pub use pacing::Pacing;
pub use reactions::{ReactionApi, ReactionFetcher, ReactionPage, DEFAULT_REACTION_LIMIT};
pub use similarity::{metric_by_name, AlignmentMetric, BestMatchMean, CentroidCosine, SimilarityScorer};
pub use tier::{TierBuild, TierBuilder, TierHandle, TierReport};
pub use types::{
    Cast, MemoryRecord, Neighbor, RawAuthor, RawCast, ReactionEvent, SimilarityScore, TierKind,
};
pub use vector::{InMemoryVectorStore, SqliteVectorStore, VectorStore};
