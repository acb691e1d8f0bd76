//! Core types for the two-tier cast memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author block as it arrives on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawAuthor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// A cast exactly as the feed API returned it, nothing guaranteed.
///
/// Fields the pipeline does not interpret are kept in `metadata` so they
/// survive into the validated [`Cast`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawCast {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<RawAuthor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// RFC 3339 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// A validated cast. Immutable once built; `hash` is the uniqueness key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cast {
    pub hash: String,
    pub author_fid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_username: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A like by the pipeline owner, resolved to the cast it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub cast_hash: Option<String>,
    pub liked_at: Option<DateTime<Utc>>,
    pub cast: RawCast,
}

/// Which memory tier a record lives in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Authored history.
    LongTerm,
    /// Recent reactions.
    ShortTerm,
}

impl TierKind {
    pub fn collection_name(&self) -> &'static str {
        match self {
            TierKind::LongTerm => "long_term_memory",
            TierKind::ShortTerm => "short_term_memory",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "long_term_memory" | "long_term" => Some(TierKind::LongTerm),
            "short_term_memory" | "short_term" => Some(TierKind::ShortTerm),
            _ => None,
        }
    }
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection_name())
    }
}

/// One embedded cast inside a tier.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub source_post_id: String,
    pub embedding: Vec<f32>,
    pub tier: TierKind,
    /// The text that was embedded.
    pub document: String,
    pub inserted_at: DateTime<Utc>,
}

/// A nearest-neighbour hit returned from a tier query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub source_post_id: String,
    pub document: String,
    /// Cosine similarity to the query (-1.0–1.0).
    pub score: f32,
}

/// One point of the alignment time series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityScore {
    pub computed_at: DateTime<Utc>,
    /// Normalized alignment (0.0–1.0).
    pub value: f64,
    pub long_term_size: usize,
    pub short_term_size: usize,
    /// Name of the metric that produced `value`.
    pub metric: String,
}
