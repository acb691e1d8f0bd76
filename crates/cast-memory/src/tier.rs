//! Building the long-term and short-term memory tiers.
//!
//! Texts are embedded with bounded parallelism but written back one at a
//! time, in input order, so when a batch carries the same hash twice the
//! later cast is the one that ends up stored.

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::embedding::{l2_norm, Embedder};
use crate::error::{Error, Result, ValidationError};
use crate::ingest::validate_casts;
use crate::types::{MemoryRecord, Neighbor, RawCast, TierKind};
use crate::vector::VectorStore;

pub const DEFAULT_EMBED_CONCURRENCY: usize = 4;

/// Outcome of one `build_tier` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierReport {
    pub received: usize,
    pub inserted: usize,
    pub skipped: Vec<ValidationError>,
    /// Valid casts whose embedding carried no signal (zero norm), by hash.
    pub unembeddable: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TierBuild {
    pub handle: TierHandle,
    pub report: TierReport,
}

/// Opaque reference to a built tier.
///
/// Offers nearest-neighbour lookups by text; the stored vectors stay inside
/// this crate.
#[derive(Clone)]
pub struct TierHandle {
    kind: TierKind,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for TierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierHandle")
            .field("kind", &self.kind)
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

impl TierHandle {
    pub fn kind(&self) -> TierKind {
        self.kind
    }

    pub async fn len(&self) -> Result<usize> {
        self.store
            .count(self.kind)
            .await
            .map_err(|e| Error::vector_store("count records", e))
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// The `k` records closest to `text`, best first.
    pub async fn nearest(&self, text: &str, k: usize) -> Result<Vec<Neighbor>> {
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|source| Error::Embedding {
                source_post_id: "<query>".to_string(),
                source,
            })?;
        self.store
            .query(self.kind, &vector, k)
            .await
            .map_err(|e| Error::vector_store("query", e))
    }

    pub(crate) async fn records(&self) -> Result<Vec<MemoryRecord>> {
        self.store
            .records(self.kind)
            .await
            .map_err(|e| Error::vector_store("read records", e))
    }
}

pub struct TierBuilder {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    concurrency: usize,
    reset: bool,
}

impl TierBuilder {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            concurrency: DEFAULT_EMBED_CONCURRENCY,
            reset: false,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Empty each tier before filling it, so a tier reflects only this batch.
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Handle to a tier that already exists in the store.
    pub fn handle(&self, kind: TierKind) -> TierHandle {
        TierHandle {
            kind,
            store: Arc::clone(&self.store),
            embedder: Arc::clone(&self.embedder),
        }
    }

    pub async fn build_tier(&self, kind: TierKind, casts: &[RawCast]) -> Result<TierBuild> {
        let (valid, skipped) = validate_casts(casts);
        if !skipped.is_empty() {
            warn!(
                "{kind}: skipped {} of {} casts that failed validation",
                skipped.len(),
                casts.len()
            );
        }

        if self.reset {
            self.store
                .clear(kind)
                .await
                .map_err(|e| Error::vector_store("clear tier", e))?;
        }

        let embedder = &self.embedder;
        let embedded: Vec<_> = stream::iter(valid)
            .map(|cast| async move {
                let result = embedder.embed(&cast.text).await;
                (cast, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut inserted = 0;
        let mut unembeddable = Vec::new();
        for (cast, result) in embedded {
            let embedding = result.and_then(|v| {
                if v.is_empty() {
                    anyhow::bail!("embedder returned an empty vector");
                }
                Ok(v)
            });
            let embedding = embedding.map_err(|source| Error::Embedding {
                source_post_id: cast.hash.clone(),
                source,
            })?;

            let norm = l2_norm(&embedding);
            if norm == 0.0 || !norm.is_finite() {
                warn!("{kind}: cast {} has no embeddable content, skipping", cast.hash);
                unembeddable.push(cast.hash);
                continue;
            }

            let record = MemoryRecord {
                source_post_id: cast.hash,
                embedding,
                tier: kind,
                document: cast.text,
                inserted_at: Utc::now(),
            };
            self.store
                .upsert(record)
                .await
                .map_err(|e| Error::vector_store("upsert record", e))?;
            inserted += 1;
        }

        info!("{kind}: embedded {inserted} casts");
        Ok(TierBuild {
            handle: self.handle(kind),
            report: TierReport {
                received: casts.len(),
                inserted,
                skipped,
                unembeddable,
            },
        })
    }
}
