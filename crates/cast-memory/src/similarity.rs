//! Alignment between the long-term and short-term tiers.
//!
//! Both tiers are read in key order and reduced with f64 accumulators, so
//! identical tier contents always produce the identical score.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::analytics::ScoreStore;
use crate::error::{Error, Result};
use crate::tier::TierHandle;
use crate::types::{MemoryRecord, SimilarityScore};

/// Reduces two non-empty tiers to a cosine-like value in -1.0–1.0.
pub trait AlignmentMetric: Send + Sync {
    fn name(&self) -> &'static str;

    fn raw_similarity(&self, long_term: &[MemoryRecord], short_term: &[MemoryRecord])
        -> Result<f64>;
}

/// Cosine between the mean vectors of the two tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CentroidCosine;

impl AlignmentMetric for CentroidCosine {
    fn name(&self) -> &'static str {
        "centroid_cosine"
    }

    fn raw_similarity(
        &self,
        long_term: &[MemoryRecord],
        short_term: &[MemoryRecord],
    ) -> Result<f64> {
        let a = centroid(long_term)?;
        let b = centroid(short_term)?;
        if a.len() != b.len() {
            return Err(dimension_mismatch(a.len(), b.len()));
        }
        Ok(cosine64(&a, &b))
    }
}

/// For every short-term record, its best cosine against the long-term tier;
/// the mean of those.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestMatchMean;

impl AlignmentMetric for BestMatchMean {
    fn name(&self) -> &'static str {
        "best_match_mean"
    }

    fn raw_similarity(
        &self,
        long_term: &[MemoryRecord],
        short_term: &[MemoryRecord],
    ) -> Result<f64> {
        let mut total = 0.0f64;
        for s in short_term {
            let s_vec = widen(&s.embedding);
            let mut best = f64::NEG_INFINITY;
            for l in long_term {
                if l.embedding.len() != s.embedding.len() {
                    return Err(dimension_mismatch(l.embedding.len(), s.embedding.len()));
                }
                best = best.max(cosine64(&widen(&l.embedding), &s_vec));
            }
            total += best;
        }
        Ok(total / short_term.len() as f64)
    }
}

/// Pick a metric by its configured name.
pub fn metric_by_name(name: &str) -> Option<Box<dyn AlignmentMetric>> {
    match name {
        "centroid_cosine" | "centroid" => Some(Box::new(CentroidCosine)),
        "best_match_mean" | "best_match" => Some(Box::new(BestMatchMean)),
        _ => None,
    }
}

fn dimension_mismatch(a: usize, b: usize) -> Error {
    Error::InvalidInput(format!("embedding dimensions differ: {a} vs {b}"))
}

fn widen(v: &[f32]) -> Vec<f64> {
    v.iter().map(|x| f64::from(*x)).collect()
}

fn centroid(records: &[MemoryRecord]) -> Result<Vec<f64>> {
    let dim = records.first().map_or(0, |r| r.embedding.len());
    let mut sum = vec![0.0f64; dim];
    for r in records {
        if r.embedding.len() != dim {
            return Err(dimension_mismatch(dim, r.embedding.len()));
        }
        for (acc, x) in sum.iter_mut().zip(&r.embedding) {
            *acc += f64::from(*x);
        }
    }
    let n = records.len() as f64;
    for acc in &mut sum {
        *acc /= n;
    }
    Ok(sum)
}

fn cosine64(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)).clamp(-1.0, 1.0)
}

/// Map a cosine in -1.0–1.0 onto 0.0–1.0.
pub fn normalize_cosine(raw: f64) -> f64 {
    ((raw + 1.0) / 2.0).clamp(0.0, 1.0)
}

pub struct SimilarityScorer {
    metric: Box<dyn AlignmentMetric>,
    store: Arc<dyn ScoreStore>,
}

impl SimilarityScorer {
    pub fn new(store: Arc<dyn ScoreStore>) -> Self {
        Self::with_metric(store, Box::new(CentroidCosine))
    }

    pub fn with_metric(store: Arc<dyn ScoreStore>, metric: Box<dyn AlignmentMetric>) -> Self {
        Self { metric, store }
    }

    pub fn metric_name(&self) -> &'static str {
        self.metric.name()
    }

    /// Score the two tiers without recording anything.
    pub async fn score(
        &self,
        long_term: &TierHandle,
        short_term: &TierHandle,
    ) -> Result<SimilarityScore> {
        let long = long_term.records().await?;
        let short = short_term.records().await?;
        if long.is_empty() || short.is_empty() {
            return Err(Error::InsufficientData {
                long_term: long.len(),
                short_term: short.len(),
            });
        }

        let raw = self.metric.raw_similarity(&long, &short)?;
        Ok(SimilarityScore {
            computed_at: Utc::now(),
            value: normalize_cosine(raw),
            long_term_size: long.len(),
            short_term_size: short.len(),
            metric: self.metric.name().to_string(),
        })
    }

    /// Score the tiers and append the result to the analytics store.
    ///
    /// An empty tier yields [`Error::InsufficientData`] and nothing is written.
    pub async fn compute_alignment(
        &self,
        long_term: &TierHandle,
        short_term: &TierHandle,
    ) -> Result<SimilarityScore> {
        let score = self.score(long_term, short_term).await?;
        let stored = self.store.append(&score)?;
        info!(
            "Similarity: {:.4} ({}) over {} long-term vs {} short-term records",
            stored.value, stored.metric, stored.long_term_size, stored.short_term_size
        );
        Ok(stored)
    }
}
