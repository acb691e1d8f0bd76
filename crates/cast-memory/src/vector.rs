//! Vector-store capability and two local backends.
//!
//! Each tier is its own namespace: a key written to the long-term tier is
//! invisible to the short-term tier. Upserting an existing key replaces the
//! previous record. Search is flat cosine similarity, which is fine at the
//! few-hundred-records scale a single user's history produces.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use crate::embedding::cosine_similarity;
use crate::types::{MemoryRecord, Neighbor, TierKind};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the record stored under `record.source_post_id`.
    async fn upsert(&self, record: MemoryRecord) -> anyhow::Result<()>;

    /// Top-`k` records of `tier` by cosine similarity, best first.
    async fn query(&self, tier: TierKind, vector: &[f32], k: usize)
        -> anyhow::Result<Vec<Neighbor>>;

    /// Every record of `tier`, ordered by key.
    async fn records(&self, tier: TierKind) -> anyhow::Result<Vec<MemoryRecord>>;

    async fn count(&self, tier: TierKind) -> anyhow::Result<usize>;

    /// Drop every record of `tier`. Used before rebuilding a tier from scratch.
    async fn clear(&self, tier: TierKind) -> anyhow::Result<()>;
}

fn rank(mut scored: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_post_id.cmp(&b.source_post_id))
    });
    scored.truncate(k);
    scored
}

// ── In-memory ────────────────────────────────────────────────────

/// Process-local store. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    tiers: Mutex<HashMap<TierKind, BTreeMap<String, MemoryRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, record: MemoryRecord) -> anyhow::Result<()> {
        let mut tiers = self.tiers.lock();
        tiers
            .entry(record.tier)
            .or_default()
            .insert(record.source_post_id.clone(), record);
        Ok(())
    }

    async fn query(
        &self,
        tier: TierKind,
        vector: &[f32],
        k: usize,
    ) -> anyhow::Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let tiers = self.tiers.lock();
        let scored = tiers
            .get(&tier)
            .map(|records| {
                records
                    .values()
                    .map(|r| Neighbor {
                        source_post_id: r.source_post_id.clone(),
                        document: r.document.clone(),
                        score: cosine_similarity(vector, &r.embedding),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rank(scored, k))
    }

    async fn records(&self, tier: TierKind) -> anyhow::Result<Vec<MemoryRecord>> {
        let tiers = self.tiers.lock();
        Ok(tiers
            .get(&tier)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, tier: TierKind) -> anyhow::Result<usize> {
        Ok(self.tiers.lock().get(&tier).map_or(0, BTreeMap::len))
    }

    async fn clear(&self, tier: TierKind) -> anyhow::Result<()> {
        self.tiers.lock().remove(&tier);
        Ok(())
    }
}

// ── SQLite ───────────────────────────────────────────────────────

/// Durable store: one row per (tier, key), embedding as a little-endian f32 blob.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        create_parent_dir(path)?;
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory_records (
                tier TEXT NOT NULL,
                source_post_id TEXT NOT NULL,
                document TEXT NOT NULL,
                embedding BLOB NOT NULL,
                inserted_at INTEGER NOT NULL,
                PRIMARY KEY (tier, source_post_id)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load(conn: &Connection, tier: TierKind) -> anyhow::Result<Vec<MemoryRecord>> {
        let mut stmt = conn.prepare(
            "SELECT source_post_id, document, embedding, inserted_at
             FROM memory_records WHERE tier = ?1 ORDER BY source_post_id",
        )?;
        let rows = stmt.query_map(params![tier.collection_name()], |row| {
            let blob: Vec<u8> = row.get(2)?;
            let millis: i64 = row.get(3)?;
            Ok(MemoryRecord {
                source_post_id: row.get(0)?,
                document: row.get(1)?,
                embedding: blob_to_vec(&blob),
                tier,
                inserted_at: millis_to_datetime(millis),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn vec_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Create the directory a database file will live in, if it has one.
pub(crate) fn create_parent_dir(path: &Path) -> crate::error::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|source| crate::error::Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, record: MemoryRecord) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memory_records (tier, source_post_id, document, embedding, inserted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(tier, source_post_id) DO UPDATE SET
                document = excluded.document,
                embedding = excluded.embedding,
                inserted_at = excluded.inserted_at",
            params![
                record.tier.collection_name(),
                record.source_post_id,
                record.document,
                vec_to_blob(&record.embedding),
                record.inserted_at.timestamp_millis(),
            ],
        )?;
        debug!(tier = %record.tier, key = %record.source_post_id, "upserted memory record");
        Ok(())
    }

    async fn query(
        &self,
        tier: TierKind,
        vector: &[f32],
        k: usize,
    ) -> anyhow::Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let records = Self::load(&self.conn.lock(), tier)?;
        let scored = records
            .into_iter()
            .map(|r| Neighbor {
                score: cosine_similarity(vector, &r.embedding),
                source_post_id: r.source_post_id,
                document: r.document,
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn records(&self, tier: TierKind) -> anyhow::Result<Vec<MemoryRecord>> {
        Self::load(&self.conn.lock(), tier)
    }

    async fn count(&self, tier: TierKind) -> anyhow::Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memory_records WHERE tier = ?1",
            params![tier.collection_name()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    async fn clear(&self, tier: TierKind) -> anyhow::Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM memory_records WHERE tier = ?1",
            params![tier.collection_name()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(tier: TierKind, key: &str, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            source_post_id: key.to_string(),
            embedding,
            tier,
            document: format!("doc {key}"),
            inserted_at: millis_to_datetime(1_700_000_000_000),
        }
    }

    fn backends() -> Vec<Arc<dyn VectorStore>> {
        vec![
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(SqliteVectorStore::open_in_memory().unwrap()),
        ]
    }

    #[tokio::test]
    async fn upsert_replaces_existing_key() {
        for store in backends() {
            store
                .upsert(record(TierKind::LongTerm, "a", vec![1.0, 0.0]))
                .await
                .unwrap();
            store
                .upsert(record(TierKind::LongTerm, "a", vec![0.0, 1.0]))
                .await
                .unwrap();

            assert_eq!(store.count(TierKind::LongTerm).await.unwrap(), 1);
            let records = store.records(TierKind::LongTerm).await.unwrap();
            assert_eq!(records[0].embedding, vec![0.0, 1.0]);
        }
    }

    #[tokio::test]
    async fn tiers_are_separate_namespaces() {
        for store in backends() {
            store
                .upsert(record(TierKind::LongTerm, "same", vec![1.0, 0.0]))
                .await
                .unwrap();
            store
                .upsert(record(TierKind::ShortTerm, "same", vec![0.0, 1.0]))
                .await
                .unwrap();

            assert_eq!(store.count(TierKind::LongTerm).await.unwrap(), 1);
            assert_eq!(store.count(TierKind::ShortTerm).await.unwrap(), 1);

            store.clear(TierKind::ShortTerm).await.unwrap();
            assert_eq!(store.count(TierKind::ShortTerm).await.unwrap(), 0);
            assert_eq!(store.count(TierKind::LongTerm).await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn query_ranks_by_cosine() {
        for store in backends() {
            for (key, v) in [
                ("x", vec![1.0, 0.0]),
                ("y", vec![0.0, 1.0]),
                ("xy", vec![1.0, 1.0]),
            ] {
                store.upsert(record(TierKind::ShortTerm, key, v)).await.unwrap();
            }

            let hits = store
                .query(TierKind::ShortTerm, &[1.0, 0.1], 2)
                .await
                .unwrap();
            let keys: Vec<_> = hits.iter().map(|h| h.source_post_id.as_str()).collect();
            assert_eq!(keys, vec!["x", "xy"]);
            assert!(store
                .query(TierKind::LongTerm, &[1.0, 0.0], 5)
                .await
                .unwrap()
                .is_empty());
        }
    }

    #[tokio::test]
    async fn records_come_back_in_key_order() {
        for store in backends() {
            for key in ["c", "a", "b"] {
                store
                    .upsert(record(TierKind::LongTerm, key, vec![1.0]))
                    .await
                    .unwrap();
            }
            let keys: Vec<_> = store
                .records(TierKind::LongTerm)
                .await
                .unwrap()
                .into_iter()
                .map(|r| r.source_post_id)
                .collect();
            assert_eq!(keys, vec!["a", "b", "c"]);
        }
    }

    #[tokio::test]
    async fn sqlite_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.db");
        {
            let store = SqliteVectorStore::open(&path).unwrap();
            store
                .upsert(record(TierKind::LongTerm, "kept", vec![0.25, -0.5, 1.5]))
                .await
                .unwrap();
        }
        let store = SqliteVectorStore::open(&path).unwrap();
        let records = store.records(TierKind::LongTerm).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].embedding, vec![0.25, -0.5, 1.5]);
        assert_eq!(records[0].document, "doc kept");
    }

    #[tokio::test]
    async fn sqlite_store_creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("castmind").join("memory.db");
        let store = SqliteVectorStore::open(&path).unwrap();
        store
            .upsert(record(TierKind::ShortTerm, "k", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        assert!(path.exists());
        assert_eq!(store.count(TierKind::ShortTerm).await.unwrap(), 1);
    }
}
