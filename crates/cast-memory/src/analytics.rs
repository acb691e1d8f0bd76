//! Append-only history of alignment scores, backed by SQLite.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::SimilarityScore;
use crate::vector::{create_parent_dir, millis_to_datetime};

/// Write-once, read-many score log. Rows are never updated or deleted.
pub trait ScoreStore: Send + Sync {
    /// Persist `score` and return the row as stored.
    fn append(&self, score: &SimilarityScore) -> Result<SimilarityScore>;

    /// Most recent row, if any.
    fn latest(&self) -> Result<Option<SimilarityScore>>;

    /// Rows in insertion order, optionally only those computed at or after `since`.
    fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SimilarityScore>>;

    fn count(&self) -> Result<usize>;
}

pub struct SqliteScoreStore {
    conn: Mutex<Connection>,
}

impl SqliteScoreStore {
    /// Open or create the analytics database.
    pub fn open(path: &Path) -> Result<Self> {
        create_parent_dir(path)?;
        let conn = Connection::open(path).map_err(|e| Error::persistence("open database", e))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| Error::persistence("configure database", e))?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::persistence("open database", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS similarity_scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                computed_at INTEGER NOT NULL,
                value REAL NOT NULL,
                long_term_size INTEGER NOT NULL,
                short_term_size INTEGER NOT NULL,
                metric TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scores_computed_at
                ON similarity_scores(computed_at);",
        )
        .map_err(|e| Error::persistence("create schema", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_score(row: &rusqlite::Row<'_>) -> rusqlite::Result<SimilarityScore> {
        let millis: i64 = row.get(0)?;
        let long_term: i64 = row.get(2)?;
        let short_term: i64 = row.get(3)?;
        Ok(SimilarityScore {
            computed_at: millis_to_datetime(millis),
            value: row.get(1)?,
            long_term_size: long_term as usize,
            short_term_size: short_term as usize,
            metric: row.get(4)?,
        })
    }
}

impl ScoreStore for SqliteScoreStore {
    fn append(&self, score: &SimilarityScore) -> Result<SimilarityScore> {
        if !score.value.is_finite() {
            return Err(Error::InvalidInput(format!(
                "refusing to store non-finite score {}",
                score.value
            )));
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::persistence("begin append", e))?;

        // Timestamps never go backwards, so insertion order is time order.
        let last: Option<i64> = tx
            .query_row("SELECT MAX(computed_at) FROM similarity_scores", [], |row| {
                row.get(0)
            })
            .map_err(|e| Error::persistence("read last timestamp", e))?;
        let millis = score
            .computed_at
            .timestamp_millis()
            .max(last.unwrap_or(i64::MIN));

        tx.execute(
            "INSERT INTO similarity_scores
                (computed_at, value, long_term_size, short_term_size, metric)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                millis,
                score.value,
                score.long_term_size as i64,
                score.short_term_size as i64,
                score.metric,
            ],
        )
        .map_err(|e| Error::persistence("append score", e))?;
        tx.commit()
            .map_err(|e| Error::persistence("commit append", e))?;

        debug!(millis, value = score.value, "appended similarity score");
        Ok(SimilarityScore {
            computed_at: millis_to_datetime(millis),
            ..score.clone()
        })
    }

    fn latest(&self) -> Result<Option<SimilarityScore>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT computed_at, value, long_term_size, short_term_size, metric
             FROM similarity_scores ORDER BY id DESC LIMIT 1",
            [],
            Self::row_to_score,
        )
        .optional()
        .map_err(|e| Error::persistence("read latest score", e))
    }

    fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SimilarityScore>> {
        let conn = self.conn.lock();
        let since_millis = since.map_or(i64::MIN, |t| t.timestamp_millis());
        let mut stmt = conn
            .prepare(
                "SELECT computed_at, value, long_term_size, short_term_size, metric
                 FROM similarity_scores WHERE computed_at >= ?1 ORDER BY id ASC",
            )
            .map_err(|e| Error::persistence("read history", e))?;
        let rows = stmt
            .query_map(params![since_millis], Self::row_to_score)
            .map_err(|e| Error::persistence("read history", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::persistence("read history", e))
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM similarity_scores", [], |row| row.get(0))
            .map_err(|e| Error::persistence("count scores", e))?;
        Ok(n as usize)
    }
}
