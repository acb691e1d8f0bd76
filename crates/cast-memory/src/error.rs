//! Error taxonomy for the ingestion and memory pipeline.

use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Pipeline stage an upstream failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Feed,
    Reactions,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Feed => f.write_str("feed"),
            Stage::Reactions => f.write_str("reactions"),
        }
    }
}

/// The upstream API was unreachable or answered with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "upstream {}: {message}",
    .status.map_or_else(|| "unreachable".to_string(), |code| format!("returned {code}"))
)]
pub struct TransportError {
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

/// A cast missing a required field. Skipped, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cast {} is missing required field `{field}`", .cast_hash.as_deref().unwrap_or("<unknown>"))]
pub struct ValidationError {
    pub cast_hash: Option<String>,
    pub field: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to fetch {stage}: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not enough data to score alignment (long-term: {long_term}, short-term: {short_term})")]
    InsufficientData { long_term: usize, short_term: usize },

    #[error("analytics store failed to {operation}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create directory {}", .path.display())]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to embed cast {source_post_id}")]
    Embedding {
        source_post_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("vector store failed to {operation}")]
    VectorStore {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub(crate) fn transport(stage: Stage, source: TransportError) -> Self {
        Error::Transport { stage, source }
    }

    pub(crate) fn persistence(operation: &'static str, source: rusqlite::Error) -> Self {
        Error::Persistence { operation, source }
    }

    pub(crate) fn vector_store(operation: &'static str, source: anyhow::Error) -> Self {
        Error::VectorStore { operation, source }
    }
}
