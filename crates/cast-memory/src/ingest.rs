//! Ingestion boundary: wire casts become typed [`Cast`]s here or not at all.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::ValidationError;
use crate::types::{Cast, RawCast};

impl TryFrom<RawCast> for Cast {
    type Error = ValidationError;

    fn try_from(raw: RawCast) -> Result<Self, Self::Error> {
        let hash = match raw.hash {
            Some(h) if !h.trim().is_empty() => h,
            _ => {
                return Err(ValidationError {
                    cast_hash: None,
                    field: "hash",
                })
            }
        };

        let text = match raw.text {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                return Err(ValidationError {
                    cast_hash: Some(hash),
                    field: "text",
                })
            }
        };

        let author = raw.author.unwrap_or_default();
        let Some(author_fid) = author.fid else {
            return Err(ValidationError {
                cast_hash: Some(hash),
                field: "author.fid",
            });
        };

        // An unparseable timestamp is not fatal; created_at is optional.
        let created_at = raw
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Cast {
            hash,
            author_fid,
            author_username: author.username,
            text,
            created_at,
            metadata: raw.metadata,
        })
    }
}

/// Split a batch into valid casts and the reasons the rest were rejected.
///
/// Order of the valid casts follows the input.
pub fn validate_casts(raw: &[RawCast]) -> (Vec<Cast>, Vec<ValidationError>) {
    let mut valid = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();

    for cast in raw {
        match Cast::try_from(cast.clone()) {
            Ok(c) => valid.push(c),
            Err(e) => {
                warn!("skipping invalid cast: {e}");
                rejected.push(e);
            }
        }
    }

    (valid, rejected)
}
