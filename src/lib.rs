//! castmind: builds long-term and short-term memory from a Farcaster
//! account and tracks how closely the two align over time.
//!
//! The ingestion and memory core lives in the `cast-memory` crate; this
//! crate adds configuration, the Neynar and embedding HTTP clients, and the
//! pipeline runner used by the `castmind` binary.

pub mod config;
pub mod embedder;
pub mod neynar;
pub mod pipeline;

pub use config::Config;
pub use pipeline::{Collaborators, Pipeline, PipelineOutcome};
