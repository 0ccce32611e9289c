//! Storage trait definitions

use crate::signal::{Cluster, ClusterAlias, ClusterId, EmbeddedSignal, Signal, SignalId, ValidationError};
use crate::vector::VectorError;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Invalid cluster {cluster_id}: {source}")]
    InvalidCluster {
        cluster_id: String,
        #[source]
        source: ValidationError,
    },

    #[error("Clusters {first} and {second} map to the same point id {point_id}")]
    PointIdCollision {
        point_id: i64,
        first: ClusterId,
        second: ClusterId,
    },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A signal returned by a nearest-neighbour query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSignal {
    pub signal: Signal,
    pub similarity: f32,
}

/// One page of a full-index scroll
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<EmbeddedSignal>,
    /// Cursor for the next page; `None` once the index is exhausted
    pub next_offset: Option<u64>,
}

/// Persistent home of the cluster population
///
/// The engine only ever loads the whole population and saves it back; a
/// single writer per ingestion cycle is assumed. Implementations must
/// round-trip every cluster field, embeddings included.
pub trait ClusterRepository: Send + Sync {
    /// Load the full population in its saved order
    fn load(&self) -> StorageResult<Vec<Cluster>>;

    /// Replace the stored population
    fn save(&self, clusters: &[Cluster]) -> StorageResult<()>;

    /// Remember that merged-away cluster ids now live on in their survivors.
    ///
    /// Existing aliases that pointed at a newly absorbed cluster are
    /// re-pointed so lookups stay one hop.
    fn record_aliases(&self, aliases: &[ClusterAlias]) -> StorageResult<()>;

    /// The surviving id for a cluster that was merged away, if any
    fn resolve_alias(&self, id: &ClusterId) -> StorageResult<Option<ClusterId>>;
}

/// Vector index over the full signal history
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a point
    fn upsert(&self, id: &SignalId, vector: &[f32], payload: &Signal) -> StorageResult<()>;

    /// The `top_k` most similar points, most similar first
    fn query_nearest(&self, vector: &[f32], top_k: usize) -> StorageResult<Vec<ScoredSignal>>;

    /// Page through every point. Pass `None` to start, then each page's
    /// `next_offset`.
    fn scroll(&self, offset: Option<u64>, limit: usize) -> StorageResult<ScrollPage>;

    /// Upsert a batch of embedded signals
    fn upsert_batch(&self, items: &[EmbeddedSignal]) -> StorageResult<()> {
        for item in items {
            self.upsert(item.id(), &item.embedding, &item.signal)?;
        }
        Ok(())
    }

    /// Collect every point by scrolling to the end
    fn scroll_all(&self, page_size: usize) -> StorageResult<Vec<EmbeddedSignal>> {
        let mut all = Vec::new();
        let mut offset = None;
        loop {
            let page = self.scroll(offset, page_size.max(1))?;
            all.extend(page.points);
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(all)
    }
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
