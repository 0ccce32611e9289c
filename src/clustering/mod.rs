//! Incremental clustering: intra-batch grouping, population evolution,
//! and the persistence gate
//!
//! Both clustering passes are greedy and first-match: every item is compared
//! against clusters in their current order and joins the first one whose
//! centroid clears the threshold. Output therefore depends on input order.

mod evolution;
mod intra_batch;
mod persistence;

pub use evolution::{
    consolidate_clusters, evolve_clusters, BatchOutcome, ClusterEvolver, Consolidation, Evolution,
};
pub use intra_batch::{cluster_batch, BatchClustering};
pub use persistence::{
    check_persistence, contextualize_in_batch, contextualize_signal, Neighbor, PersistenceVerdict,
    SignalContext, DEFAULT_MIN_SIMILAR, DEFAULT_TOP_K,
};

use crate::signal::{Cluster, ClusterId, SignalId, ValidationError};
use crate::vector::{self, VectorError};
use std::collections::HashMap;
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised by the clustering passes
///
/// These are contract violations. The passes never recover silently since
/// that would corrupt the shared population.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("invalid cluster: {0}")]
    Validation(#[from] ValidationError),

    #[error("batch cluster {index} has no signals")]
    EmptyBatchCluster { index: usize },

    #[error("batch cluster {index} has a degenerate centroid")]
    DegenerateBatchCentroid { index: usize },

    #[error("similarity threshold must be finite and within [-1, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("signal {signal_id} is owned by both {first} and {second}")]
    SharedOwnership {
        signal_id: SignalId,
        first: ClusterId,
        second: ClusterId,
    },

    #[error("duplicate cluster id in population: {0}")]
    DuplicateClusterId(ClusterId),
}

/// Result type for clustering operations
pub type ClusterResult<T> = Result<T, ClusterError>;

pub(crate) fn check_threshold(threshold: f32) -> ClusterResult<()> {
    if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
        return Err(ClusterError::InvalidThreshold(threshold));
    }
    Ok(())
}

/// Similarity of `v` to a centroid, or `None` when the centroid is
/// degenerate and can match nothing.
pub(crate) fn similarity_to_centroid(v: &[f32], centroid: &[f32]) -> ClusterResult<Option<f32>> {
    if vector::is_degenerate(centroid) {
        return Ok(None);
    }
    Ok(Some(vector::cosine_similarity(v, centroid)?))
}

/// Check population-wide invariants: unique cluster ids and exclusive
/// signal ownership.
pub fn validate_population(clusters: &[Cluster]) -> ClusterResult<()> {
    let mut ids = HashSet::with_capacity(clusters.len());
    let mut owners: HashMap<&SignalId, &ClusterId> = HashMap::new();

    for cluster in clusters {
        if !ids.insert(cluster.id()) {
            return Err(ClusterError::DuplicateClusterId(cluster.id().clone()));
        }
        for signal_id in cluster.signal_ids() {
            if let Some(first) = owners.insert(signal_id, cluster.id()) {
                return Err(ClusterError::SharedOwnership {
                    signal_id: signal_id.clone(),
                    first: first.clone(),
                    second: cluster.id().clone(),
                });
            }
        }
    }
    Ok(())
}
