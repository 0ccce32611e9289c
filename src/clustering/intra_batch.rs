//! Intra-batch clustering: one greedy pass over a single ingestion batch

use super::{check_threshold, similarity_to_centroid, ClusterResult};
use crate::signal::{BatchCluster, EmbeddedSignal};
use crate::vector::{self, VectorError};
use tracing::{debug, warn};

/// Output of [`cluster_batch`]
#[derive(Debug, Clone, Default)]
pub struct BatchClustering {
    /// Batch clusters in creation order; never empty
    pub clusters: Vec<BatchCluster>,
    /// Items left out because their embedding has zero or non-finite norm
    pub excluded: Vec<EmbeddedSignal>,
}

impl BatchClustering {
    /// Total number of signals placed into clusters
    pub fn signal_count(&self) -> usize {
        self.clusters.iter().map(BatchCluster::len).sum()
    }
}

/// Group one batch of embedded signals into loose clusters.
///
/// Items are visited in input order. Each is compared against the current
/// centroid of every cluster opened so far and joins the first whose
/// similarity is at least `similarity_threshold`; otherwise it opens a new
/// cluster. Centroids drift as members join, and earlier assignments are
/// never revisited, so reordering the input can change the result.
///
/// Degenerate embeddings are excluded up front and returned in
/// [`BatchClustering::excluded`]. Mixed embedding dimensions are an error.
pub fn cluster_batch(
    items: impl IntoIterator<Item = EmbeddedSignal>,
    similarity_threshold: f32,
) -> ClusterResult<BatchClustering> {
    check_threshold(similarity_threshold)?;

    let mut clusters: Vec<BatchCluster> = Vec::new();
    let mut excluded = Vec::new();
    let mut dimension: Option<usize> = None;

    for item in items {
        if vector::is_degenerate(&item.embedding) {
            warn!(signal_id = %item.id(), "excluding degenerate embedding from batch clustering");
            excluded.push(item);
            continue;
        }

        match dimension {
            Some(expected) if expected != item.embedding.len() => {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: item.embedding.len(),
                }
                .into());
            }
            None => dimension = Some(item.embedding.len()),
            _ => {}
        }

        let mut target = None;
        for (idx, cluster) in clusters.iter().enumerate() {
            if let Some(sim) = similarity_to_centroid(&item.embedding, cluster.centroid())? {
                if sim >= similarity_threshold {
                    target = Some((idx, sim));
                    break;
                }
            }
        }

        match target {
            Some((idx, sim)) => {
                debug!(signal_id = %item.id(), cluster = idx, similarity = sim, "joined batch cluster");
                clusters[idx].push(item)?;
            }
            None => {
                debug!(signal_id = %item.id(), cluster = clusters.len(), "opened batch cluster");
                clusters.push(BatchCluster::seed(item));
            }
        }
    }

    debug!(
        clusters = clusters.len(),
        excluded = excluded.len(),
        threshold = similarity_threshold,
        "batch clustering complete"
    );

    Ok(BatchClustering { clusters, excluded })
}
