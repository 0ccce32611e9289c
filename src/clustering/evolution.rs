//! Cluster evolution: merging new batch clusters into the persistent
//! population, plus the separately invoked consolidation pass

use super::{check_threshold, similarity_to_centroid, validate_population, ClusterError, ClusterResult};
use crate::signal::{BatchCluster, Cluster, ClusterAlias, ClusterId, Signal, SignalId};
use crate::vector::{self, VectorError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// What happened to one incoming batch cluster
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Appended to an existing cluster
    Merged { into: ClusterId, added: usize },
    /// Promoted into a new cluster
    Created { id: ClusterId, size: usize },
    /// Every signal was already owned; nothing changed
    Discarded,
}

/// Output of an evolve call
#[derive(Debug, Clone, Default)]
pub struct Evolution {
    /// The updated population, existing clusters first in their original order
    pub clusters: Vec<Cluster>,
    /// One outcome per incoming batch cluster, in input order
    pub outcomes: Vec<BatchOutcome>,
    /// Signal ids skipped because the population already owned them
    pub duplicates: Vec<SignalId>,
}

impl Evolution {
    pub fn created_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Created { .. }))
            .count()
    }

    pub fn merged_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Merged { .. }))
            .count()
    }
}

/// Output of a consolidation pass
#[derive(Debug, Clone, Default)]
pub struct Consolidation {
    pub clusters: Vec<Cluster>,
    /// One alias per merged-away cluster, pointing at its survivor
    pub aliases: Vec<ClusterAlias>,
}

/// Identity-preserving merge of batch clusters into a cluster population
///
/// Lower thresholds merge more aggressively; useful values sit between
/// 0.30 and 0.70 depending on the topic granularity wanted.
#[derive(Debug, Clone, Copy)]
pub struct ClusterEvolver {
    threshold: f32,
}

impl ClusterEvolver {
    pub fn new(threshold: f32) -> ClusterResult<Self> {
        check_threshold(threshold)?;
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Merge `new_batches` into `existing`.
    ///
    /// Each batch cluster is compared, by centroid, against the population in
    /// order (including clusters promoted earlier in this call) and merged
    /// into the first one at or above the threshold; otherwise it is promoted
    /// to a new cluster with a fresh id. Clusters are never merged with each
    /// other here; see [`ClusterEvolver::consolidate`].
    ///
    /// Signal ids already owned anywhere in the population are skipped and
    /// reported in [`Evolution::duplicates`]. All inputs are validated before
    /// anything is mutated.
    pub fn evolve(
        &self,
        existing: Vec<Cluster>,
        new_batches: Vec<BatchCluster>,
        now: DateTime<Utc>,
    ) -> ClusterResult<Evolution> {
        validate_population(&existing)?;
        validate_batches(&existing, &new_batches)?;

        let mut population = existing;
        warn_missing_centroids(&population);

        let mut owned: HashSet<SignalId> = population
            .iter()
            .flat_map(|c| c.signal_ids().cloned())
            .collect();
        let mut outcomes = Vec::with_capacity(new_batches.len());
        let mut duplicates = Vec::new();

        for (index, batch) in new_batches.into_iter().enumerate() {
            let batch_centroid = batch.centroid().to_vec();
            let target = first_match(&population, &batch_centroid, self.threshold)?;

            let mut members: Vec<(Signal, Vec<f32>)> = Vec::with_capacity(batch.len());
            for (signal, embedding) in batch.into_members() {
                if owned.insert(signal.signal_id.clone()) {
                    members.push((signal, embedding));
                } else {
                    warn!(signal_id = %signal.signal_id, batch = index, "skipping duplicate signal");
                    duplicates.push(signal.signal_id);
                }
            }

            if members.is_empty() {
                debug!(batch = index, "batch cluster held only duplicates");
                outcomes.push(BatchOutcome::Discarded);
                continue;
            }

            let added = members.len();
            match target {
                Some(pos) => {
                    let cluster = &mut population[pos];
                    cluster.absorb(members, now)?;
                    debug!(batch = index, cluster_id = %cluster.id(), added, "merged batch cluster");
                    outcomes.push(BatchOutcome::Merged {
                        into: cluster.id().clone(),
                        added,
                    });
                }
                None => {
                    let cluster = Cluster::promote(members, now)?;
                    debug!(batch = index, cluster_id = %cluster.id(), size = added, "promoted batch cluster");
                    outcomes.push(BatchOutcome::Created {
                        id: cluster.id().clone(),
                        size: added,
                    });
                    population.push(cluster);
                }
            }
        }

        let evolution = Evolution {
            clusters: population,
            outcomes,
            duplicates,
        };
        info!(
            clusters = evolution.clusters.len(),
            merged = evolution.merged_count(),
            created = evolution.created_count(),
            duplicates = evolution.duplicates.len(),
            "evolved cluster population"
        );
        Ok(evolution)
    }

    /// Collapse clusters in a population that have drifted into similarity.
    ///
    /// Clusters are visited in order; each merges into the first already-kept
    /// cluster whose centroid clears the threshold, otherwise it is kept. The
    /// survivor keeps its id and `created_at`. Every absorbed id is reported
    /// as an alias of its survivor so external caches can be re-keyed.
    pub fn consolidate(
        &self,
        population: Vec<Cluster>,
        now: DateTime<Utc>,
    ) -> ClusterResult<Consolidation> {
        validate_population(&population)?;
        check_population_dimension(&population)?;

        let before = population.len();
        let mut kept: Vec<Cluster> = Vec::with_capacity(before);
        let mut aliases = Vec::new();

        warn_missing_centroids(&population);
        for cluster in population {
            let centroid = cluster
                .resolved_centroid()
                .filter(|c| !vector::is_degenerate(c))
                .map(|c| c.into_owned());
            let Some(centroid) = centroid else {
                kept.push(cluster);
                continue;
            };

            match first_match(&kept, &centroid, self.threshold)? {
                Some(pos) => {
                    let alias = cluster.id().clone();
                    let survivor = &mut kept[pos];
                    survivor.absorb(cluster.into_members(), now)?;
                    debug!(alias = %alias, survivor = %survivor.id(), "consolidated cluster");
                    aliases.push(ClusterAlias {
                        alias,
                        survivor: survivor.id().clone(),
                        recorded_at: now,
                    });
                }
                None => kept.push(cluster),
            }
        }

        info!(before, after = kept.len(), "consolidated cluster population");
        Ok(Consolidation {
            clusters: kept,
            aliases,
        })
    }
}

/// Merge `new_batches` into `existing` at `similarity_threshold`, stamping
/// changes with the current time.
pub fn evolve_clusters(
    existing: Vec<Cluster>,
    new_batches: Vec<BatchCluster>,
    similarity_threshold: f32,
) -> ClusterResult<Evolution> {
    ClusterEvolver::new(similarity_threshold)?.evolve(existing, new_batches, Utc::now())
}

/// Run the consolidation pass over a full population.
pub fn consolidate_clusters(
    population: Vec<Cluster>,
    similarity_threshold: f32,
) -> ClusterResult<Consolidation> {
    ClusterEvolver::new(similarity_threshold)?.consolidate(population, Utc::now())
}

/// Index of the first cluster whose centroid is at least `threshold` similar.
fn first_match(population: &[Cluster], centroid: &[f32], threshold: f32) -> ClusterResult<Option<usize>> {
    for (pos, cluster) in population.iter().enumerate() {
        let Some(candidate) = cluster.resolved_centroid() else {
            continue;
        };
        if let Some(sim) = similarity_to_centroid(centroid, &candidate)? {
            if sim >= threshold {
                return Ok(Some(pos));
            }
        }
    }
    Ok(None)
}

/// Clusters loaded without a centroid are matched on one recomputed from
/// their embeddings. The stored cluster is left as it is.
fn warn_missing_centroids(population: &[Cluster]) {
    for cluster in population {
        if cluster.centroid().is_none() && !cluster.is_empty() {
            warn!(cluster_id = %cluster.id(), "matching on recomputed centroid");
        }
    }
}

fn check_population_dimension(population: &[Cluster]) -> ClusterResult<Option<usize>> {
    let mut dimension = None;
    for cluster in population {
        if let Some(dim) = cluster.dimension() {
            match dimension {
                None => dimension = Some(dim),
                Some(expected) if expected != dim => {
                    return Err(VectorError::DimensionMismatch {
                        expected,
                        actual: dim,
                    }
                    .into());
                }
                _ => {}
            }
        }
    }
    Ok(dimension)
}

/// Reject empty or degenerate batch clusters and dimension mismatches
/// before the population is touched.
fn validate_batches(existing: &[Cluster], batches: &[BatchCluster]) -> ClusterResult<()> {
    let mut dimension = check_population_dimension(existing)?;
    for (index, batch) in batches.iter().enumerate() {
        if batch.is_empty() {
            return Err(ClusterError::EmptyBatchCluster { index });
        }
        if vector::is_degenerate(batch.centroid()) {
            return Err(ClusterError::DegenerateBatchCentroid { index });
        }
        let dim = batch.centroid().len();
        match dimension {
            None => dimension = Some(dim),
            Some(expected) if expected != dim => {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: dim,
                }
                .into());
            }
            _ => {}
        }
    }
    Ok(())
}
