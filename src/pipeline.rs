//! One ingestion cycle, end to end
//!
//! Steps:
//! 1. Embed incoming signals (skipped when embeddings are supplied)
//! 2. Optionally gate out signals with too little history behind them;
//!    the rest of the batch counts as history
//! 3. Group the batch with the intra-batch pass
//! 4. Evolve the persisted population with the batch clusters
//! 5. Score and validate the population
//! 6. Record every signal in the history index, then save the population
//!
//! Nothing is written before step 6, so a failed cycle leaves both stores
//! as they were.

use crate::clustering::{
    check_persistence, cluster_batch, contextualize_in_batch, validate_population, ClusterError,
    ClusterEvolver,
};
use crate::config::{ConfigError, EngineConfig};
use crate::embedding::{embed_signals, Embedder, EmbeddingError};
use crate::scoring::{
    build_emerging_feed, build_window_feed, score_cluster, time_window_bounds, FeedItem,
    TimeWindowBounds,
};
use crate::signal::{Cluster, ClusterId, EmbeddedSignal, EmergenceLevel, Signal, SignalId};
use crate::storage::{ClusterRepository, StorageError, VectorIndex};
use crate::vector;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("clustering failed: {0}")]
    Clustering(#[from] ClusterError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Summary of one ingestion cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub received: usize,
    /// Dropped by the persistence gate
    pub gated_out: Vec<SignalId>,
    /// Zero-norm embeddings left out of clustering
    pub excluded: Vec<SignalId>,
    pub batch_clusters: usize,
    pub merged: usize,
    pub created: usize,
    /// Already owned by the population
    pub duplicates: Vec<SignalId>,
    /// Population size after the cycle
    pub population: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsolidationReport {
    pub before: usize,
    pub after: usize,
    /// `(alias, survivor)` pairs recorded in this pass
    pub merged: Vec<(ClusterId, ClusterId)>,
}

/// Where a cluster id points now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The id is live in the population
    Current(ClusterId),
    /// The id was consolidated into this survivor
    Aliased(ClusterId),
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PopulationStats {
    pub clusters: usize,
    pub signals: usize,
    pub rapid: usize,
    pub stable: usize,
    pub dormant: usize,
    pub largest: usize,
}

/// Wires the clustering engine to its collaborators.
pub struct Pipeline {
    repository: Arc<dyn ClusterRepository>,
    index: Arc<dyn VectorIndex>,
    embedder: Option<Arc<dyn Embedder>>,
    config: EngineConfig,
    evolver: ClusterEvolver,
    consolidator: ClusterEvolver,
}

impl Pipeline {
    pub fn new(
        repository: Arc<dyn ClusterRepository>,
        index: Arc<dyn VectorIndex>,
        config: EngineConfig,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let evolver = ClusterEvolver::new(config.clustering.evolution_threshold)?;
        let consolidator = ClusterEvolver::new(config.clustering.consolidation_threshold)?;
        Ok(Self {
            repository,
            index,
            embedder: None,
            config,
            evolver,
            consolidator,
        })
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn embedder(&self) -> Option<&dyn Embedder> {
        self.embedder.as_deref()
    }

    /// Embed raw signals, then run a full cycle.
    pub fn ingest(&self, signals: Vec<Signal>, now: DateTime<Utc>) -> PipelineResult<CycleReport> {
        let embedder = self.embedder.as_deref().ok_or(EmbeddingError::Unavailable)?;
        let items = embed_signals(embedder, signals)?;
        self.ingest_embedded(items, now)
    }

    /// Run a full cycle over signals that already carry embeddings.
    pub fn ingest_embedded(
        &self,
        items: Vec<EmbeddedSignal>,
        now: DateTime<Utc>,
    ) -> PipelineResult<CycleReport> {
        let received = items.len();
        if items.is_empty() {
            let population = self.repository.load()?.len();
            return Ok(CycleReport {
                population,
                ..CycleReport::default()
            });
        }

        let gated_out = if self.config.persistence.gate_batches {
            self.gate(&items)?
        } else {
            Vec::new()
        };

        let noise: HashSet<&SignalId> = gated_out.iter().collect();
        let kept: Vec<EmbeddedSignal> = items
            .iter()
            .filter(|item| !noise.contains(item.id()))
            .cloned()
            .collect();

        let batch = cluster_batch(kept, self.config.clustering.intra_batch_threshold)?;
        let excluded: Vec<SignalId> = batch.excluded.iter().map(|i| i.id().clone()).collect();
        let batch_clusters = batch.clusters.len();

        let existing = self.repository.load()?;
        let evolution = self.evolver.evolve(existing, batch.clusters, now)?;
        let merged = evolution.merged_count();
        let created = evolution.created_count();

        let mut clusters = evolution.clusters;
        self.score_all(&mut clusters, now);
        validate_population(&clusters)?;

        // History records every signal, noise included, so later arrivals
        // can find it as a neighbour.
        self.index.upsert_batch(&items)?;
        self.repository.save(&clusters)?;

        let report = CycleReport {
            received,
            gated_out,
            excluded,
            batch_clusters,
            merged,
            created,
            duplicates: evolution.duplicates,
            population: clusters.len(),
        };
        info!(
            received = report.received,
            gated_out = report.gated_out.len(),
            batch_clusters = report.batch_clusters,
            merged = report.merged,
            created = report.created,
            population = report.population,
            "ingestion cycle complete"
        );
        Ok(report)
    }

    /// Ids of the items without enough history behind them. The other
    /// members of the batch count as history, so a fresh burst of related
    /// signals passes together. Degenerate items pass; the intra-batch pass
    /// excludes them.
    fn gate(&self, items: &[EmbeddedSignal]) -> PipelineResult<Vec<SignalId>> {
        let p = &self.config.persistence;
        let mut gated_out = Vec::new();
        for item in items {
            if vector::is_degenerate(&item.embedding) {
                continue;
            }
            let context =
                contextualize_in_batch(item, items, self.index.as_ref(), p.top_k, p.min_similarity)?;
            let verdict = check_persistence(&item.signal, &context.signals(), p.min_similar);
            if !verdict.is_persistent {
                debug!(signal_id = %item.id(), reason = %verdict.reason, "gated out signal");
                gated_out.push(item.id().clone());
            }
        }
        Ok(gated_out)
    }

    fn score_all(&self, clusters: &mut [Cluster], now: DateTime<Utc>) {
        for cluster in clusters.iter_mut() {
            score_cluster(cluster, &self.config.emergence, now);
        }
    }

    /// Collapse drifted-together clusters and record their aliases.
    pub fn consolidate(&self, now: DateTime<Utc>) -> PipelineResult<ConsolidationReport> {
        let population = self.repository.load()?;
        let before = population.len();
        let consolidation = self.consolidator.consolidate(population, now)?;

        let mut clusters = consolidation.clusters;
        self.score_all(&mut clusters, now);
        validate_population(&clusters)?;

        // Aliases first: a crash between the two writes leaves dangling
        // aliases, never unreachable ids.
        self.repository.record_aliases(&consolidation.aliases)?;
        self.repository.save(&clusters)?;

        Ok(ConsolidationReport {
            before,
            after: clusters.len(),
            merged: consolidation
                .aliases
                .into_iter()
                .map(|a| (a.alias, a.survivor))
                .collect(),
        })
    }

    pub fn feed(&self, now: DateTime<Utc>) -> PipelineResult<Vec<FeedItem>> {
        let clusters = self.repository.load()?;
        let e = &self.config.emergence;
        Ok(build_emerging_feed(&clusters, e.recent_days, &e.thresholds, now))
    }

    /// The feed restricted to signals from the last `window_days` days.
    pub fn feed_within(&self, window_days: u32, now: DateTime<Utc>) -> PipelineResult<Vec<FeedItem>> {
        let clusters = self.repository.load()?;
        Ok(build_window_feed(&clusters, window_days, &self.config.emergence.thresholds, now))
    }

    /// Sensible time-window range for the stored population
    pub fn window_bounds(&self, now: DateTime<Utc>) -> PipelineResult<TimeWindowBounds> {
        let clusters = self.repository.load()?;
        Ok(time_window_bounds(&clusters, now))
    }

    pub fn stats(&self, now: DateTime<Utc>) -> PipelineResult<PopulationStats> {
        let mut clusters = self.repository.load()?;
        self.score_all(&mut clusters, now);

        let mut stats = PopulationStats {
            clusters: clusters.len(),
            ..PopulationStats::default()
        };
        for cluster in &clusters {
            stats.signals += cluster.signal_count();
            stats.largest = stats.largest.max(cluster.signal_count());
            match cluster.scores().map(|s| s.emergence_level) {
                Some(EmergenceLevel::Rapid) => stats.rapid += 1,
                Some(EmergenceLevel::Stable) => stats.stable += 1,
                Some(EmergenceLevel::Dormant) | None => stats.dormant += 1,
            }
        }
        Ok(stats)
    }

    /// Follow a possibly stale cluster id to the cluster that holds its
    /// signals today.
    pub fn resolve(&self, id: &ClusterId) -> PipelineResult<Resolution> {
        let clusters = self.repository.load()?;
        if clusters.iter().any(|c| c.id() == id) {
            return Ok(Resolution::Current(id.clone()));
        }
        Ok(match self.repository.resolve_alias(id)? {
            Some(survivor) => Resolution::Aliased(survivor),
            None => Resolution::Unknown,
        })
    }
}
