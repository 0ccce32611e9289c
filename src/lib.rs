//! Trendline: incremental topic clustering for signal streams
//!
//! Short text items ("signals") arrive in irregular batches, get embedded,
//! and are folded into a persistent population of topic clusters that keep
//! a stable identity across runs.
//!
//! # Core Concepts
//!
//! - **Intra-batch clustering**: greedy first-match grouping within a batch
//! - **Evolution**: merging batch clusters into the population by centroid
//! - **Consolidation**: a maintenance pass that collapses drifted clusters
//!   and records aliases for the absorbed ids
//! - **Scoring**: emergence (recent growth) and grounding (evidence)
//!
//! # Example
//!
//! ```
//! use trendline::{cluster_batch, evolve_clusters, EmbeddedSignal, Signal};
//! use chrono::Utc;
//!
//! let items = vec![
//!     EmbeddedSignal::new(Signal::new("a", "rust 2.0 announced", Utc::now(), "hn"), vec![1.0, 0.0]),
//!     EmbeddedSignal::new(Signal::new("b", "rust 2.0 details", Utc::now(), "rss"), vec![0.9, 0.1]),
//! ];
//! let batch = cluster_batch(items, 0.5).unwrap();
//! let evolution = evolve_clusters(Vec::new(), batch.clusters, 0.5).unwrap();
//! assert_eq!(evolution.clusters.len(), 1);
//! assert_eq!(evolution.clusters[0].signal_count(), 2);
//! ```

pub mod clustering;
pub mod config;
pub mod embedding;
pub mod pipeline;
pub mod scoring;
mod signal;
pub mod storage;
pub mod vector;

pub use clustering::{
    check_persistence, cluster_batch, consolidate_clusters, contextualize_in_batch,
    contextualize_signal, evolve_clusters, validate_population, BatchClustering, BatchOutcome, ClusterError, ClusterEvolver,
    ClusterResult, Consolidation, Evolution, PersistenceVerdict, SignalContext,
};
pub use config::{ConfigError, EngineConfig, StorageBackend};
pub use embedding::{Embedder, EmbeddingError};
#[cfg(feature = "embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use pipeline::{CycleReport, Pipeline, PipelineError, PipelineResult, Resolution};
pub use scoring::{
    build_emerging_feed, build_window_feed, compute_cluster_grounding, compute_emergence,
    filter_clusters_by_time, score_cluster, time_window_bounds, EmergenceConfig,
    EmergenceThresholds, FeedItem, TimeWindowBounds,
};
pub use signal::{
    timestamp, BatchCluster, Cluster, ClusterAlias, ClusterId, EmbeddedSignal, EmergenceLevel,
    ScoreAttachment, Signal, SignalId, ValidationError,
};
pub use storage::{
    ClusterRepository, InMemoryVectorIndex, JsonFileStore, OpenStore, SqliteStore, StorageError,
    StorageResult, VectorIndex,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
