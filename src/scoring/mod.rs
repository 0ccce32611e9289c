//! Cluster scoring: emergence, grounding, and the views built on them

mod emergence;
mod feed;
mod grounding;
mod time_filter;

pub use emergence::{
    compute_emergence, compute_emergence_with, Emergence, EmergenceConfig, EmergenceThresholds,
};
pub use feed::{build_emerging_feed, build_window_feed, FeedItem};
pub use grounding::{compute_cluster_grounding, Grounding};
pub use time_filter::{filter_clusters_by_time, time_window_bounds, TimeWindowBounds};

use crate::signal::{Cluster, ScoreAttachment};
use chrono::{DateTime, Utc};

/// Score a cluster in place and return both metric sets.
///
/// Emergence is attached first so grounding reads the same growth ratio.
pub fn score_cluster(
    cluster: &mut Cluster,
    config: &EmergenceConfig,
    now: DateTime<Utc>,
) -> (Emergence, Grounding) {
    let emergence = compute_emergence_with(cluster, config.recent_days, &config.thresholds, now);
    cluster.set_scores(ScoreAttachment::from_growth(
        emergence.emergence_level,
        emergence.growth_ratio,
    ));

    let grounding = compute_cluster_grounding(cluster);
    cluster.set_scores(ScoreAttachment {
        emergence_level: emergence.emergence_level,
        growth_ratio: emergence.growth_ratio,
        coherence: grounding.coherence,
        recency_pct: grounding.recency_pct,
        source_diversity: grounding.source_diversity,
    });
    (emergence, grounding)
}
