//! Time-window views over the cluster population

use super::emergence::EmergenceThresholds;
use crate::signal::{Cluster, ScoreAttachment};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Slider bounds for the time window, in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindowBounds {
    pub min_days: u32,
    pub max_days: u32,
    pub default_days: u32,
}

impl Default for TimeWindowBounds {
    fn default() -> Self {
        Self {
            min_days: 1,
            max_days: 30,
            default_days: 7,
        }
    }
}

/// Restrict every cluster to the signals of the last `days` days.
///
/// Each view keeps its cluster id and carries a growth ratio of
/// kept / original. Clusters with nothing inside the window are dropped.
pub fn filter_clusters_by_time(
    clusters: &[Cluster],
    days: u32,
    thresholds: &EmergenceThresholds,
    now: DateTime<Utc>,
) -> Vec<Cluster> {
    let cutoff = now - Duration::days(i64::from(days));
    clusters
        .iter()
        .filter_map(|cluster| {
            let mut view = cluster.filtered(|s| s.timestamp >= cutoff)?;
            let ratio = view.signal_count() as f64 / cluster.signal_count() as f64;
            view.set_scores(ScoreAttachment::from_growth(thresholds.classify(ratio), ratio));
            Some(view)
        })
        .collect()
}

/// Window bounds spanning the population's history.
pub fn time_window_bounds(clusters: &[Cluster], now: DateTime<Utc>) -> TimeWindowBounds {
    let oldest = clusters
        .iter()
        .flat_map(|c| c.signals())
        .map(|s| s.timestamp)
        .min();
    let Some(oldest) = oldest else {
        return TimeWindowBounds::default();
    };

    let span = (now - oldest).num_days().max(1);
    let max_days = if span <= 1 {
        7
    } else {
        u32::try_from(span).unwrap_or(u32::MAX)
    };
    TimeWindowBounds {
        min_days: 1,
        max_days,
        default_days: max_days,
    }
}
