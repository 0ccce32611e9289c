//! Emergence: recency-based growth of a cluster

use crate::signal::{Cluster, EmergenceLevel};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive lower bounds on the growth ratio for each level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergenceThresholds {
    pub rapid: f64,
    pub stable: f64,
}

impl Default for EmergenceThresholds {
    fn default() -> Self {
        Self {
            rapid: 0.6,
            stable: 0.3,
        }
    }
}

impl EmergenceThresholds {
    pub fn classify(&self, growth_ratio: f64) -> EmergenceLevel {
        if growth_ratio >= self.rapid {
            EmergenceLevel::Rapid
        } else if growth_ratio >= self.stable {
            EmergenceLevel::Stable
        } else {
            EmergenceLevel::Dormant
        }
    }
}

/// Emergence settings: the recent window and the level thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergenceConfig {
    pub recent_days: u32,
    #[serde(flatten)]
    pub thresholds: EmergenceThresholds,
}

impl Default for EmergenceConfig {
    fn default() -> Self {
        Self {
            recent_days: 30,
            thresholds: EmergenceThresholds::default(),
        }
    }
}

/// Growth metrics for one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emergence {
    pub recent_count: usize,
    pub total_count: usize,
    /// `recent_count / total_count`, rounded to two decimals
    pub growth_ratio: f64,
    pub emergence_level: EmergenceLevel,
}

/// Compute growth metrics with the default thresholds.
pub fn compute_emergence(cluster: &Cluster, recent_days: u32, now: DateTime<Utc>) -> Emergence {
    compute_emergence_with(cluster, recent_days, &EmergenceThresholds::default(), now)
}

/// Compute growth metrics: the share of member signals timestamped within
/// `recent_days` of `now`. An empty cluster has a ratio of 0.
pub fn compute_emergence_with(
    cluster: &Cluster,
    recent_days: u32,
    thresholds: &EmergenceThresholds,
    now: DateTime<Utc>,
) -> Emergence {
    let cutoff = now - Duration::days(i64::from(recent_days));
    let total_count = cluster.signal_count();
    let recent_count = cluster
        .signals()
        .iter()
        .filter(|s| s.timestamp >= cutoff)
        .count();

    let growth_ratio = if total_count > 0 {
        recent_count as f64 / total_count as f64
    } else {
        0.0
    };

    Emergence {
        recent_count,
        total_count,
        growth_ratio: round_to(growth_ratio, 2),
        emergence_level: thresholds.classify(growth_ratio),
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    /// Cluster of `total` signals, the first `recent` of them one day old,
    /// the rest ninety days old.
    fn cluster_with(recent: usize, total: usize) -> Cluster {
        let members = (0..total)
            .map(|i| {
                let age = if i < recent { 1 } else { 90 };
                let signal = Signal::new(format!("s{i}"), "t", now() - Duration::days(age), "src");
                (signal, vec![1.0, i as f32])
            })
            .collect();
        Cluster::promote(members, now()).unwrap()
    }

    #[test]
    fn classification_boundaries() {
        let t = EmergenceThresholds::default();
        assert_eq!(t.classify(0.65), EmergenceLevel::Rapid);
        assert_eq!(t.classify(0.6), EmergenceLevel::Rapid);
        assert_eq!(t.classify(0.45), EmergenceLevel::Stable);
        assert_eq!(t.classify(0.3), EmergenceLevel::Stable);
        assert_eq!(t.classify(0.10), EmergenceLevel::Dormant);
        assert_eq!(t.classify(0.0), EmergenceLevel::Dormant);
    }

    #[test]
    fn exact_boundaries_from_signal_counts() {
        let rapid = compute_emergence(&cluster_with(6, 10), 30, now());
        assert_eq!(rapid.growth_ratio, 0.6);
        assert_eq!(rapid.emergence_level, EmergenceLevel::Rapid);

        let stable = compute_emergence(&cluster_with(3, 10), 30, now());
        assert_eq!(stable.growth_ratio, 0.3);
        assert_eq!(stable.emergence_level, EmergenceLevel::Stable);

        let dormant = compute_emergence(&cluster_with(1, 10), 30, now());
        assert_eq!(dormant.emergence_level, EmergenceLevel::Dormant);
    }

    #[test]
    fn counts_recent_and_total() {
        let e = compute_emergence(&cluster_with(2, 3), 30, now());
        assert_eq!(e.recent_count, 2);
        assert_eq!(e.total_count, 3);
        assert_eq!(e.growth_ratio, 0.67);
        assert_eq!(e.emergence_level, EmergenceLevel::Rapid);
    }

    #[test]
    fn window_is_inclusive_at_cutoff() {
        let signal = Signal::new("edge", "t", now() - Duration::days(30), "src");
        let cluster = Cluster::promote(vec![(signal, vec![1.0])], now()).unwrap();
        assert_eq!(compute_emergence(&cluster, 30, now()).recent_count, 1);
    }

    #[test]
    fn empty_cluster_has_zero_ratio() {
        let cluster = Cluster::from_parts(
            crate::signal::ClusterId::new(),
            Vec::new(),
            Vec::new(),
            None,
            now(),
            now(),
        )
        .unwrap();
        let e = compute_emergence(&cluster, 30, now());
        assert_eq!(e.growth_ratio, 0.0);
        assert_eq!(e.emergence_level, EmergenceLevel::Dormant);
    }

    #[test]
    fn custom_thresholds_apply() {
        let strict = EmergenceThresholds {
            rapid: 0.9,
            stable: 0.5,
        };
        let e = compute_emergence_with(&cluster_with(6, 10), 30, &strict, now());
        assert_eq!(e.emergence_level, EmergenceLevel::Stable);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.666_666, 2), 0.67);
        assert_eq!(round_to(66.666_6, 1), 66.7);
    }
}
