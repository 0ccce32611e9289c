//! Emerging-trends feed

use super::emergence::{compute_emergence_with, round_to, EmergenceThresholds};
use super::grounding::{compute_cluster_grounding, grounding_with_growth};
use super::time_filter::filter_clusters_by_time;
use crate::signal::{Cluster, ClusterId, EmergenceLevel};
use chrono::{DateTime, Utc};
use serde::Serialize;

const TITLE_MAX_CHARS: usize = 120;

/// One ranked entry of the emerging feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    pub cluster_id: ClusterId,
    pub signal_count: usize,
    pub emergence_level: EmergenceLevel,
    pub growth_ratio: f64,
    #[serde(with = "crate::signal::timestamp")]
    pub created_at: DateTime<Utc>,
    /// First member's text, truncated; stands in until a title is generated
    pub representative_title: String,
    pub explanation: String,
}

/// Score every cluster and rank them, rapid before stable before dormant,
/// then by growth ratio. Ties keep population order.
pub fn build_emerging_feed(
    clusters: &[Cluster],
    recent_days: u32,
    thresholds: &EmergenceThresholds,
    now: DateTime<Utc>,
) -> Vec<FeedItem> {
    let items: Vec<FeedItem> = clusters
        .iter()
        .map(|cluster| {
            let emergence = compute_emergence_with(cluster, recent_days, thresholds, now);
            let grounding = grounding_with_growth(cluster, emergence.growth_ratio);
            FeedItem {
                cluster_id: cluster.id().clone(),
                signal_count: emergence.total_count,
                emergence_level: emergence.emergence_level,
                growth_ratio: emergence.growth_ratio,
                created_at: cluster.created_at(),
                representative_title: representative_title(cluster),
                explanation: grounding.explanation,
            }
        })
        .collect();
    rank(items)
}

/// Feed over the last `window_days` days only.
///
/// Each entry describes the cluster's signals inside the window; its growth
/// ratio is the share of the cluster that falls inside. Clusters with no
/// signal in the window are left out.
pub fn build_window_feed(
    clusters: &[Cluster],
    window_days: u32,
    thresholds: &EmergenceThresholds,
    now: DateTime<Utc>,
) -> Vec<FeedItem> {
    let items: Vec<FeedItem> = filter_clusters_by_time(clusters, window_days, thresholds, now)
        .iter()
        .filter_map(|view| {
            let scores = view.scores()?;
            let grounding = compute_cluster_grounding(view);
            Some(FeedItem {
                cluster_id: view.id().clone(),
                signal_count: view.signal_count(),
                emergence_level: scores.emergence_level,
                growth_ratio: round_to(scores.growth_ratio, 2),
                created_at: view.created_at(),
                representative_title: representative_title(view),
                explanation: grounding.explanation,
            })
        })
        .collect();
    rank(items)
}

fn rank(mut items: Vec<FeedItem>) -> Vec<FeedItem> {
    items.sort_by(|a, b| {
        b.emergence_level
            .priority()
            .cmp(&a.emergence_level.priority())
            .then_with(|| b.growth_ratio.total_cmp(&a.growth_ratio))
    });
    items
}

fn representative_title(cluster: &Cluster) -> String {
    match cluster.signals().first() {
        Some(signal) => signal.text.chars().take(TITLE_MAX_CHARS).collect(),
        None => "No signals".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    fn cluster(prefix: &str, ages: &[i64]) -> Cluster {
        let members = ages
            .iter()
            .enumerate()
            .map(|(i, age)| {
                let signal = Signal::new(
                    format!("{prefix}-{i}"),
                    format!("{prefix} headline {i}"),
                    now() - Duration::days(*age),
                    format!("source-{i}"),
                );
                (signal, vec![1.0, 0.1 * i as f32])
            })
            .collect();
        Cluster::promote(members, now()).unwrap()
    }

    #[test]
    fn feed_is_ranked_by_level_then_growth() {
        let dormant = cluster("dormant", &[90, 90, 90, 90]);
        let stable = cluster("stable", &[1, 90, 90]);
        let rapid_half = cluster("rapid-a", &[1, 1, 1, 90, 90]);
        let rapid_full = cluster("rapid-b", &[1, 2]);
        let population = vec![dormant, stable, rapid_half, rapid_full];

        let feed = build_emerging_feed(&population, 30, &EmergenceThresholds::default(), now());
        let titles: Vec<&str> = feed.iter().map(|i| i.representative_title.as_str()).collect();
        assert_eq!(
            titles,
            [
                "rapid-b headline 0",
                "rapid-a headline 0",
                "stable headline 0",
                "dormant headline 0"
            ]
        );
        assert_eq!(feed[0].emergence_level, EmergenceLevel::Rapid);
        assert_eq!(feed[0].growth_ratio, 1.0);
        assert_eq!(feed[2].growth_ratio, 0.33);
        assert_eq!(feed[3].emergence_level, EmergenceLevel::Dormant);
    }

    #[test]
    fn explanation_reflects_window() {
        let population = vec![cluster("c", &[1, 1, 90, 90])];
        let feed = build_emerging_feed(&population, 30, &EmergenceThresholds::default(), now());
        assert!(feed[0].explanation.starts_with("4 signals | 50% recent | 4 sources"));
    }

    #[test]
    fn long_titles_are_truncated_on_char_boundaries() {
        let text = "é".repeat(200);
        let signal = Signal::new("long", text, now(), "rss");
        let c = Cluster::promote(vec![(signal, vec![1.0])], now()).unwrap();
        let feed = build_emerging_feed(&[c], 30, &EmergenceThresholds::default(), now());
        assert_eq!(feed[0].representative_title.chars().count(), 120);
    }

    #[test]
    fn window_feed_describes_signals_inside_the_window() {
        let population = vec![
            cluster("old", &[40, 50]),
            cluster("mixed", &[2, 3, 20, 20]),
            cluster("fresh", &[1]),
        ];
        let feed = build_window_feed(&population, 7, &EmergenceThresholds::default(), now());

        let titles: Vec<&str> = feed.iter().map(|i| i.representative_title.as_str()).collect();
        assert_eq!(titles, ["fresh headline 0", "mixed headline 0"]);
        assert_eq!(feed[0].growth_ratio, 1.0);
        assert_eq!(feed[1].signal_count, 2);
        assert_eq!(feed[1].growth_ratio, 0.5);
        assert_eq!(feed[1].emergence_level, EmergenceLevel::Stable);
        assert!(feed[1].explanation.starts_with("2 signals | 50% recent | 2 sources"));
    }

    #[test]
    fn empty_cluster_has_placeholder_title() {
        let c = Cluster::from_parts(ClusterId::new(), Vec::new(), Vec::new(), None, now(), now())
            .unwrap();
        let feed = build_emerging_feed(&[c], 30, &EmergenceThresholds::default(), now());
        assert_eq!(feed[0].representative_title, "No signals");
        assert_eq!(feed[0].signal_count, 0);
    }
}
