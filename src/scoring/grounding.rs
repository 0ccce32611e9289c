//! Grounding: the evidence summary behind a surfaced cluster

use super::emergence::round_to;
use crate::signal::Cluster;
use crate::vector;
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Evidence for why a cluster is meaningful
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grounding {
    pub signal_count: usize,
    /// Share of recent signals as a percentage, one decimal
    pub recency_pct: f64,
    /// Number of distinct sources
    pub source_diversity: usize,
    /// Mean member-to-centroid similarity in [0,1], two decimals
    pub coherence: f64,
    /// One-line human-readable summary
    pub explanation: String,
}

/// Summarize the evidence for a cluster.
///
/// Recency comes from the growth ratio already attached to the cluster by
/// emergence scoring (0 when nothing is attached) so the two scorers never
/// disagree. A cluster whose store dropped the centroid has it recomputed
/// from the embeddings.
pub fn compute_cluster_grounding(cluster: &Cluster) -> Grounding {
    let growth_ratio = cluster.scores().map_or(0.0, |s| s.growth_ratio);
    grounding_with_growth(cluster, growth_ratio)
}

pub(crate) fn grounding_with_growth(cluster: &Cluster, growth_ratio: f64) -> Grounding {
    let signal_count = cluster.signal_count();
    let recency_pct = round_to(growth_ratio * 100.0, 1);
    let source_diversity = cluster
        .signals()
        .iter()
        .map(|s| s.source.as_str())
        .collect::<HashSet<_>>()
        .len();
    let coherence = coherence(cluster);

    let explanation = format!(
        "{signal_count} signals | {recency_pct:.0}% recent | {source_diversity} sources | coherence {coherence:.2}"
    );

    Grounding {
        signal_count,
        recency_pct,
        source_diversity,
        coherence,
        explanation,
    }
}

/// Mean cosine similarity of unit-normalized members to the unit-normalized
/// centroid, clamped to [0,1]. Degenerate members are skipped.
fn coherence(cluster: &Cluster) -> f64 {
    if cluster.embeddings().is_empty() {
        return 0.0;
    }
    if cluster.centroid().is_none() {
        warn!(cluster_id = %cluster.id(), "centroid missing, recomputing for coherence");
    }
    let Some(centroid) = cluster.resolved_centroid() else {
        return 0.0;
    };
    let Ok(centroid) = vector::normalize(&centroid) else {
        return 0.0;
    };

    let similarities: Vec<f64> = cluster
        .embeddings()
        .iter()
        .filter_map(|e| vector::normalize(e).ok())
        .filter_map(|e| vector::cosine_similarity(&e, &centroid).ok())
        .map(f64::from)
        .collect();
    if similarities.is_empty() {
        return 0.0;
    }

    let mean = similarities.iter().sum::<f64>() / similarities.len() as f64;
    round_to(mean.clamp(0.0, 1.0), 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{ClusterId, EmergenceLevel, ScoreAttachment, Signal};
    use chrono::Utc;

    fn sig(id: &str, source: &str) -> Signal {
        Signal::new(id, format!("text {id}"), Utc::now(), source)
    }

    fn cluster(members: Vec<(Signal, Vec<f32>)>, centroid: Option<Vec<f32>>) -> Cluster {
        let (signals, embeddings) = members.into_iter().unzip();
        Cluster::from_parts(ClusterId::new(), signals, embeddings, centroid, Utc::now(), Utc::now())
            .unwrap()
    }

    #[test]
    fn grounding_summarizes_evidence() {
        let mut c = cluster(
            vec![
                (sig("a", "arxiv"), vec![1.0, 0.0]),
                (sig("b", "hn"), vec![1.0, 0.0]),
                (sig("c", "arxiv"), vec![1.0, 0.0]),
            ],
            Some(vec![1.0, 0.0]),
        );
        c.set_scores(ScoreAttachment::from_growth(EmergenceLevel::Rapid, 0.67));

        let g = compute_cluster_grounding(&c);
        assert_eq!(g.signal_count, 3);
        assert_eq!(g.recency_pct, 67.0);
        assert_eq!(g.source_diversity, 2);
        assert_eq!(g.coherence, 1.0);
        assert_eq!(g.explanation, "3 signals | 67% recent | 2 sources | coherence 1.00");
    }

    #[test]
    fn missing_centroid_is_recomputed() {
        let c = cluster(
            vec![
                (sig("a", "rss"), vec![0.9, 0.3, 0.1]),
                (sig("b", "rss"), vec![0.88, 0.32, 0.12]),
                (sig("c", "rss"), vec![0.85, 0.35, 0.15]),
            ],
            None,
        );
        let g = compute_cluster_grounding(&c);
        assert!(g.coherence > 0.9, "near-duplicates are coherent, got {}", g.coherence);
    }

    #[test]
    fn no_attached_scores_means_zero_recency() {
        let c = cluster(vec![(sig("a", "rss"), vec![1.0, 0.0])], Some(vec![1.0, 0.0]));
        let g = compute_cluster_grounding(&c);
        assert_eq!(g.recency_pct, 0.0);
        assert!(g.explanation.contains("0% recent"));
    }

    #[test]
    fn coherence_is_clamped_to_unit_interval() {
        // Opposing members give a zero centroid; coherence falls back to 0.
        let c = cluster(
            vec![(sig("p", "rss"), vec![1.0, 0.0]), (sig("n", "rss"), vec![-1.0, 0.0])],
            None,
        );
        assert_eq!(compute_cluster_grounding(&c).coherence, 0.0);
    }

    #[test]
    fn coherence_ignores_vector_scale() {
        let c = cluster(
            vec![(sig("a", "rss"), vec![10.0, 0.0]), (sig("b", "rss"), vec![0.1, 0.0])],
            None,
        );
        assert_eq!(compute_cluster_grounding(&c).coherence, 1.0);
    }

    #[test]
    fn empty_cluster_grounds_to_zero() {
        let c = cluster(Vec::new(), None);
        let g = compute_cluster_grounding(&c);
        assert_eq!(g.signal_count, 0);
        assert_eq!(g.coherence, 0.0);
        assert_eq!(g.source_diversity, 0);
    }
}
