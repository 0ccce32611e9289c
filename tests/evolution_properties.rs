//! Population-level properties of the clustering passes
//!
//! Seeded random streams are pushed through many ingestion cycles and the
//! population is checked after every cycle: no signal is lost or owned
//! twice, and every centroid is the mean of its members.

mod common;

use common::{assert_centroids_are_means, fixed_now, owned_ids, signal_at, TopicStream};
use std::collections::HashSet;
use trendline::{
    cluster_batch, consolidate_clusters, validate_population, BatchCluster, Cluster,
    ClusterEvolver, EmbeddedSignal, SignalId,
};

fn run_cycle(population: Vec<Cluster>, items: Vec<EmbeddedSignal>, threshold: f32) -> trendline::Evolution {
    let batch = cluster_batch(items, threshold).unwrap();
    ClusterEvolver::new(threshold)
        .unwrap()
        .evolve(population, batch.clusters, fixed_now())
        .unwrap()
}

#[test]
fn signals_are_conserved_across_cycles() {
    let mut stream = TopicStream::new(7, 5, 12, 0.15);
    let mut population = Vec::new();
    let mut sent: Vec<EmbeddedSignal> = Vec::new();
    let mut expected: HashSet<SignalId> = HashSet::new();

    for cycle in 0..8 {
        let mut items = stream.batch(25);
        // Re-deliver a few earlier signals, as a feed poller would.
        let resent: Vec<EmbeddedSignal> = sent.iter().step_by(7).take(3).cloned().collect();
        let resent_count = resent.len();
        items.extend(resent);

        for item in &items {
            expected.insert(item.id().clone());
        }
        sent.extend(items.iter().cloned());

        let evolution = run_cycle(population, items, 0.5);
        assert_eq!(evolution.duplicates.len(), resent_count, "cycle {cycle}");
        population = evolution.clusters;

        validate_population(&population).unwrap();
        assert_eq!(owned_ids(&population), expected, "cycle {cycle}");
        assert_centroids_are_means(&population);
    }
}

#[test]
fn well_separated_topics_are_recovered() {
    let mut stream = TopicStream::new(11, 4, 8, 0.1);
    let mut population = Vec::new();
    for _ in 0..5 {
        population = run_cycle(population, stream.batch(20), 0.5).clusters;
    }

    assert_eq!(population.len(), 4);
    // Every cluster holds a single topic.
    for cluster in &population {
        let topics: HashSet<&str> = cluster
            .signals()
            .iter()
            .map(|s| s.text.split(" item ").next().unwrap())
            .collect();
        assert_eq!(topics.len(), 1, "cluster {} mixes topics {topics:?}", cluster.id());
    }
}

#[test]
fn random_thresholds_keep_invariants() {
    let mut stream = TopicStream::new(23, 6, 10, 0.4);
    for _ in 0..10 {
        let threshold = stream.draw(0.0, 0.9);
        let mut population = Vec::new();
        let mut total = 0;
        for _ in 0..4 {
            let mut items = stream.batch(15);
            items.extend(stream.unstructured(5));
            total += items.len();
            population = run_cycle(population, items, threshold).clusters;
        }
        validate_population(&population).unwrap();
        assert_eq!(owned_ids(&population).len(), total, "threshold {threshold}");
        assert_centroids_are_means(&population);
    }
}

#[test]
fn evolving_nothing_changes_nothing() {
    let mut stream = TopicStream::new(3, 3, 6, 0.2);
    let population = run_cycle(Vec::new(), stream.batch(30), 0.5).clusters;

    let evolution = ClusterEvolver::new(0.5)
        .unwrap()
        .evolve(population.clone(), Vec::new(), fixed_now())
        .unwrap();
    assert_eq!(evolution.clusters, population);
    assert!(evolution.outcomes.is_empty());
}

#[test]
fn lower_thresholds_never_produce_more_clusters() {
    // Unit vectors at fixed angles, one singleton batch cluster each.
    let angles = [0.0f32, 10.0, 60.0, 70.0, 150.0];
    let batches = || -> Vec<BatchCluster> {
        angles
            .iter()
            .enumerate()
            .map(|(i, deg)| {
                let rad = deg.to_radians();
                let signal = signal_at(&format!("a{i}"), "angle", 1, "test");
                BatchCluster::seed(EmbeddedSignal::new(signal, vec![rad.cos(), rad.sin()]))
            })
            .collect()
    };

    let counts: Vec<usize> = [0.99f32, 0.9, 0.5, 0.0, -1.0]
        .iter()
        .map(|&t| {
            ClusterEvolver::new(t)
                .unwrap()
                .evolve(Vec::new(), batches(), fixed_now())
                .unwrap()
                .clusters
                .len()
        })
        .collect();

    assert_eq!(counts, vec![5, 3, 2, 2, 1]);
    assert!(counts.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn consolidation_conserves_signals_and_reports_every_alias() {
    let mut stream = TopicStream::new(5, 3, 6, 0.1);
    // A strict evolution threshold fragments each topic into many clusters.
    let mut population = Vec::new();
    for _ in 0..4 {
        population = run_cycle(population, stream.batch(12), 0.999).clusters;
    }
    let before_ids: HashSet<_> = population.iter().map(|c| c.id().clone()).collect();
    let signals_before = owned_ids(&population);
    assert!(population.len() > 3);

    let consolidation = consolidate_clusters(population, 0.5).unwrap();
    let after = &consolidation.clusters;

    assert_eq!(after.len(), 3);
    assert_eq!(owned_ids(after), signals_before);
    assert_centroids_are_means(after);
    assert_eq!(consolidation.aliases.len(), before_ids.len() - after.len());

    let survivors: HashSet<_> = after.iter().map(|c| c.id().clone()).collect();
    for alias in &consolidation.aliases {
        assert!(before_ids.contains(&alias.alias));
        assert!(!survivors.contains(&alias.alias));
        assert!(survivors.contains(&alias.survivor));
    }
}
