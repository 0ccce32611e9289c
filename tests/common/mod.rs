//! Common test utilities for trendline integration tests
//!
//! Synthetic topic streams for property-style population tests and a
//! deterministic keyword embedder for pipeline tests.

#![allow(dead_code)]

pub mod corpus;
pub mod mock_embedder;

pub use corpus::{fixed_now, signal_at, TopicStream};
pub use mock_embedder::KeywordEmbedder;

use std::collections::HashSet;
use trendline::{vector, Cluster, SignalId};

/// Every signal id owned by the population, asserting none appears twice.
pub fn owned_ids(clusters: &[Cluster]) -> HashSet<SignalId> {
    let mut ids = HashSet::new();
    for cluster in clusters {
        for id in cluster.signal_ids() {
            assert!(ids.insert(id.clone()), "signal {id} owned twice");
        }
    }
    ids
}

/// Assert each cluster's centroid is the mean of its embeddings.
pub fn assert_centroids_are_means(clusters: &[Cluster]) {
    for cluster in clusters {
        let stored = cluster.centroid().expect("evolved clusters carry a centroid");
        let expected = vector::centroid(cluster.embeddings()).unwrap();
        assert_eq!(stored.len(), expected.len());
        for (a, b) in stored.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5, "cluster {} centroid drifted: {a} vs {b}", cluster.id());
        }
    }
}
