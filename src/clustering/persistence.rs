//! Persistence gate: is a new signal part of a durable pattern or noise?

use crate::signal::{EmbeddedSignal, Signal, SignalId};
use crate::storage::{StorageResult, VectorIndex};
use crate::vector;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Default number of similar past signals needed to call a signal persistent
pub const DEFAULT_MIN_SIMILAR: usize = 2;

/// Default number of neighbours fetched per signal
pub const DEFAULT_TOP_K: usize = 10;

/// A past signal near the queried one
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub signal: Signal,
    pub similarity: f32,
}

/// A signal together with its neighbourhood in the signal history
#[derive(Debug, Clone)]
pub struct SignalContext {
    pub signal_id: SignalId,
    /// Nearest past signals, most similar first, never including the signal itself
    pub similar_signals: Vec<Neighbor>,
}

impl SignalContext {
    pub fn similar_count(&self) -> usize {
        self.similar_signals.len()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.similar_signals.iter().map(|n| n.signal.clone()).collect()
    }
}

/// Verdict of [`check_persistence`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceVerdict {
    pub is_persistent: bool,
    pub similar_count: usize,
    pub reason: String,
}

/// Query the history index for the `top_k` nearest neighbours of `item`.
///
/// The item itself is dropped from the results, so one extra neighbour is
/// requested. With `min_similarity`, weaker neighbours are dropped too.
pub fn contextualize_signal(
    item: &EmbeddedSignal,
    index: &dyn VectorIndex,
    top_k: usize,
    min_similarity: Option<f32>,
) -> StorageResult<SignalContext> {
    contextualize_in_batch(item, &[], index, top_k, min_similarity)
}

/// Like [`contextualize_signal`], but the other members of `batch` count as
/// neighbours too, as if the batch had already been indexed.
///
/// A batch member that is also in the index is counted once. Members whose
/// embeddings cannot be compared with `item` are skipped.
pub fn contextualize_in_batch(
    item: &EmbeddedSignal,
    batch: &[EmbeddedSignal],
    index: &dyn VectorIndex,
    top_k: usize,
    min_similarity: Option<f32>,
) -> StorageResult<SignalContext> {
    let mut candidates: Vec<Neighbor> = index
        .query_nearest(&item.embedding, top_k.saturating_add(1))?
        .into_iter()
        .filter(|hit| &hit.signal.signal_id != item.id())
        .map(|hit| Neighbor {
            signal: hit.signal,
            similarity: hit.similarity,
        })
        .collect();

    let indexed: HashSet<SignalId> = candidates
        .iter()
        .map(|n| n.signal.signal_id.clone())
        .collect();
    for peer in batch {
        if peer.id() == item.id() || indexed.contains(peer.id()) {
            continue;
        }
        if let Ok(similarity) = vector::cosine_similarity(&item.embedding, &peer.embedding) {
            candidates.push(Neighbor {
                signal: peer.signal.clone(),
                similarity,
            });
        }
    }
    candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    let similar_signals: Vec<Neighbor> = candidates
        .into_iter()
        .filter(|n| min_similarity.map_or(true, |min| n.similarity >= min))
        .take(top_k)
        .collect();

    debug!(signal_id = %item.id(), neighbors = similar_signals.len(), "contextualized signal");
    Ok(SignalContext {
        signal_id: item.id().clone(),
        similar_signals,
    })
}

/// Decide whether `signal` belongs to a persistent pattern.
///
/// Persistent when at least `min_similar` of the given neighbours are other
/// signals; an entry with the signal's own id is not counted.
pub fn check_persistence(
    signal: &Signal,
    similar_signals: &[Signal],
    min_similar: usize,
) -> PersistenceVerdict {
    let similar_count = similar_signals
        .iter()
        .filter(|s| s.signal_id != signal.signal_id)
        .count();
    let is_persistent = similar_count >= min_similar;

    let reason = if is_persistent {
        format!("Found {similar_count} semantically similar past signals.")
    } else {
        format!("Only {similar_count} similar signals found; treated as noise.")
    };

    PersistenceVerdict {
        is_persistent,
        similar_count,
        reason,
    }
}
