//! In-memory vector index
//!
//! Thread-safe via RwLock. Used by tests and by ephemeral runs that do not
//! need the signal history to outlive the process.

use super::traits::{ScoredSignal, ScrollPage, StorageError, StorageResult, VectorIndex};
use crate::signal::{EmbeddedSignal, Signal, SignalId};
use crate::vector;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct IndexState {
    /// Points in first-insertion order; scroll offsets index into this
    points: Vec<EmbeddedSignal>,
    positions: HashMap<SignalId, usize>,
}

/// In-memory [`VectorIndex`] with brute-force cosine search
#[derive(Default)]
pub struct InMemoryVectorIndex {
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.points.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorIndex for InMemoryVectorIndex {
    fn upsert(&self, id: &SignalId, vector: &[f32], payload: &Signal) -> StorageResult<()> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        let point = EmbeddedSignal::new(payload.clone(), vector.to_vec());
        match state.positions.get(id).copied() {
            Some(pos) => state.points[pos] = point,
            None => {
                let pos = state.points.len();
                state.points.push(point);
                state.positions.insert(id.clone(), pos);
            }
        }
        Ok(())
    }

    fn query_nearest(&self, query: &[f32], top_k: usize) -> StorageResult<Vec<ScoredSignal>> {
        if vector::is_degenerate(query) {
            return Err(vector::VectorError::DegenerateVector.into());
        }
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut results: Vec<ScoredSignal> = state
            .points
            .iter()
            .filter_map(|p| {
                vector::cosine_similarity(query, &p.embedding)
                    .ok()
                    .map(|similarity| ScoredSignal {
                        signal: p.signal.clone(),
                        similarity,
                    })
            })
            .collect();
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(top_k);
        Ok(results)
    }

    fn scroll(&self, offset: Option<u64>, limit: usize) -> StorageResult<ScrollPage> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        let start = offset.unwrap_or(0) as usize;
        let end = start.saturating_add(limit).min(state.points.len());
        let points = state.points.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_offset = (end < state.points.len()).then_some(end as u64);
        Ok(ScrollPage {
            points,
            next_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn point(id: &str, v: Vec<f32>) -> EmbeddedSignal {
        EmbeddedSignal::new(Signal::new(id, id, Utc::now(), "test"), v)
    }

    fn index_with(points: &[EmbeddedSignal]) -> InMemoryVectorIndex {
        let index = InMemoryVectorIndex::new();
        index.upsert_batch(points).unwrap();
        index
    }

    #[test]
    fn nearest_are_ordered_by_similarity() {
        let index = index_with(&[
            point("travel", vec![0.9, 0.3, 0.1]),
            point("democracy", vec![0.1, 0.2, 0.95]),
            point("journey", vec![0.85, 0.35, 0.15]),
        ]);
        let hits = index.query_nearest(&[0.88, 0.32, 0.12], 2).unwrap();
        assert_eq!(hits.len(), 2);
        let ids: Vec<&str> = hits.iter().map(|h| h.signal.signal_id.as_str()).collect();
        assert!(ids.contains(&"travel") && ids.contains(&"journey"));
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[test]
    fn upsert_replaces_existing_point() {
        let index = index_with(&[point("a", vec![1.0, 0.0])]);
        index.upsert_batch(&[point("a", vec![0.0, 1.0])]).unwrap();
        assert_eq!(index.len(), 1);
        let hits = index.query_nearest(&[0.0, 1.0], 1).unwrap();
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn scroll_pages_through_everything() {
        let points: Vec<_> = (0..5).map(|i| point(&format!("s{i}"), vec![1.0, i as f32])).collect();
        let index = index_with(&points);

        let first = index.scroll(None, 2).unwrap();
        assert_eq!(first.points.len(), 2);
        assert_eq!(first.next_offset, Some(2));

        let all = index.scroll_all(2).unwrap();
        assert_eq!(all, points);
    }

    #[test]
    fn degenerate_query_is_rejected() {
        let index = index_with(&[point("a", vec![1.0, 0.0])]);
        assert!(matches!(
            index.query_nearest(&[0.0, 0.0], 3),
            Err(StorageError::Vector(_))
        ));
    }
}
