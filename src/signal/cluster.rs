//! Clusters: ephemeral batch groupings and the persistent topic population

use super::scores::ScoreAttachment;
use super::signal::{EmbeddedSignal, Signal, SignalId};
use super::timestamp;
use crate::vector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Per-component tolerance, relative to the component's magnitude, when a
/// stored centroid is checked against the mean of its embeddings
const CENTROID_TOLERANCE: f32 = 1e-4;

/// Errors raised when a cluster record violates its structural invariants
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{signals} signals but {embeddings} embeddings")]
    LengthMismatch { signals: usize, embeddings: usize },

    #[error("stored signal_count {stored} does not match {actual} signals")]
    CountMismatch { stored: usize, actual: usize },

    #[error("duplicate signal_id within cluster: {0}")]
    DuplicateSignal(SignalId),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot promote an empty member set into a cluster")]
    Empty,
}

/// Stable identifier for a persistent cluster
///
/// Assigned once when the cluster is promoted and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    /// Create a new random ClusterId (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a ClusterId from an existing string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClusterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClusterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClusterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Record that a merged-away cluster now lives on inside `survivor`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAlias {
    pub alias: ClusterId,
    pub survivor: ClusterId,
    #[serde(with = "timestamp")]
    pub recorded_at: DateTime<Utc>,
}

/// Check the parallel-array invariants shared by batch and persistent
/// clusters. Returns the embedding dimension when there is at least one member.
fn validate_members(
    signals: &[Signal],
    embeddings: &[Vec<f32>],
) -> Result<Option<usize>, ValidationError> {
    if signals.len() != embeddings.len() {
        return Err(ValidationError::LengthMismatch {
            signals: signals.len(),
            embeddings: embeddings.len(),
        });
    }

    let mut seen = HashSet::with_capacity(signals.len());
    for signal in signals {
        if !seen.insert(&signal.signal_id) {
            return Err(ValidationError::DuplicateSignal(signal.signal_id.clone()));
        }
    }

    let dim = embeddings.first().map(Vec::len);
    if let Some(expected) = dim {
        if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
            return Err(ValidationError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
    }
    Ok(dim)
}

/// Whether `stored` matches the mean of `embeddings`. With no embeddings
/// there is nothing to compare against.
fn centroid_is_mean(stored: &[f32], embeddings: &[Vec<f32>]) -> bool {
    match vector::centroid(embeddings) {
        Ok(mean) => stored
            .iter()
            .zip(&mean)
            .all(|(s, m)| (s - m).abs() <= CENTROID_TOLERANCE * m.abs().max(1.0)),
        Err(_) => true,
    }
}

/// Ephemeral grouping produced by one intra-batch clustering pass
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCluster {
    signals: Vec<Signal>,
    embeddings: Vec<Vec<f32>>,
    centroid: Vec<f32>,
}

impl BatchCluster {
    /// Open a new batch cluster holding a single item
    pub fn seed(item: EmbeddedSignal) -> Self {
        Self {
            centroid: item.embedding.clone(),
            signals: vec![item.signal],
            embeddings: vec![item.embedding],
        }
    }

    /// Build a batch cluster from parallel arrays, computing the centroid.
    ///
    /// An empty member set is representable so that the evolver can reject
    /// it as a contract violation.
    pub fn from_parts(
        signals: Vec<Signal>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, ValidationError> {
        validate_members(&signals, &embeddings)?;
        let centroid = vector::centroid(&embeddings).unwrap_or_default();
        Ok(Self {
            signals,
            embeddings,
            centroid,
        })
    }

    /// Append an item and recompute the centroid as the mean of all members.
    pub(crate) fn push(&mut self, item: EmbeddedSignal) -> Result<(), ValidationError> {
        let expected = self.centroid.len();
        if item.embedding.len() != expected {
            return Err(ValidationError::DimensionMismatch {
                expected,
                actual: item.embedding.len(),
            });
        }
        self.signals.push(item.signal);
        self.embeddings.push(item.embedding);
        self.centroid = vector::centroid(&self.embeddings).unwrap_or_default();
        Ok(())
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn centroid(&self) -> &[f32] {
        &self.centroid
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Consume the batch cluster, yielding `(signal, embedding)` pairs
    pub fn into_members(self) -> impl Iterator<Item = (Signal, Vec<f32>)> {
        self.signals.into_iter().zip(self.embeddings)
    }
}

/// Persistent topic cluster
///
/// Invariants, enforced at construction and on every mutation:
/// - `signals` and `embeddings` are parallel arrays of equal length
/// - no `signal_id` appears twice
/// - all embeddings share one dimension
/// - when present, the centroid is the mean of `embeddings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClusterRecord", into = "ClusterRecord")]
pub struct Cluster {
    id: ClusterId,
    signals: Vec<Signal>,
    embeddings: Vec<Vec<f32>>,
    centroid: Option<Vec<f32>>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    scores: Option<ScoreAttachment>,
}

impl Cluster {
    /// Reassemble a cluster from stored parts, validating every invariant.
    ///
    /// An absent centroid is accepted; it is recomputed on demand. A stored
    /// centroid that no longer matches the mean of the embeddings is stale
    /// and is dropped the same way.
    pub fn from_parts(
        id: ClusterId,
        signals: Vec<Signal>,
        embeddings: Vec<Vec<f32>>,
        centroid: Option<Vec<f32>>,
        created_at: DateTime<Utc>,
        last_updated: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let dim = validate_members(&signals, &embeddings)?;
        let centroid = centroid.filter(|c| !c.is_empty());
        if let (Some(expected), Some(c)) = (dim, centroid.as_ref()) {
            if c.len() != expected {
                return Err(ValidationError::DimensionMismatch {
                    expected,
                    actual: c.len(),
                });
            }
        }
        let centroid = centroid.filter(|c| {
            let fresh = centroid_is_mean(c, &embeddings);
            if !fresh {
                warn!(cluster_id = %id, "dropping stale stored centroid");
            }
            fresh
        });
        Ok(Self {
            id,
            signals,
            embeddings,
            centroid,
            created_at,
            last_updated,
            scores: None,
        })
    }

    /// Promote a member set into a brand-new cluster with a fresh id.
    pub fn promote(
        members: Vec<(Signal, Vec<f32>)>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if members.is_empty() {
            return Err(ValidationError::Empty);
        }
        let (signals, embeddings): (Vec<_>, Vec<_>) = members.into_iter().unzip();
        validate_members(&signals, &embeddings)?;
        let centroid = vector::centroid(&embeddings).ok();
        Ok(Self {
            id: ClusterId::new(),
            signals,
            embeddings,
            centroid,
            created_at: now,
            last_updated: now,
            scores: None,
        })
    }

    pub fn id(&self) -> &ClusterId {
        &self.id
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    /// The stored centroid, if the cluster carries one
    pub fn centroid(&self) -> Option<&[f32]> {
        self.centroid.as_deref()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn scores(&self) -> Option<&ScoreAttachment> {
        self.scores.as_ref()
    }

    pub fn set_scores(&mut self, scores: ScoreAttachment) {
        self.scores = Some(scores);
    }

    /// Embedding dimension, from members or the stored centroid
    pub fn dimension(&self) -> Option<usize> {
        self.embeddings
            .first()
            .map(Vec::len)
            .or_else(|| self.centroid.as_ref().map(Vec::len))
    }

    pub fn signal_ids(&self) -> impl Iterator<Item = &SignalId> {
        self.signals.iter().map(|s| &s.signal_id)
    }

    /// The stored centroid, or one recomputed from the embeddings when the
    /// store dropped it. `None` only for a cluster with neither.
    pub fn resolved_centroid(&self) -> Option<Cow<'_, [f32]>> {
        match &self.centroid {
            Some(c) => Some(Cow::Borrowed(c.as_slice())),
            None => vector::centroid(&self.embeddings).ok().map(Cow::Owned),
        }
    }

    /// Append members, recompute the centroid, and bump `last_updated`.
    ///
    /// Fails without mutating if any member would break an invariant.
    /// Cached scores are dropped since they no longer describe the cluster.
    pub(crate) fn absorb(
        &mut self,
        members: Vec<(Signal, Vec<f32>)>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if members.is_empty() {
            return Ok(());
        }
        let expected = self.dimension().unwrap_or(members[0].1.len());
        let mut seen: HashSet<&SignalId> = self.signal_ids().collect();
        for (signal, embedding) in &members {
            if embedding.len() != expected {
                return Err(ValidationError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
            if !seen.insert(&signal.signal_id) {
                return Err(ValidationError::DuplicateSignal(signal.signal_id.clone()));
            }
        }

        for (signal, embedding) in members {
            self.signals.push(signal);
            self.embeddings.push(embedding);
        }
        self.centroid = vector::centroid(&self.embeddings).ok();
        self.last_updated = now;
        self.scores = None;
        Ok(())
    }

    /// Consume the cluster, yielding `(signal, embedding)` pairs
    pub fn into_members(self) -> Vec<(Signal, Vec<f32>)> {
        self.signals.into_iter().zip(self.embeddings).collect()
    }

    /// A view of this cluster restricted to the signals `keep` accepts.
    ///
    /// The view keeps the cluster id and timestamps, filters embeddings in
    /// parallel, and recomputes the centroid. Returns `None` when nothing
    /// is kept.
    pub fn filtered(&self, keep: impl Fn(&Signal) -> bool) -> Option<Cluster> {
        let (signals, embeddings): (Vec<_>, Vec<_>) = self
            .signals
            .iter()
            .zip(&self.embeddings)
            .filter(|(s, _)| keep(s))
            .map(|(s, e)| (s.clone(), e.clone()))
            .unzip();
        if signals.is_empty() {
            return None;
        }
        let centroid = vector::centroid(&embeddings).ok();
        Some(Cluster {
            id: self.id.clone(),
            signals,
            embeddings,
            centroid,
            created_at: self.created_at,
            last_updated: self.last_updated,
            scores: None,
        })
    }
}

/// Wire shape of a persisted cluster
#[derive(Serialize, Deserialize)]
struct ClusterRecord {
    cluster_id: ClusterId,
    signals: Vec<Signal>,
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    centroid: Option<Vec<f32>>,
    #[serde(default)]
    signal_count: Option<usize>,
    #[serde(with = "timestamp")]
    created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scores: Option<ScoreAttachment>,
}

impl TryFrom<ClusterRecord> for Cluster {
    type Error = ValidationError;

    fn try_from(record: ClusterRecord) -> Result<Self, Self::Error> {
        if let Some(stored) = record.signal_count {
            if stored != record.signals.len() {
                return Err(ValidationError::CountMismatch {
                    stored,
                    actual: record.signals.len(),
                });
            }
        }
        let mut cluster = Cluster::from_parts(
            record.cluster_id,
            record.signals,
            record.embeddings,
            record.centroid,
            record.created_at,
            record.last_updated.unwrap_or(record.created_at),
        )?;
        cluster.scores = record.scores;
        Ok(cluster)
    }
}

impl From<Cluster> for ClusterRecord {
    fn from(cluster: Cluster) -> Self {
        Self {
            signal_count: Some(cluster.signals.len()),
            cluster_id: cluster.id,
            signals: cluster.signals,
            embeddings: cluster.embeddings,
            centroid: cluster.centroid,
            created_at: cluster.created_at,
            last_updated: Some(cluster.last_updated),
            scores: cluster.scores,
        }
    }
}
