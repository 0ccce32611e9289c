//! Core records: signals, clusters, and derived scores

mod cluster;
mod scores;
#[allow(clippy::module_inception)]
mod signal;
pub mod timestamp;


pub use cluster::{BatchCluster, Cluster, ClusterAlias, ClusterId, ValidationError};
pub use scores::{EmergenceLevel, ScoreAttachment};
pub use signal::{EmbeddedSignal, Signal, SignalId};
