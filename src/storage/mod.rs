//! Storage backends
//!
//! The engine talks to two collaborators through traits: a
//! `ClusterRepository` for the persistent population and a `VectorIndex`
//! over the signal history. `SqliteStore` implements both; `JsonFileStore`
//! and `InMemoryVectorIndex` cover lighter deployments and tests.

mod json;
mod memory;
mod point_id;
mod sqlite;
mod traits;

pub use json::JsonFileStore;
pub use memory::InMemoryVectorIndex;
pub use point_id::point_id;
pub use sqlite::SqliteStore;
pub use traits::{
    ClusterRepository, OpenStore, ScoredSignal, ScrollPage, StorageError, StorageResult,
    VectorIndex,
};
