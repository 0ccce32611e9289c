//! Mapping from string cluster ids to integer point keys
//!
//! Backends keyed by integers get a deterministic, non-negative i64 derived
//! from a UUIDv5 of the cluster id. Nothing outside `storage` sees these.

use crate::signal::ClusterId;
use uuid::Uuid;

const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x6c1b_83d2_4a5e_4f0b_9e3c_2d71_a8f4_5e90);

/// Integer point key for a cluster id
pub fn point_id(cluster_id: &ClusterId) -> i64 {
    let uuid = Uuid::new_v5(&POINT_NAMESPACE, cluster_id.as_str().as_bytes());
    let high = (uuid.as_u128() >> 64) as u64;
    (high & i64::MAX as u64) as i64
}
