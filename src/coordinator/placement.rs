//! Placement strategy for chunk allocation
//!
//! Replicas for chunk `i` are taken from the candidate pool starting at
//! offset `i % pool_len`, wrapping. Deterministic, spreads consecutive
//! chunks across nodes, and degenerates to "the first N nodes" when the
//! pool is exactly as large as the replication factor.

use crate::common::proto::NodeAddress;
use crate::common::{Error, Result};

/// Selects the node set for each chunk of an upload.
#[derive(Debug, Clone, Copy)]
pub struct PlacementManager {
    replication_factor: usize,
}

impl PlacementManager {
    pub fn new(replication_factor: usize) -> Self {
        Self { replication_factor }
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Select `replication_factor` nodes for chunk `chunk_index` out of
    /// `candidates` (the live pool, in first-heard order).
    pub fn allocate(&self, chunk_index: u32, candidates: &[NodeAddress]) -> Result<Vec<NodeAddress>> {
        if candidates.len() < self.replication_factor {
            return Err(Error::InsufficientReplicas {
                needed: self.replication_factor,
                available: candidates.len(),
            });
        }

        let start = chunk_index as usize % candidates.len();
        Ok((0..self.replication_factor)
            .map(|i| candidates[(start + i) % candidates.len()].clone())
            .collect())
    }
}
