//! Storage-node liveness tracking
//!
//! One record per distinct `host:port` ever heard from, in first-heard
//! order. Records are never removed; staleness only excludes a node from
//! the allocation candidate pool.

use crate::common::proto::NodeAddress;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct LivenessRecord {
    pub addr: NodeAddress,
    pub last_heartbeat: Instant,
}

/// The coordinator's view of which storage nodes exist and when each was
/// last heard from.
pub struct LivenessRegistry {
    nodes: Vec<LivenessRecord>,
    stale_after: Duration,
}

impl LivenessRegistry {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            nodes: Vec::new(),
            stale_after,
        }
    }

    /// Record a heartbeat from `addr`, upserting keyed by `host:port`.
    pub fn record(&mut self, addr: NodeAddress) {
        let now = Instant::now();
        match self.nodes.iter_mut().find(|n| n.addr == addr) {
            Some(existing) => existing.last_heartbeat = now,
            None => {
                tracing::info!("New storage node registered: {}", addr);
                self.nodes.push(LivenessRecord {
                    addr,
                    last_heartbeat: now,
                });
            }
        }
    }

    /// Nodes eligible for allocation right now: every record whose last
    /// heartbeat is within the staleness window, in insertion order.
    pub fn candidates(&self) -> Vec<NodeAddress> {
        let now = Instant::now();
        self.nodes
            .iter()
            .filter(|n| now.duration_since(n.last_heartbeat) <= self.stale_after)
            .map(|n| n.addr.clone())
            .collect()
    }

    /// Every node ever heard from, stale or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
