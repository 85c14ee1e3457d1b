//! Liveness reporter
//!
//! On a fixed interval, open a fresh connection to the coordinator and
//! announce this node's externally reachable address. Fire-and-forget:
//! the reply is only logged, and every failure is retried next tick.

use crate::common::proto::{self, CoordinatorRequest, NodeAddress, StatusReply};
use crate::common::Result;
use std::time::Duration;
use tokio::net::TcpStream;

pub struct HeartbeatReporter {
    coordinator_addr: String,
    advertise: NodeAddress,
    interval: Duration,
}

impl HeartbeatReporter {
    pub fn new(coordinator_addr: String, advertise: NodeAddress, interval: Duration) -> Self {
        Self {
            coordinator_addr,
            advertise,
            interval,
        }
    }

    /// Report forever. Never returns and never fails the process.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.beat_once().await {
                tracing::warn!("Heartbeat to {} failed: {}", self.coordinator_addr, e);
            }
        }
    }

    /// One heartbeat over one fresh connection.
    pub async fn beat_once(&self) -> Result<()> {
        let mut stream = TcpStream::connect(&self.coordinator_addr).await?;
        proto::write_message(
            &mut stream,
            &CoordinatorRequest::Heartbeat {
                datanode_host: self.advertise.host.clone(),
                datanode_port: self.advertise.port,
            },
        )
        .await?;

        if let Some(payload) = proto::read_frame(&mut stream).await? {
            let reply: StatusReply = proto::decode(&payload)?;
            tracing::debug!("Heartbeat acknowledged: {}", reply.status);
        }
        Ok(())
    }
}
