//! Fan-out of one message to every other participant's live connections.

use std::sync::Arc;

use relay_core::Message;
use tracing::debug;

use super::connection::Payload;
use super::registry::ConnectionRegistry;
use crate::dispatch::{DeliveryJob, DispatchPool};
use crate::errors::Result;

/// What one [`BroadcastCoordinator::deliver`] call queued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Participants other than the sender.
    pub recipients: usize,
    /// Delivery jobs placed on the dispatch queue.
    pub jobs_enqueued: usize,
}

/// Turns a message into delivery jobs.
pub struct BroadcastCoordinator {
    registry: Arc<ConnectionRegistry>,
    dispatch: Arc<DispatchPool>,
}

impl BroadcastCoordinator {
    /// Coordinator over a registry and the pool that drains its jobs.
    pub fn new(registry: Arc<ConnectionRegistry>, dispatch: Arc<DispatchPool>) -> Self {
        Self { registry, dispatch }
    }

    /// Queue one delivery job per live connection of every participant
    /// except the sender.
    ///
    /// `message.participants` is canonical by construction. The payload is
    /// serialized once and shared. Participants without connections are
    /// skipped. Waits only when the dispatch queue is full.
    pub async fn deliver(&self, message: &Message) -> Result<DeliveryReport> {
        let payload: Payload = Arc::from(message.to_payload()?);
        let mut report = DeliveryReport::default();

        for participant in &message.participants {
            if *participant == message.sender {
                continue;
            }
            report.recipients += 1;
            for connection in self.registry.connections_for(participant) {
                self.dispatch
                    .enqueue(DeliveryJob {
                        connection,
                        payload: Arc::clone(&payload),
                    })
                    .await?;
                report.jobs_enqueued += 1;
            }
        }

        debug!(
            sender = %message.sender,
            conversation = %message.participants,
            recipients = report.recipients,
            jobs = report.jobs_enqueued,
            "message fanned out"
        );
        Ok(report)
    }
}
