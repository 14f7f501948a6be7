//! Live connections grouped by participant.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use relay_core::{ConnectionId, ParticipantId};
use tracing::debug;

use super::connection::ClientConnection;

type ConnectionSet = HashMap<ConnectionId, Arc<ClientConnection>>;

/// Participant → live connections.
///
/// One lock guards the whole mapping. A participant has an entry iff it
/// has at least one live connection. The mapping itself is never handed
/// out; readers get snapshots.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ParticipantId, ConnectionSet>>,
    total: AtomicUsize,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under its participant.
    pub fn register(&self, connection: Arc<ClientConnection>) {
        let participant = connection.participant().clone();
        let conn_id = connection.id().clone();
        let inserted = self
            .connections
            .write()
            .entry(participant.clone())
            .or_default()
            .insert(conn_id.clone(), connection)
            .is_none();
        if inserted {
            let _ = self.total.fetch_add(1, Ordering::Relaxed);
        }
        debug!(%participant, %conn_id, "connection registered");
    }

    /// Remove a connection and close its outbound buffer.
    ///
    /// Idempotent. Returns `true` if this call removed it.
    pub fn unregister(&self, connection: &ClientConnection) -> bool {
        let removed = {
            let mut map = self.connections.write();
            let participant = connection.participant();
            let removed = match map.get_mut(participant.as_str()) {
                Some(set) => {
                    let removed = set.remove(connection.id()).is_some();
                    if set.is_empty() {
                        let _ = map.remove(participant.as_str());
                    }
                    removed
                }
                None => false,
            };
            if removed {
                let _ = self.total.fetch_sub(1, Ordering::Relaxed);
            }
            removed
        };
        let _ = connection.close();
        if removed {
            debug!(
                participant = %connection.participant(),
                conn_id = %connection.id(),
                "connection unregistered"
            );
        }
        removed
    }

    /// Snapshot of a participant's connections. Empty for unknown participants.
    pub fn connections_for(&self, participant: &str) -> Vec<Arc<ClientConnection>> {
        self.connections
            .read()
            .get(participant)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Live connection count for one participant.
    pub fn count_for(&self, participant: &str) -> usize {
        self.connections.read().get(participant).map_or(0, HashMap::len)
    }

    /// Live connection counts for several participants (zero when absent).
    pub fn counts_for(&self, participants: &[ParticipantId]) -> HashMap<ParticipantId, usize> {
        let map = self.connections.read();
        participants
            .iter()
            .map(|p| (p.clone(), map.get(p.as_str()).map_or(0, HashMap::len)))
            .collect()
    }

    /// Total live connections.
    pub fn connection_count(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Participants with at least one live connection.
    pub fn participant_count(&self) -> usize {
        self.connections.read().len()
    }
}
