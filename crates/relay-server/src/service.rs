//! Boundary operations over the registry, both pools, and the store.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use relay_core::{ConversationIdentity, Message, ParticipantId, canonicalize};
use relay_settings::{HistorySettings, RelaySettings};
use relay_store::MessageStore;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::dispatch::DispatchPool;
use crate::errors::{Result, ServiceError};
use crate::metrics::MESSAGES_SUBMITTED_TOTAL;
use crate::persistence::PersistencePool;
use crate::websocket::broadcast::{BroadcastCoordinator, DeliveryReport};
use crate::websocket::connection::{ClientConnection, Payload};
use crate::websocket::registry::ConnectionRegistry;

/// Acknowledgement for an accepted message.
#[derive(Clone, Debug)]
pub struct Receipt {
    /// Canonical conversation the message was posted to.
    pub conversation: ConversationIdentity,
    /// Live fan-out queued for it.
    pub delivery: DeliveryReport,
}

/// The message relay: live fan-out plus asynchronous persistence.
pub struct ChatService {
    registry: Arc<ConnectionRegistry>,
    dispatch: Arc<DispatchPool>,
    coordinator: BroadcastCoordinator,
    persistence: PersistencePool,
    store: Arc<dyn MessageStore>,
    connection_buffer: usize,
    history: HistorySettings,
}

impl ChatService {
    /// Start both worker pools over `store`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(settings: &RelaySettings, store: Arc<dyn MessageStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatch = Arc::new(DispatchPool::start(&settings.dispatch, Arc::clone(&registry)));
        let coordinator = BroadcastCoordinator::new(Arc::clone(&registry), Arc::clone(&dispatch));
        let persistence = PersistencePool::start(&settings.persistence, Arc::clone(&store));

        Self {
            registry,
            dispatch,
            coordinator,
            persistence,
            store,
            connection_buffer: settings.server.connection_buffer,
            history: settings.history.clone(),
        }
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Name of the backing store.
    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Open and register a connection for `participant`.
    ///
    /// The receiver is the connection's outbound buffer; it yields `None`
    /// once the connection is unregistered.
    pub fn register_connection(
        &self,
        participant: ParticipantId,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Payload>) {
        let (connection, rx) = ClientConnection::open(participant, self.connection_buffer);
        self.registry.register(Arc::clone(&connection));
        (connection, rx)
    }

    /// Unregister a connection. Idempotent.
    pub fn unregister_connection(&self, connection: &ClientConnection) -> bool {
        self.registry.unregister(connection)
    }

    /// Accept a message: fan it out to live connections, then queue it
    /// for persistence.
    ///
    /// Rejects an empty participant list and a sender outside it.
    #[instrument(skip_all, fields(sender = %sender))]
    pub async fn submit_message(
        &self,
        sender: ParticipantId,
        participants: &[ParticipantId],
        content: String,
    ) -> Result<Receipt> {
        let conversation = canonicalize(participants);
        if conversation.is_empty() {
            return Err(ServiceError::EmptyParticipants);
        }
        if !conversation.contains(&sender) {
            return Err(ServiceError::NotParticipant(sender));
        }

        let message = Message::new(sender, conversation.participants(), content);
        // Fan-out can fail partway through once dispatch is closed, after some
        // recipients already have the message; it is still queued for saving.
        let delivery = self.coordinator.deliver(&message).await;
        let queued = self.persistence.enqueue(message).await;
        let delivery = delivery?;
        queued?;

        counter!(MESSAGES_SUBMITTED_TOTAL).increment(1);
        debug!(
            %conversation,
            jobs = delivery.jobs_enqueued,
            "message accepted"
        );
        Ok(Receipt {
            conversation,
            delivery,
        })
    }

    /// Live connection count per participant.
    pub fn presence_counts(&self, participants: &[ParticipantId]) -> HashMap<ParticipantId, usize> {
        self.registry.counts_for(participants)
    }

    /// One page of a conversation's history, newest first.
    ///
    /// `requester` must be a participant. `page` defaults to 0; `page_size`
    /// defaults to the configured size when absent or zero and is capped at
    /// the configured maximum.
    pub async fn history(
        &self,
        requester: &ParticipantId,
        participants: &[ParticipantId],
        page: Option<usize>,
        page_size: Option<usize>,
    ) -> Result<Vec<Message>> {
        let conversation = canonicalize(participants);
        if conversation.is_empty() {
            return Err(ServiceError::EmptyParticipants);
        }
        if !conversation.contains(requester) {
            return Err(ServiceError::NotParticipant(requester.clone()));
        }

        let page = page.unwrap_or(0);
        let page_size = self.effective_page_size(page_size);
        Ok(self
            .store
            .query_by_identity(&conversation, page, page_size)
            .await?)
    }

    fn effective_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|n| *n > 0)
            .unwrap_or(self.history.default_page_size)
            .min(self.history.max_page_size)
    }

    /// Stop delivery, then drain persistence. Returns once every worker
    /// has exited.
    pub async fn shutdown(&self) {
        info!("stopping worker pools");
        self.dispatch.shutdown().await;
        let _ = self.persistence.stop().await;
    }
}
