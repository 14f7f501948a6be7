//! In-process message store.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use relay_core::{ConversationIdentity, Message, MessageId};
use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::store::MessageStore;

/// Messages held in a `Vec` behind a lock.
///
/// Used when no database path is configured, and by tests. [`fail_next`]
/// makes the following saves fail so retry paths can be driven without a
/// real backend.
///
/// [`fail_next`]: MemoryStore::fail_next
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<Message>>,
    pending_failures: AtomicU32,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `save` fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Snapshot of every stored message in insertion order.
    pub fn all(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    fn take_injected_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save(&self, message: &Message) -> Result<MessageId> {
        if self.take_injected_failure() {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        let id = message.id.clone().unwrap_or_default();
        let stored = message.clone().with_id(id.clone());
        self.messages.write().push(stored);
        debug!(message_id = %id, "message stored in memory");
        Ok(id)
    }

    async fn query_by_identity(
        &self,
        identity: &ConversationIdentity,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Message>> {
        // Reverse first so equal timestamps come back latest-inserted first.
        let mut matching: Vec<Message> = self
            .messages
            .read()
            .iter()
            .rev()
            .filter(|m| m.participants == *identity)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .collect())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
