//! The store abstraction consumed by the persistence workers and the
//! history endpoint.

use async_trait::async_trait;
use relay_core::{ConversationIdentity, Message, MessageId};

use crate::errors::Result;

/// Durable message storage.
///
/// Implementations may fail transiently; callers own the retry policy.
/// `save` is not required to be idempotent, so a retried save after an
/// ambiguous failure can store the message twice.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Store one message and return its assigned ID.
    async fn save(&self, message: &Message) -> Result<MessageId>;

    /// Messages whose participant set equals `identity`, newest first.
    ///
    /// Returns the window `[page * page_size, (page + 1) * page_size)`.
    /// Past the end the result is empty.
    async fn query_by_identity(
        &self,
        identity: &ConversationIdentity,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Message>>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}
