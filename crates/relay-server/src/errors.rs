//! Error types for the service boundary.

use relay_core::{ParticipantId, RelayError};
use relay_store::StoreError;
use thiserror::Error;

/// A worker pool no longer accepts jobs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{0} pool is closed")]
pub struct PoolClosed(pub &'static str);

/// Errors surfaced by [`ChatService`](crate::service::ChatService) operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request named no participants.
    #[error("participants must not be empty")]
    EmptyParticipants,

    /// The caller is not a member of the conversation.
    #[error("{0} is not a participant of this conversation")]
    NotParticipant(ParticipantId),

    /// No caller identity was supplied.
    #[error("missing participant identity")]
    MissingIdentity,

    /// The request body or query could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The pools are shut down.
    #[error("service unavailable: {0}")]
    Unavailable(#[from] PoolClosed),

    /// The message could not be serialized for delivery.
    #[error("payload error: {0}")]
    Payload(#[from] RelayError),

    /// The store failed a history read.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
