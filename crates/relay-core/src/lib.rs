//! # relay-core
//!
//! Foundation types, errors, and utilities shared by every relay crate.
//!
//! - **Branded IDs**: `ParticipantId`, `MessageId`, `ConnectionId` as newtypes for type safety
//! - **Conversation identity**: order-independent canonical key for a participant set
//! - **Messages**: the immutable `Message` record fanned out and persisted
//! - **Errors**: `RelayError` via `thiserror`
//! - **Retry**: linear backoff math for the persistence pipeline
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod identity;
pub mod ids;
pub mod logging;
pub mod message;
pub mod retry;

pub use errors::{RelayError, Result};
pub use identity::{ConversationIdentity, canonicalize};
pub use ids::{ConnectionId, MessageId, ParticipantId};
pub use message::Message;
