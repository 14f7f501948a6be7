//! # relay-store
//!
//! Message persistence for the relay service.
//!
//! - [`MessageStore`]: async trait with `save` and `query_by_identity`
//! - [`MemoryStore`]: in-process store with failure injection for tests
//! - [`SqliteStore`]: `r2d2`-pooled `SQLite` with embedded migrations
//!
//! Conversations are matched on the canonical participant set, so
//! `[bob, alice]` and `[alice, bob]` read the same history.

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::MessageStore;
