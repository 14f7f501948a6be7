//! # relay-server
//!
//! The relay's runtime: live connections, delivery and persistence worker
//! pools, and the axum HTTP + WebSocket surface.
//!
//! - [`ChatService`]: submit, history, and presence over the pools
//! - [`DispatchPool`]: bounded fan-out queue drained by N workers
//! - [`PersistencePool`]: bounded save queue with linear-backoff retry
//! - [`RelayServer`]: router, listener, and graceful shutdown

#![deny(unsafe_code)]

pub mod dispatch;
pub mod errors;
pub mod health;
pub mod http;
pub mod metrics;
pub mod persistence;
pub mod server;
pub mod service;
pub mod shutdown;
pub mod websocket;

pub use dispatch::{DeliveryJob, DispatchPool};
pub use errors::{PoolClosed, Result, ServiceError};
pub use persistence::{PersistOutcome, PersistencePool, persist_with_retry};
pub use server::RelayServer;
pub use service::{ChatService, Receipt};
pub use shutdown::ShutdownCoordinator;
pub use websocket::registry::ConnectionRegistry;
