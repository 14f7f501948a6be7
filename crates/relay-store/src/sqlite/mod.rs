//! `SQLite` message store.
//!
//! Queries are synchronous `rusqlite` calls on pooled connections, moved
//! off the async runtime with `spawn_blocking`.

pub mod connection;
pub mod migrations;
pub mod repository;

use async_trait::async_trait;
use relay_core::{ConversationIdentity, Message, MessageId};
use tracing::info;

use self::connection::{ConnectionConfig, ConnectionPool};
use self::repository::MessageRepo;
use crate::errors::{Result, StoreError};
use crate::store::MessageStore;

/// [`MessageStore`] backed by an `r2d2` pool of `SQLite` connections.
#[derive(Clone)]
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        info!(path, "opened message database");
        Self::from_pool(pool)
    }

    /// Fresh in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    fn from_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let _ = migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn save(&self, message: &Message) -> Result<MessageId> {
        let message = message.clone();
        self.with_conn(move |conn| MessageRepo::insert(conn, &message))
            .await
    }

    async fn query_by_identity(
        &self,
        identity: &ConversationIdentity,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Message>> {
        let identity = identity.clone();
        self.with_conn(move |conn| MessageRepo::page_by_identity(conn, &identity, page, page_size))
            .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
