//! Message repository: stateless, every method takes `&Connection`.

use chrono::{DateTime, SecondsFormat, Utc};
use relay_core::{ConversationIdentity, Message, MessageId, ParticipantId};
use rusqlite::{Connection, Row, params};

use crate::errors::{Result, StoreError};

/// Raw `messages` row before conversion.
struct MessageRow {
    id: String,
    sender: String,
    content: String,
    created_at: String,
    participants: String,
}

impl MessageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender: row.get(1)?,
            content: row.get(2)?,
            created_at: row.get(3)?,
            participants: row.get(4)?,
        })
    }

    fn into_message(self) -> Result<Message> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StoreError::Corrupt(format!("message {}: bad created_at: {e}", self.id)))?
            .with_timezone(&Utc);
        let participants: ConversationIdentity = serde_json::from_str(&self.participants)?;
        Ok(Message {
            id: Some(MessageId::from_string(self.id)),
            sender: ParticipantId::from_string(self.sender),
            content: self.content,
            created_at,
            participants,
        })
    }
}

/// Fixed-width UTC timestamp so text ordering matches time ordering.
fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// CRUD for the `messages` table.
pub struct MessageRepo;

impl MessageRepo {
    /// Insert a message, assigning a fresh ID when it has none.
    pub fn insert(conn: &Connection, message: &Message) -> Result<MessageId> {
        let id = message.id.clone().unwrap_or_default();
        let participants = serde_json::to_string(&message.participants)?;
        let _ = conn.execute(
            "INSERT INTO messages (id, sender, content, created_at, conversation_key, participants)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                message.sender.as_str(),
                message.content,
                timestamp(&message.created_at),
                message.participants.key(),
                participants,
            ],
        )?;
        Ok(id)
    }

    /// One page of a conversation, newest first.
    pub fn page_by_identity(
        conn: &Connection,
        identity: &ConversationIdentity,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Message>> {
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
        let offset = i64::try_from(page.saturating_mul(page_size)).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare_cached(
            "SELECT id, sender, content, created_at, participants
             FROM messages
             WHERE conversation_key = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![identity.key(), limit, offset], MessageRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }
}
