//! The message record fanned out to live connections and persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::identity::{ConversationIdentity, canonicalize};
use crate::ids::{MessageId, ParticipantId};

/// One message posted to a conversation.
///
/// Immutable once built. The `id` stays `None` until a store assigns one;
/// live delivery does not wait for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Who posted the message.
    pub sender: ParticipantId,
    /// Opaque message body.
    pub content: String,
    /// When the message was accepted.
    pub created_at: DateTime<Utc>,
    /// Canonical participant set (includes the sender).
    pub participants: ConversationIdentity,
}

impl Message {
    /// Build a message stamped with the current time.
    pub fn new(
        sender: ParticipantId,
        participants: &[ParticipantId],
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            sender,
            content: content.into(),
            created_at: Utc::now(),
            participants: canonicalize(participants),
        }
    }

    /// Same message with an explicit creation time.
    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Same message carrying a store-assigned ID.
    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Serialize to the JSON payload pushed over live connections.
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_bob(content: &str) -> Message {
        Message::new(
            ParticipantId::from("alice"),
            &[ParticipantId::from("bob"), ParticipantId::from("alice")],
            content,
        )
    }

    #[test]
    fn new_canonicalizes_participants() {
        let msg = alice_bob("hi");
        let names: Vec<&str> = msg.participants.iter().map(ParticipantId::as_str).collect();
        assert_eq!(names, ["alice", "bob"]);
        assert!(msg.id.is_none());
    }

    #[test]
    fn payload_shape() {
        let msg = alice_bob("hi");
        let payload = msg.to_payload().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["sender"], "alice");
        assert_eq!(parsed["content"], "hi");
        assert_eq!(parsed["participants"], serde_json::json!(["alice", "bob"]));
        assert!(parsed["created_at"].is_string());
        assert!(parsed.get("id").is_none());
    }

    #[test]
    fn payload_includes_id_once_assigned() {
        let msg = alice_bob("hi").with_id(MessageId::from("m-1"));
        let parsed: serde_json::Value = serde_json::from_str(&msg.to_payload().unwrap()).unwrap();
        assert_eq!(parsed["id"], "m-1");
    }

    #[test]
    fn at_overrides_timestamp() {
        let ts = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let msg = alice_bob("hi").at(ts);
        assert_eq!(msg.created_at, ts);
    }
}
