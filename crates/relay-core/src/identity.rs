//! Conversation identity: the canonical, order-independent key for a
//! participant set.
//!
//! A conversation has no ID of its own. It is named by its participants,
//! sorted lexicographically with duplicates removed, so `[bob, alice]` and
//! `[alice, bob, alice]` are the same conversation. The sorted array is what
//! gets stored alongside every message and what history lookups match on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::ParticipantId;

/// Sorted, deduplicated participant set naming one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<ParticipantId>", into = "Vec<ParticipantId>")]
pub struct ConversationIdentity(Vec<ParticipantId>);

/// Canonicalize a participant sequence without touching the caller's copy.
///
/// An empty input yields an empty identity; callers reject that before it
/// reaches delivery or storage.
#[must_use]
pub fn canonicalize(participants: &[ParticipantId]) -> ConversationIdentity {
    ConversationIdentity::from(participants.to_vec())
}

impl ConversationIdentity {
    /// The canonical participant list.
    pub fn participants(&self) -> &[ParticipantId] {
        &self.0
    }

    /// Iterate participants in canonical order.
    pub fn iter(&self) -> std::slice::Iter<'_, ParticipantId> {
        self.0.iter()
    }

    /// Whether `participant` belongs to this conversation.
    pub fn contains(&self, participant: &str) -> bool {
        self.0
            .binary_search_by(|p| p.as_str().cmp(participant))
            .is_ok()
    }

    /// Number of distinct participants.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the identity names no one.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deterministic storage key (JSON array of the sorted participants).
    ///
    /// Unambiguous for any participant string, including ones containing
    /// the `,` used by [`fmt::Display`].
    pub fn key(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl From<Vec<ParticipantId>> for ConversationIdentity {
    fn from(mut participants: Vec<ParticipantId>) -> Self {
        participants.sort_unstable();
        participants.dedup();
        Self(participants)
    }
}

impl From<ConversationIdentity> for Vec<ParticipantId> {
    fn from(identity: ConversationIdentity) -> Self {
        identity.0
    }
}

impl<'a> IntoIterator for &'a ConversationIdentity {
    type Item = &'a ParticipantId;
    type IntoIter = std::slice::Iter<'a, ParticipantId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ConversationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(p.as_str())?;
        }
        Ok(())
    }
}
