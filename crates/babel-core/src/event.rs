// crates/babel-core/src/event.rs
//
// Domain events emitted by the Consensus Manager and fanned out by the hub.
//
// Wire shape: `{ "type": ..., "data": {...}, "timestamp": ..., "target_user_id"?: ... }`.
// A present `target_user_id` means unicast; absent means broadcast.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type tags, named as they appear on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// New content was submitted.
    ContentUpdate,
    /// A vote was recorded on the recipient's content.
    ContentVote,
    /// Per-kind vote counts changed for a content item.
    VoteCountUpdate,
    /// Context/evidence was attached to a content item.
    ContentEvidence,
    /// A scoring pass produced new truth/visibility/consensus values.
    ConsensusUpdate,
    /// The recipient's content received context or evidence.
    NotifyEvidence,
    /// The recipient's reputation changed.
    NotifyReputation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
}

impl Event {
    /// An event for every connected subscriber.
    pub fn broadcast(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
            target_user_id: None,
        }
    }

    /// An event for exactly one user.
    pub fn to_user(user_id: impl Into<String>, kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
            target_user_id: Some(user_id.into()),
        }
    }

    pub fn is_unicast(&self) -> bool {
        self.target_user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn broadcast_omits_target() {
        let event = Event::broadcast(EventKind::ConsensusUpdate, json!({"content_id": "c1"}));
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "CONSENSUS_UPDATE");
        assert_eq!(wire["data"]["content_id"], "c1");
        assert!(wire.get("target_user_id").is_none());
        assert!(!event.is_unicast());
    }

    #[test]
    fn unicast_carries_target() {
        let event = Event::to_user("alice", EventKind::ContentVote, json!({}));
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "CONTENT_VOTE");
        assert_eq!(wire["target_user_id"], "alice");
    }
}
