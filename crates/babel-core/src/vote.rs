// crates/babel-core/src/vote.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BabelError;

/// Kind of judgment a user casts on a content item.
///
/// Only `Affirm`/`Deny` move the truth score; every kind moves visibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    Upvote,
    Downvote,
    Affirm,
    Deny,
    Engage,
    Unengage,
    /// Anything not recognized on the wire. Never accepted by validation.
    #[serde(other)]
    Unknown,
}

impl VoteKind {
    /// Whether this kind carries a certainty level and feeds the truth score.
    pub fn is_truth_vote(&self) -> bool {
        matches!(self, VoteKind::Affirm | VoteKind::Deny)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Upvote => "upvote",
            VoteKind::Downvote => "downvote",
            VoteKind::Affirm => "affirm",
            VoteKind::Deny => "deny",
            VoteKind::Engage => "engage",
            VoteKind::Unengage => "unengage",
            VoteKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a voter submits: the judgment without identity or timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ballot {
    pub kind: VoteKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// 1-3, required for affirm/deny and forbidden otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<u8>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
}

fn default_weight() -> f64 {
    1.0
}

impl Ballot {
    pub fn new(kind: VoteKind, weight: f64, certainty: Option<u8>) -> Self {
        Self {
            kind,
            weight,
            certainty,
            evidence_ids: Vec::new(),
        }
    }

    /// Enforce the kind/certainty pairing and a usable weight.
    pub fn validate(&self) -> Result<(), BabelError> {
        match (self.kind, self.certainty) {
            (VoteKind::Unknown, _) => {
                return Err(BabelError::Validation("invalid vote type".to_string()));
            }
            (VoteKind::Affirm | VoteKind::Deny, Some(1..=3)) => {}
            (VoteKind::Affirm | VoteKind::Deny, _) => {
                return Err(BabelError::Validation(format!(
                    "certainty level must be between 1 and 3 for {} votes",
                    self.kind
                )));
            }
            (_, Some(_)) => {
                return Err(BabelError::Validation(format!(
                    "certainty level must not be set for {} votes",
                    self.kind
                )));
            }
            (_, None) => {}
        }

        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(BabelError::Validation(format!(
                "vote weight must be a non-negative number, got {}",
                self.weight
            )));
        }

        Ok(())
    }
}

/// One user's active judgment on one content item.
///
/// At most one exists per (content_id, voter_id); re-voting replaces it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub content_id: String,
    pub voter_id: String,
    pub kind: VoteKind,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<u8>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    /// Stamp a ballot with its content, voter, and the current time.
    pub fn from_ballot(content_id: impl Into<String>, voter_id: impl Into<String>, ballot: Ballot) -> Self {
        Self {
            content_id: content_id.into(),
            voter_id: voter_id.into(),
            kind: ballot.kind,
            weight: ballot.weight,
            certainty: ballot.certainty,
            evidence_ids: ballot.evidence_ids,
            cast_at: Utc::now(),
        }
    }
}
