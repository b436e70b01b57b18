// crates/babel-core/src/evidence.rs
//
// Supporting material attached to a content item. The quality score is
// computed once at creation and never recomputed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who supplied the material.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Context the content's own author attached to it.
    AuthorContext,
    /// Evidence submitted by someone other than the author.
    ThirdParty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    pub id: String,
    /// The content item this material is attached to.
    pub content_id: String,
    pub submitter_id: String,
    pub content_author_id: String,
    pub kind: EvidenceKind,
    pub text: String,
    #[serde(default)]
    pub references: Vec<String>,
    /// Quality in [0.6, 1.0] for author context.
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
}

impl Evidence {
    pub fn is_author_context(&self) -> bool {
        self.kind == EvidenceKind::AuthorContext
    }
}
