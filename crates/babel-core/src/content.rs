// crates/babel-core/src/content.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::BabelError;

/// `content_type` given to author-supplied context items.
pub const CONTEXT_CONTENT_TYPE: &str = "context";

/// Visibility of freshly created content that has not received any votes.
pub const DEFAULT_VISIBILITY: f64 = 1.0;

/// Processing status of a content item in the batch recomputation pipeline.
///
///   Pending --> Processing --> Completed
///                   |
///                   v
///                 Failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Stored, waiting in the batch buffer.
    #[default]
    Pending,
    /// Picked up by a batch flush.
    Processing,
    /// Scores applied and persisted by a batch flush.
    Completed,
    /// The batch carrying this item failed and was dropped.
    Failed,
}

impl ProcessingStatus {
    /// Validate and perform a status transition.
    ///
    /// Re-queued items may go back to `Pending` from `Completed`; nothing
    /// leaves `Failed`.
    pub fn transition(&mut self, next: ProcessingStatus) -> Result<(), BabelError> {
        let valid = matches!(
            (*self, next),
            (ProcessingStatus::Pending, ProcessingStatus::Processing)
                | (ProcessingStatus::Processing, ProcessingStatus::Completed)
                | (ProcessingStatus::Processing, ProcessingStatus::Failed)
                | (ProcessingStatus::Completed, ProcessingStatus::Pending)
        );

        if valid {
            *self = next;
            Ok(())
        } else {
            Err(BabelError::InvalidState(format!(
                "Invalid processing transition: {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Processing => write!(f, "processing"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Presentational label derived from thresholding a truth score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusState {
    Established,
    Provisional,
    Emerging,
    #[default]
    Insufficient,
}

impl ConsensusState {
    /// Label for a score: >=0.8 established, >=0.6 provisional,
    /// >=0.4 emerging, anything else insufficient.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConsensusState::Established
        } else if score >= 0.6 {
            ConsensusState::Provisional
        } else if score >= 0.4 {
            ConsensusState::Emerging
        } else {
            ConsensusState::Insufficient
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusState::Established => "established",
            ConsensusState::Provisional => "provisional",
            ConsensusState::Emerging => "emerging",
            ConsensusState::Insufficient => "insufficient",
        }
    }
}

impl fmt::Display for ConsensusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consensus summary attached to a content item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsensusInfo {
    /// Score the label was derived from (the truth score of the last pass).
    pub score: f64,
    pub state: ConsensusState,
}

impl ConsensusInfo {
    pub fn from_score(score: f64) -> Self {
        Self {
            score,
            state: ConsensusState::from_score(score),
        }
    }
}

/// A post, comment, or author context item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub id: String,
    pub author_id: String,
    /// Free-form type tag ("post", "comment", "context", ...).
    pub content_type: String,
    pub text: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_context: bool,
    #[serde(default)]
    pub truth_score: f64,
    #[serde(default = "default_visibility")]
    pub visibility_score: f64,
    #[serde(default)]
    pub consensus: ConsensusInfo,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    /// Topics reported by the analysis service.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Entities reported by the analysis service.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Truth estimate suggested by the analysis service. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_truth: Option<f64>,
    /// Hex SHA-256 over id, author and text, set on submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Time of the vote snapshot the current scores were computed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores_computed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_visibility() -> f64 {
    DEFAULT_VISIBILITY
}

impl Content {
    /// Build a new, unscored content item.
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        content_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            author_id: author_id.into(),
            content_type: content_type.into(),
            text: text.into(),
            media_urls: Vec::new(),
            parent_id: None,
            is_context: false,
            truth_score: 0.0,
            visibility_score: DEFAULT_VISIBILITY,
            consensus: ConsensusInfo::default(),
            processing_status: ProcessingStatus::Pending,
            topics: Vec::new(),
            entities: Vec::new(),
            suggested_truth: None,
            hash: None,
            scores_computed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the fields every submission must carry.
    pub fn validate(&self) -> Result<(), BabelError> {
        if self.id.trim().is_empty() {
            return Err(BabelError::Validation("content ID is required".to_string()));
        }
        if self.author_id.trim().is_empty() {
            return Err(BabelError::Validation("author ID is required".to_string()));
        }
        if self.text.trim().is_empty() {
            return Err(BabelError::Validation("content text is required".to_string()));
        }
        if self.content_type.trim().is_empty() {
            return Err(BabelError::Validation("content type is required".to_string()));
        }
        Ok(())
    }

    /// Hex-encoded SHA-256(id || author_id || text).
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(self.author_id.as_bytes());
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Overwrite the derived scores and the consensus label in one step.
    pub fn apply_scores(&mut self, truth: f64, visibility: f64, computed_at: DateTime<Utc>) {
        self.truth_score = truth;
        self.visibility_score = visibility;
        self.consensus = ConsensusInfo::from_score(truth);
        self.scores_computed_at = Some(computed_at);
    }
}
