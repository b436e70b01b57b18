// crates/babel-core/src/analysis.rs
//
// Request/response payloads exchanged with the external analysis service.
//
// Every attribute the engine consumes has a named field with a safe default,
// so a partial or older response still decodes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::evidence::Evidence;
use crate::user::{SubScores, User};
use crate::vote::Vote;

/// One vote as seen by the analysis service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusSource {
    pub user_id: String,
    /// Mapped vote value (see `babel_consensus::scoring::vote_value`).
    pub vote_value: f64,
    /// Unix seconds.
    pub timestamp: i64,
    pub weight: f64,
}

/// One content item in a batch analysis request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisItem {
    pub content_id: String,
    pub author_id: String,
    pub content_type: String,
    pub text: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub sources: Vec<ConsensusSource>,
    pub previous_consensus_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchAnalysisRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    pub items: Vec<AnalysisItem>,
}

impl BatchAnalysisRequest {
    pub fn new(items: Vec<AnalysisItem>) -> Self {
        Self {
            request_type: "content_analysis_batch".to_string(),
            items,
        }
    }
}

/// Derived attributes for one content item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContentAnalysis {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    /// Suggested truth-score contribution; advisory.
    #[serde(default, alias = "truth_score")]
    pub truth_contribution: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchAnalysisResponse {
    #[serde(default = "default_status")]
    pub status: String,
    /// Keyed by content id. Items missing here keep their previous attributes.
    #[serde(default)]
    pub results: HashMap<String, ContentAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_status() -> String {
    "success".to_string()
}

impl Default for BatchAnalysisResponse {
    fn default() -> Self {
        Self {
            status: default_status(),
            results: HashMap::new(),
            error: None,
        }
    }
}

impl BatchAnalysisResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// A content item (post or context) the user authored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserActivity {
    pub content_id: String,
    pub content_type: String,
    #[serde(default)]
    pub is_context: bool,
    pub truth_score: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&Content> for UserActivity {
    fn from(content: &Content) -> Self {
        Self {
            content_id: content.id.clone(),
            content_type: content.content_type.clone(),
            is_context: content.is_context,
            truth_score: content.truth_score,
            created_at: content.created_at,
        }
    }
}

/// Everything a user did since their scores were last analyzed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserActivityRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    pub user_id: String,
    /// Start of the incremental window.
    pub since: DateTime<Utc>,
    pub activities: Vec<UserActivity>,
    pub votes: Vec<Vote>,
    pub evidence: Vec<Evidence>,
    pub current_scores: SubScores,
    pub timestamp: DateTime<Utc>,
}

impl UserActivityRequest {
    pub fn incremental(
        user: &User,
        activities: Vec<UserActivity>,
        votes: Vec<Vote>,
        evidence: Vec<Evidence>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            request_type: "user_analysis_incremental".to_string(),
            user_id: user.id.clone(),
            since: user.last_active,
            activities,
            votes,
            evidence,
            current_scores: user.scores,
            timestamp: now,
        }
    }
}

/// Updated sub-scores for one user. Sub-scores missing from `scores` keep
/// their current values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAnalysisResponse {
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub scores: Option<SubScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for UserAnalysisResponse {
    fn default() -> Self {
        Self {
            status: default_status(),
            scores: None,
            error: None,
        }
    }
}

impl UserAnalysisResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
