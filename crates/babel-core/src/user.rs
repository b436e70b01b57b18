// crates/babel-core/src/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four behavioral sub-scores reputation is built from.
///
/// A `None` sub-score is absent: it is left out of the reputation
/// combination entirely rather than counted as zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SubScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_score: Option<f64>,
}

impl SubScores {
    /// Overwrite the sub-scores present in `fresh`, clamped to [0, 1].
    /// Sub-scores absent from `fresh` keep their current values.
    pub fn merge(&mut self, fresh: SubScores) {
        let pick = |current: Option<f64>, update: Option<f64>| {
            update.map(|v| v.clamp(0.0, 1.0)).or(current)
        };
        self.truth_accuracy = pick(self.truth_accuracy, fresh.truth_accuracy);
        self.evidence_quality = pick(self.evidence_quality, fresh.evidence_quality);
        self.engagement_quality = pick(self.engagement_quality, fresh.engagement_quality);
        self.community_score = pick(self.community_score, fresh.community_score);
    }
}

/// A participant with derived trust attributes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(flatten)]
    pub scores: SubScores,
    #[serde(default)]
    pub reputation_score: f64,
    /// 30-day decayed average quality of the user's own context submissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_quality: Option<f64>,
    /// When the user's activity was last analyzed; the next incremental
    /// analysis covers everything after it.
    pub last_active: DateTime<Utc>,
}

impl User {
    /// A freshly registered user with no sub-scores.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scores: SubScores::default(),
            reputation_score: 0.0,
            context_quality: None,
            last_active: Utc::now(),
        }
    }
}

/// Cached aggregate view of a user's scores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserScores {
    pub user_id: String,
    #[serde(flatten)]
    pub scores: SubScores,
    pub reputation_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_quality: Option<f64>,
}

impl From<&User> for UserScores {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            scores: user.scores,
            reputation_score: user.reputation_score,
            context_quality: user.context_quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_absent_and_clamps_present() {
        let mut scores = SubScores {
            truth_accuracy: Some(0.2),
            engagement_quality: Some(0.4),
            ..Default::default()
        };
        scores.merge(SubScores {
            truth_accuracy: Some(0.9),
            community_score: Some(1.7),
            ..Default::default()
        });
        assert_eq!(scores.truth_accuracy, Some(0.9));
        assert_eq!(scores.evidence_quality, None);
        assert_eq!(scores.engagement_quality, Some(0.4));
        assert_eq!(scores.community_score, Some(1.0));
    }

    #[test]
    fn absent_sub_scores_are_omitted_on_the_wire() {
        let mut user = User::new("u1");
        user.scores.truth_accuracy = Some(0.8);
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["truth_accuracy"], 0.8);
        assert!(json.get("evidence_quality").is_none());
    }
}
