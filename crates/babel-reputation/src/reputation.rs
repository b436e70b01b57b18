// crates/babel-reputation/src/reputation.rs
//
// User reputation as a convex combination of behavioral sub-scores.

use babel_core::SubScores;
use serde::{Deserialize, Serialize};

/// Weight of each sub-score in the reputation combination. Sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReputationWeights {
    pub truth_accuracy: f64,
    pub evidence_quality: f64,
    pub engagement_quality: f64,
    pub community_score: f64,
}

impl Default for ReputationWeights {
    fn default() -> Self {
        Self {
            truth_accuracy: 0.4,
            evidence_quality: 0.3,
            engagement_quality: 0.2,
            community_score: 0.1,
        }
    }
}

impl ReputationWeights {
    /// Weighted average over the sub-scores that are present.
    ///
    /// Absent sub-scores drop out of both numerator and denominator, so the
    /// remaining weights are re-normalized. Returns 0.0 when none are present.
    pub fn combine(&self, scores: &SubScores) -> f64 {
        let pairs = [
            (scores.truth_accuracy, self.truth_accuracy),
            (scores.evidence_quality, self.evidence_quality),
            (scores.engagement_quality, self.engagement_quality),
            (scores.community_score, self.community_score),
        ];

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for (score, weight) in pairs {
            if let Some(score) = score {
                weighted_sum += score * weight;
                total_weight += weight;
            }
        }

        if total_weight == 0.0 {
            return 0.0;
        }
        weighted_sum / total_weight
    }
}

/// Reputation with the default weights.
pub fn reputation_score(scores: &SubScores) -> f64 {
    ReputationWeights::default().combine(scores)
}
