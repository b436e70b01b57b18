// crates/babel-reputation/src/context.rs
//
// Aggregation of a user's own context submissions over a trailing window.

use babel_core::Evidence;
use chrono::{DateTime, Duration, Utc};

use crate::decay::RecencyDecay;

/// Length of the trailing window context submissions are aggregated over.
pub const CONTEXT_WINDOW_DAYS: i64 = 30;

/// Start of the aggregation window ending at `now`.
pub fn context_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(CONTEXT_WINDOW_DAYS)
}

/// Decay-weighted average quality of the submissions inside the window.
///
/// Returns `None` when there is nothing to aggregate.
pub fn context_quality_aggregate(contexts: &[Evidence], now: DateTime<Utc>) -> Option<f64> {
    let window_start = context_window_start(now);
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for ctx in contexts.iter().filter(|c| c.created_at >= window_start) {
        let weight = RecencyDecay::CONTEXT.factor(ctx.created_at, now);
        weighted_sum += ctx.quality_score * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        Some(weighted_sum / total_weight)
    } else {
        None
    }
}

/// Engagement-quality bump for providing context: the aggregate quality
/// scaled by submission frequency (per day over the window) and 0.1.
pub fn context_engagement_bonus(aggregate: f64, submissions: usize) -> f64 {
    let frequency = submissions as f64 / CONTEXT_WINDOW_DAYS as f64;
    aggregate * frequency * 0.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_core::EvidenceKind;

    fn ctx(quality: f64, created_at: DateTime<Utc>) -> Evidence {
        Evidence {
            id: format!("e-{}", quality),
            content_id: "c1".to_string(),
            submitter_id: "alice".to_string(),
            content_author_id: "alice".to_string(),
            kind: EvidenceKind::AuthorContext,
            text: "context".to_string(),
            references: vec![],
            quality_score: quality,
            created_at,
        }
    }

    #[test]
    fn empty_is_none() {
        assert_eq!(context_quality_aggregate(&[], Utc::now()), None);
    }

    #[test]
    fn single_submission_is_its_quality() {
        let now = Utc::now();
        let agg = context_quality_aggregate(&[ctx(0.8, now - Duration::days(3))], now).unwrap();
        assert!((agg - 0.8).abs() < 1e-10);
    }

    #[test]
    fn recent_submissions_dominate() {
        let now = Utc::now();
        let contexts = [ctx(1.0, now), ctx(0.6, now - Duration::days(20))];
        let agg = context_quality_aggregate(&contexts, now).unwrap();
        assert!(agg > 0.8);
        assert!(agg < 1.0);
    }

    #[test]
    fn outside_window_ignored() {
        let now = Utc::now();
        let contexts = [ctx(0.7, now), ctx(0.1, now - Duration::days(45))];
        let agg = context_quality_aggregate(&contexts, now).unwrap();
        assert!((agg - 0.7).abs() < 1e-10);
    }

    #[test]
    fn bonus_scales_with_frequency() {
        assert!((context_engagement_bonus(0.9, 30) - 0.09).abs() < 1e-10);
        assert!((context_engagement_bonus(0.9, 0) - 0.0).abs() < 1e-10);
    }
}
