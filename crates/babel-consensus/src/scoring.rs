// crates/babel-consensus/src/scoring.rs
//
// Pure scoring functions over a point-in-time snapshot of votes.
//
// Every function takes `now` explicitly: decay makes the scores drift with
// wall-clock time even when no new votes arrive.

use babel_core::{Vote, VoteKind};
use babel_reputation::RecencyDecay;
use chrono::{DateTime, Utc};

/// Largest per-kind visibility multiplier (engage).
pub const MAX_VISIBILITY_MULTIPLIER: f64 = 1.5;

/// Floor applied to every visibility score.
pub const MIN_VISIBILITY: f64 = 0.1;

/// Share of a context item's quality added to its parent's truth score.
pub const CONTEXT_BOOST_FACTOR: f64 = 0.2;

/// Map a vote to its numeric value.
///
/// Affirm/deny move away from the neutral 0.5 by 0.25 per certainty level,
/// so the range is [-0.25, 1.25]. Unrecognized kinds are neutral.
pub fn vote_value(kind: VoteKind, certainty: Option<u8>) -> f64 {
    match (kind, certainty) {
        (VoteKind::Upvote, _) => 1.0,
        (VoteKind::Downvote, _) => 0.0,
        (VoteKind::Affirm, Some(c)) => 0.5 + 0.25 * c as f64,
        (VoteKind::Deny, Some(c)) => 0.5 - 0.25 * c as f64,
        (VoteKind::Engage, _) => 0.75,
        (VoteKind::Unengage, _) => 0.25,
        _ => 0.5,
    }
}

/// Per-kind multiplier used by the visibility score.
fn visibility_multiplier(kind: VoteKind) -> f64 {
    match kind {
        VoteKind::Upvote | VoteKind::Downvote => 1.0,
        VoteKind::Affirm | VoteKind::Deny => 1.2,
        VoteKind::Engage => 1.5,
        VoteKind::Unengage => 0.5,
        VoteKind::Unknown => 0.0,
    }
}

/// Decay-weighted average vote value over affirm/deny votes only.
///
/// 0.0 when no affirm/deny votes exist (or all of them carry zero weight).
pub fn truth_score(votes: &[Vote], now: DateTime<Utc>) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for vote in votes.iter().filter(|v| v.kind.is_truth_vote()) {
        let weight = RecencyDecay::VOTES.apply(vote.weight, vote.cast_at, now);
        weighted_sum += vote_value(vote.kind, vote.certainty) * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    }
}

/// Engagement-weighted prominence over every vote, in [0.1, 1.0].
///
/// 1.0 with no votes at all.
pub fn visibility_score(votes: &[Vote], now: DateTime<Utc>) -> f64 {
    if votes.is_empty() {
        return 1.0;
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for vote in votes {
        let weight = RecencyDecay::VOTES.apply(vote.weight, vote.cast_at, now);
        weighted_sum += weight * visibility_multiplier(vote.kind);
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return MIN_VISIBILITY;
    }

    let normalized = (weighted_sum / total_weight) / MAX_VISIBILITY_MULTIPLIER;
    normalized.clamp(MIN_VISIBILITY, 1.0)
}

/// Quality of an author context submission, in [0.6, 1.0].
///
/// Text length and reference count each contribute at most 0.2.
pub fn context_quality(text: &str, reference_count: usize) -> f64 {
    let length_bonus = (text.chars().count() as f64 / 1000.0).min(0.2);
    let reference_bonus = (0.05 * reference_count as f64).min(0.2);
    0.6 + length_bonus + reference_bonus
}

/// Parent truth score after attaching context of the given quality.
///
/// Capped at 1.0, but never below `current`: a score already above the cap
/// is left where it is.
pub fn boost_truth_with_context(current: f64, quality: f64) -> f64 {
    current.max((current + quality * CONTEXT_BOOST_FACTOR).min(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_core::Ballot;
    use chrono::Duration;

    fn vote_at(kind: VoteKind, certainty: Option<u8>, weight: f64, cast_at: DateTime<Utc>) -> Vote {
        let mut v = Vote::from_ballot("c1", format!("{}-{:?}", kind, cast_at), Ballot::new(kind, weight, certainty));
        v.cast_at = cast_at;
        v
    }

    #[test]
    fn test_vote_values() {
        assert_eq!(vote_value(VoteKind::Upvote, None), 1.0);
        assert_eq!(vote_value(VoteKind::Downvote, None), 0.0);
        assert_eq!(vote_value(VoteKind::Affirm, Some(1)), 0.75);
        assert_eq!(vote_value(VoteKind::Affirm, Some(3)), 1.25);
        assert_eq!(vote_value(VoteKind::Deny, Some(2)), 0.0);
        assert_eq!(vote_value(VoteKind::Deny, Some(3)), -0.25);
        assert_eq!(vote_value(VoteKind::Engage, None), 0.75);
        assert_eq!(vote_value(VoteKind::Unengage, None), 0.25);
        assert_eq!(vote_value(VoteKind::Unknown, None), 0.5);
        assert_eq!(vote_value(VoteKind::Affirm, None), 0.5);
    }

    #[test]
    fn test_truth_ignores_non_truth_votes() {
        let now = Utc::now();
        let votes = vec![
            vote_at(VoteKind::Upvote, None, 1.0, now),
            vote_at(VoteKind::Engage, None, 5.0, now),
        ];
        assert_eq!(truth_score(&votes, now), 0.0);
        assert_eq!(truth_score(&[], now), 0.0);
    }

    #[test]
    fn test_single_fresh_affirm() {
        let now = Utc::now();
        let votes = vec![vote_at(VoteKind::Affirm, Some(3), 1.0, now)];
        assert!((truth_score(&votes, now) - 1.25).abs() < 1e-10);
    }

    #[test]
    fn test_truth_monotonic_in_certainty() {
        let now = Utc::now();
        let deny = vote_at(VoteKind::Deny, Some(1), 1.0, now - Duration::hours(2));
        let mut last = f64::NEG_INFINITY;
        for c in 1..=3 {
            let votes = vec![deny.clone(), vote_at(VoteKind::Affirm, Some(c), 1.0, now)];
            let score = truth_score(&votes, now);
            assert!(score > last);
            assert!((-0.25..=1.25).contains(&score));
            last = score;
        }
    }

    #[test]
    fn test_recent_votes_dominate() {
        let now = Utc::now();
        let votes = vec![
            vote_at(VoteKind::Deny, Some(3), 1.0, now - Duration::hours(72)),
            vote_at(VoteKind::Affirm, Some(3), 1.0, now),
        ];
        assert!(truth_score(&votes, now) > 1.0);
    }

    #[test]
    fn test_visibility_bounds() {
        let now = Utc::now();
        assert_eq!(visibility_score(&[], now), 1.0);

        let engaged = vec![vote_at(VoteKind::Engage, None, 1.0, now)];
        assert!((visibility_score(&engaged, now) - 1.0).abs() < 1e-10);

        let unengaged = vec![vote_at(VoteKind::Unengage, None, 1.0, now)];
        assert!((visibility_score(&unengaged, now) - 0.5 / 1.5).abs() < 1e-10);

        let weightless = vec![vote_at(VoteKind::Upvote, None, 0.0, now)];
        assert_eq!(visibility_score(&weightless, now), MIN_VISIBILITY);

        let mixed = vec![
            vote_at(VoteKind::Upvote, None, 2.0, now - Duration::hours(5)),
            vote_at(VoteKind::Affirm, Some(2), 1.0, now),
            vote_at(VoteKind::Unengage, None, 3.0, now - Duration::hours(50)),
        ];
        let v = visibility_score(&mixed, now);
        assert!((MIN_VISIBILITY..=1.0).contains(&v));
    }

    #[test]
    fn test_context_quality_caps() {
        assert!((context_quality("", 0) - 0.6).abs() < 1e-10);
        assert!((context_quality(&"x".repeat(100), 1) - 0.75).abs() < 1e-10);
        assert!((context_quality(&"x".repeat(5000), 20) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_context_boost_capped() {
        assert!((boost_truth_with_context(0.5, 0.8) - 0.66).abs() < 1e-10);
        assert_eq!(boost_truth_with_context(0.95, 1.0), 1.0);
    }

    #[test]
    fn test_context_boost_never_lowers_score() {
        assert_eq!(boost_truth_with_context(1.25, 0.6), 1.25);
        assert_eq!(boost_truth_with_context(1.0, 0.6), 1.0);
        for current in [-0.25, 0.0, 0.4, 0.99, 1.1] {
            assert!(boost_truth_with_context(current, 0.7) >= current);
        }
    }
}
