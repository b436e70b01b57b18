// crates/babel-reputation/src/lib.rs
//
// babel-reputation: Recency decay, reputation scoring, and context-quality
// aggregation for the Babel Protocol.
//
// Recent opinions dominate: vote weights decay over a day, context
// contributions over a month. A user's reputation is a convex combination of
// whichever behavioral sub-scores are actually known.

pub mod context;
pub mod decay;
pub mod reputation;

pub use context::{context_engagement_bonus, context_quality_aggregate, CONTEXT_WINDOW_DAYS};
pub use decay::RecencyDecay;
pub use reputation::{reputation_score, ReputationWeights};
