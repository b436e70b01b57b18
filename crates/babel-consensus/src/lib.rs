// crates/babel-consensus/src/lib.rs
//
// babel-consensus: Crowd-consensus scoring for the Babel Protocol.
//
// Votes are folded into a truth score (affirm/deny only) and a visibility
// score (every kind), both decayed by recency. The Consensus Manager accepts
// submissions, votes, and author context, keeps a short-TTL score cache, and
// recomputes buffered items in batches off the request path.

pub mod analysis;
pub mod batch;
pub mod cache;
pub mod manager;
pub mod scoring;

pub use analysis::HttpAnalysisClient;
pub use batch::{BatchConfig, BatchQueue};
pub use cache::{CachedScores, ScoreCache, TtlCache};
pub use manager::{ConsensusManager, ContextSubmission, ManagerConfig};
