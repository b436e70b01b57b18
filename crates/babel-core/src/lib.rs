// crates/babel-core/src/lib.rs
//
// babel-core: Core types, events, errors, and collaborator traits for the
// Babel Protocol.
//
// This is the leaf crate that every other crate in the workspace depends on.
// It defines the content/vote/evidence/user records, the event envelope
// delivered to subscribers, the protocol-wide error type, and the traits
// through which the scoring engine reaches its external collaborators
// (persistence, content analysis, event delivery).

pub mod analysis;
pub mod content;
pub mod error;
pub mod event;
pub mod evidence;
pub mod traits;
pub mod user;
pub mod vote;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use babel_core::Content;`

// Content types
pub use content::{ConsensusInfo, ConsensusState, Content, ProcessingStatus, CONTEXT_CONTENT_TYPE};

// Vote types
pub use vote::{Ballot, Vote, VoteKind};

// Evidence types
pub use evidence::{Evidence, EvidenceKind};

// User types
pub use user::{SubScores, User, UserScores};

// Event types
pub use event::{Event, EventKind};

// Analysis payloads
pub use analysis::{
    AnalysisItem, BatchAnalysisRequest, BatchAnalysisResponse, ConsensusSource, ContentAnalysis,
    UserActivity, UserActivityRequest, UserAnalysisResponse,
};

// Error type
pub use error::BabelError;

// Traits
pub use traits::{AnalysisService, ContentStore, EventSink};
