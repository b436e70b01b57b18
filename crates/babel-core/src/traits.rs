// crates/babel-core/src/traits.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analysis::{
    BatchAnalysisRequest, BatchAnalysisResponse, UserActivityRequest, UserAnalysisResponse,
};
use crate::content::Content;
use crate::error::BabelError;
use crate::event::Event;
use crate::evidence::Evidence;
use crate::user::User;
use crate::vote::Vote;

/// Trait for the durable store of content, votes, evidence, and users.
///
/// Each call is atomic at the record (or batch) level and reports failures
/// as errors; there are no silent partial writes.
///
/// Implemented by babel-store (in-memory reference store).
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new content item. Fails with `AlreadyExists` on a duplicate id.
    async fn create_content(&self, content: &Content) -> Result<(), BabelError>;

    /// Retrieve a content item by id.
    async fn get_content(&self, id: &str) -> Result<Option<Content>, BabelError>;

    /// Replace an existing content item. Fails with `NotFound` if absent.
    async fn update_content(&self, content: &Content) -> Result<(), BabelError>;

    /// Replace several content items at once; either all are written or none.
    async fn update_content_batch(&self, contents: &[Content]) -> Result<(), BabelError>;

    /// Upsert a vote keyed by (content_id, voter_id).
    async fn record_vote(&self, vote: &Vote) -> Result<(), BabelError>;

    /// All currently active votes on a content item.
    async fn get_content_votes(&self, content_id: &str) -> Result<Vec<Vote>, BabelError>;

    /// Insert an evidence/context record.
    async fn create_evidence(&self, evidence: &Evidence) -> Result<(), BabelError>;

    /// Insert a context content item together with its evidence record.
    /// Neither is written if either insert fails.
    async fn create_context(&self, context: &Content, evidence: &Evidence) -> Result<(), BabelError>;

    /// Author-context records submitted by `user_id` at or after `since`.
    async fn get_user_contexts(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Evidence>, BabelError>;

    /// Content items authored by `user_id` at or after `since`.
    async fn get_user_contents(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Content>, BabelError>;

    /// Votes cast by `user_id` at or after `since`.
    async fn get_user_votes(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Vote>, BabelError>;

    /// Evidence of any kind submitted by `user_id` at or after `since`.
    async fn get_user_evidence(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Evidence>, BabelError>;

    /// Retrieve a user by id.
    async fn get_user(&self, id: &str) -> Result<Option<User>, BabelError>;

    /// Replace a user's record. Fails with `NotFound` if absent.
    async fn update_user(&self, user: &User) -> Result<(), BabelError>;
}

/// Trait for the external content analysis service.
///
/// Results are advisory; the engine always has a vote-only fallback.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Analyze a batch of content items in one round-trip.
    async fn analyze_batch(
        &self,
        request: &BatchAnalysisRequest,
    ) -> Result<BatchAnalysisResponse, BabelError>;

    /// Derive fresh sub-scores from a user's recent activity.
    async fn analyze_user(
        &self,
        request: &UserActivityRequest,
    ) -> Result<UserAnalysisResponse, BabelError>;
}

/// Trait for delivering domain events to live subscribers.
///
/// Delivery is best-effort: implementations drop events for users without a
/// live connection instead of failing.
///
/// Implemented by babel-hub.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Route an event: unicast when `target_user_id` is set, broadcast otherwise.
    async fn publish(&self, event: Event) -> Result<(), BabelError>;
}
