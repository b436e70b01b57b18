// crates/babel-store/src/memory.rs
//
// In-memory `ContentStore` backed by tokio RwLock-guarded HashMaps.
//
// Layout:
//   - contents: content id -> Content
//   - votes:    content id -> (voter id -> Vote)   one active vote per pair
//   - evidence: evidence id -> Evidence
//   - users:    user id -> User

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use babel_core::error::BabelError;
use babel_core::traits::ContentStore;
use babel_core::{Content, Evidence, User, Vote};

/// In-memory store implementing `ContentStore`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    contents: RwLock<HashMap<String, Content>>,
    votes: RwLock<HashMap<String, HashMap<String, Vote>>>,
    evidence: RwLock<HashMap<String, Evidence>>,
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user. Fails if the id is taken.
    pub async fn create_user(&self, user: &User) -> Result<(), BabelError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(BabelError::AlreadyExists(format!("user {}", user.id)));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    /// Register a user with no sub-scores unless one already exists.
    ///
    /// Returns `true` if a user was created.
    pub async fn ensure_user(&self, user_id: &str) -> bool {
        let mut users = self.users.write().await;
        if users.contains_key(user_id) {
            return false;
        }
        tracing::debug!(user_id, "Registering new user");
        users.insert(user_id.to_string(), User::new(user_id));
        true
    }

    /// Number of stored content items (including context items).
    pub async fn content_count(&self) -> usize {
        self.contents.read().await.len()
    }

    /// All evidence attached to a content item.
    pub async fn evidence_for(&self, content_id: &str) -> Vec<Evidence> {
        self.evidence
            .read()
            .await
            .values()
            .filter(|e| e.content_id == content_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn create_content(&self, content: &Content) -> Result<(), BabelError> {
        let mut contents = self.contents.write().await;
        if contents.contains_key(&content.id) {
            return Err(BabelError::AlreadyExists(format!("content {}", content.id)));
        }
        contents.insert(content.id.clone(), content.clone());
        Ok(())
    }

    async fn get_content(&self, id: &str) -> Result<Option<Content>, BabelError> {
        Ok(self.contents.read().await.get(id).cloned())
    }

    async fn update_content(&self, content: &Content) -> Result<(), BabelError> {
        let mut contents = self.contents.write().await;
        match contents.get_mut(&content.id) {
            Some(existing) => {
                *existing = content.clone();
                Ok(())
            }
            None => Err(BabelError::NotFound(format!("content {}", content.id))),
        }
    }

    async fn update_content_batch(&self, batch: &[Content]) -> Result<(), BabelError> {
        let mut contents = self.contents.write().await;
        // Check every id before writing any, so a bad batch leaves no trace.
        if let Some(missing) = batch.iter().find(|c| !contents.contains_key(&c.id)) {
            return Err(BabelError::NotFound(format!("content {}", missing.id)));
        }
        for content in batch {
            contents.insert(content.id.clone(), content.clone());
        }
        Ok(())
    }

    async fn record_vote(&self, vote: &Vote) -> Result<(), BabelError> {
        self.votes
            .write()
            .await
            .entry(vote.content_id.clone())
            .or_default()
            .insert(vote.voter_id.clone(), vote.clone());
        Ok(())
    }

    async fn get_content_votes(&self, content_id: &str) -> Result<Vec<Vote>, BabelError> {
        let votes = self.votes.read().await;
        let mut list: Vec<Vote> = votes
            .get(content_id)
            .map(|by_voter| by_voter.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| a.cast_at.cmp(&b.cast_at));
        Ok(list)
    }

    async fn create_evidence(&self, evidence: &Evidence) -> Result<(), BabelError> {
        let mut store = self.evidence.write().await;
        if store.contains_key(&evidence.id) {
            return Err(BabelError::AlreadyExists(format!("evidence {}", evidence.id)));
        }
        store.insert(evidence.id.clone(), evidence.clone());
        Ok(())
    }

    async fn create_context(&self, context: &Content, evidence: &Evidence) -> Result<(), BabelError> {
        // Lock order: contents, then evidence.
        let mut contents = self.contents.write().await;
        let mut store = self.evidence.write().await;
        if contents.contains_key(&context.id) {
            return Err(BabelError::AlreadyExists(format!("content {}", context.id)));
        }
        if store.contains_key(&evidence.id) {
            return Err(BabelError::AlreadyExists(format!("evidence {}", evidence.id)));
        }
        contents.insert(context.id.clone(), context.clone());
        store.insert(evidence.id.clone(), evidence.clone());
        Ok(())
    }

    async fn get_user_contexts(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Evidence>, BabelError> {
        let store = self.evidence.read().await;
        let mut list: Vec<Evidence> = store
            .values()
            .filter(|e| e.submitter_id == user_id && e.is_author_context() && e.created_at >= since)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn get_user_contents(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Content>, BabelError> {
        let contents = self.contents.read().await;
        let mut list: Vec<Content> = contents
            .values()
            .filter(|c| c.author_id == user_id && c.created_at >= since)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn get_user_votes(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Vote>, BabelError> {
        let votes = self.votes.read().await;
        let mut list: Vec<Vote> = votes
            .values()
            .filter_map(|by_voter| by_voter.get(user_id))
            .filter(|v| v.cast_at >= since)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.cast_at.cmp(&b.cast_at));
        Ok(list)
    }

    async fn get_user_evidence(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Evidence>, BabelError> {
        let store = self.evidence.read().await;
        let mut list: Vec<Evidence> = store
            .values()
            .filter(|e| e.submitter_id == user_id && e.created_at >= since)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(list)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, BabelError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<(), BabelError> {
        let mut users = self.users.write().await;
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(BabelError::NotFound(format!("user {}", user.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_core::{Ballot, EvidenceKind, VoteKind};
    use chrono::Duration;

    fn vote(content: &str, voter: &str, kind: VoteKind, certainty: Option<u8>) -> Vote {
        Vote::from_ballot(content, voter, Ballot::new(kind, 1.0, certainty))
    }

    #[tokio::test]
    async fn test_revote_replaces() {
        let store = InMemoryStore::new();
        store.record_vote(&vote("c1", "u", VoteKind::Affirm, Some(1))).await.unwrap();
        store.record_vote(&vote("c1", "u", VoteKind::Deny, Some(3))).await.unwrap();
        store.record_vote(&vote("c1", "v", VoteKind::Upvote, None)).await.unwrap();

        let votes = store.get_content_votes("c1").await.unwrap();
        assert_eq!(votes.len(), 2);
        let mine: Vec<_> = votes.iter().filter(|v| v.voter_id == "u").collect();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].kind, VoteKind::Deny);
        assert_eq!(mine[0].certainty, Some(3));
    }

    #[tokio::test]
    async fn test_duplicate_content_rejected() {
        let store = InMemoryStore::new();
        let c = Content::new("c1", "alice", "post", "hi");
        store.create_content(&c).await.unwrap();
        assert!(matches!(
            store.create_content(&c).await,
            Err(BabelError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_update_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let mut a = Content::new("a", "alice", "post", "hi");
        store.create_content(&a).await.unwrap();

        a.truth_score = 0.9;
        let ghost = Content::new("ghost", "bob", "post", "boo");
        let result = store.update_content_batch(&[a.clone(), ghost]).await;
        assert!(matches!(result, Err(BabelError::NotFound(_))));
        let stored = store.get_content("a").await.unwrap().unwrap();
        assert_eq!(stored.truth_score, 0.0);

        store.update_content_batch(&[a]).await.unwrap();
        let stored = store.get_content("a").await.unwrap().unwrap();
        assert!((stored.truth_score - 0.9).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_user_contexts_filtered_by_time_and_submitter() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let make = |id: &str, submitter: &str, age_days: i64| Evidence {
            id: id.to_string(),
            content_id: "c1".to_string(),
            submitter_id: submitter.to_string(),
            content_author_id: submitter.to_string(),
            kind: EvidenceKind::AuthorContext,
            text: "ctx".to_string(),
            references: vec![],
            quality_score: 0.7,
            created_at: now - Duration::days(age_days),
        };
        store.create_evidence(&make("e1", "alice", 1)).await.unwrap();
        store.create_evidence(&make("e2", "alice", 40)).await.unwrap();
        store.create_evidence(&make("e3", "bob", 1)).await.unwrap();

        let recent = store
            .get_user_contexts("alice", now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "e1");
    }

    #[tokio::test]
    async fn test_create_context_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store.create_content(&Content::new("ctx1", "alice", "context", "taken")).await.unwrap();

        let evidence = Evidence {
            id: "e1".to_string(),
            content_id: "c1".to_string(),
            submitter_id: "alice".to_string(),
            content_author_id: "alice".to_string(),
            kind: EvidenceKind::AuthorContext,
            text: "ctx".to_string(),
            references: vec![],
            quality_score: 0.6,
            created_at: Utc::now(),
        };
        let clash = Content::new("ctx1", "alice", "context", "again");
        assert!(matches!(
            store.create_context(&clash, &evidence).await,
            Err(BabelError::AlreadyExists(_))
        ));
        assert!(store.evidence_for("c1").await.is_empty());

        let fresh = Content::new("ctx2", "alice", "context", "new");
        store.create_context(&fresh, &evidence).await.unwrap();
        assert_eq!(store.evidence_for("c1").await.len(), 1);
        assert!(store.get_content("ctx2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_activity_since() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        let mut old_post = Content::new("old", "alice", "post", "then");
        old_post.created_at = now - Duration::hours(3);
        store.create_content(&old_post).await.unwrap();
        store.create_content(&Content::new("new", "alice", "post", "now")).await.unwrap();
        store.create_content(&Content::new("other", "bob", "post", "hi")).await.unwrap();

        let mut stale = vote("old", "alice", VoteKind::Upvote, None);
        stale.cast_at = now - Duration::hours(3);
        store.record_vote(&stale).await.unwrap();
        store.record_vote(&vote("other", "alice", VoteKind::Affirm, Some(2))).await.unwrap();
        store.record_vote(&vote("other", "bob", VoteKind::Deny, Some(1))).await.unwrap();

        let since = now - Duration::hours(1);
        let contents = store.get_user_contents("alice", since).await.unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].id, "new");

        let votes = store.get_user_votes("alice", since).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].content_id, "other");
        assert!(store.get_user_evidence("alice", since).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_user_fails() {
        let store = InMemoryStore::new();
        assert!(store.update_user(&User::new("nobody")).await.is_err());
        assert!(store.ensure_user("alice").await);
        assert!(!store.ensure_user("alice").await);
        assert!(store.get_user("alice").await.unwrap().is_some());
    }
}
