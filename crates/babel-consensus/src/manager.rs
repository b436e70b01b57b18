// crates/babel-consensus/src/manager.rs
//
// ConsensusManager: the orchestration point between clients, the store, the
// score cache, the analysis service, and the event sink.
//
// Request-path operations (submit, record_vote, add_context, get) never wait
// on the analysis service. Recomputation of buffered items happens in
// `process_batch`, driven by the background batch loop or by `flush`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use babel_core::error::BabelError;
use babel_core::traits::{AnalysisService, ContentStore, EventSink};
use babel_core::{
    AnalysisItem, BatchAnalysisRequest, BatchAnalysisResponse, ConsensusInfo, ConsensusSource,
    Content, Event, EventKind, Evidence, EvidenceKind, ProcessingStatus, User, UserActivity,
    UserActivityRequest, UserScores, Vote, CONTEXT_CONTENT_TYPE,
};
use babel_reputation::{
    context::context_window_start, context_engagement_bonus, context_quality_aggregate,
    reputation_score, RecencyDecay,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::batch::{BatchConfig, BatchQueue};
use crate::cache::ScoreCache;
use crate::scoring;

/// Engagement bump per unit of (decayed) context truth after a batch pass.
const CONTEXT_ENGAGEMENT_FACTOR: f64 = 0.1;

/// Tunables for the Consensus Manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub batch: BatchConfig,
    pub cache_ttl: Duration,
    /// Upper bound on one analysis round-trip.
    pub analysis_timeout: Duration,
    /// Minimum time between two activity analyses of the same user.
    pub user_refresh_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            cache_ttl: Duration::from_secs(300),
            analysis_timeout: Duration::from_secs(30),
            user_refresh_interval: Duration::from_secs(60),
        }
    }
}

/// Author-supplied context for one of the author's own content items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSubmission {
    /// Id for the resulting context content item; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    /// Supporting references or media URLs.
    #[serde(default)]
    pub references: Vec<String>,
}

pub struct ConsensusManager {
    store: Arc<dyn ContentStore>,
    analysis: Arc<dyn AnalysisService>,
    events: Arc<dyn EventSink>,
    cache: Arc<ScoreCache>,
    queue: Arc<BatchQueue>,
    config: ManagerConfig,
}

impl ConsensusManager {
    pub fn new(
        store: Arc<dyn ContentStore>,
        analysis: Arc<dyn AnalysisService>,
        events: Arc<dyn EventSink>,
        config: ManagerConfig,
    ) -> Self {
        let cache = Arc::new(ScoreCache::new(config.cache_ttl));
        let queue = Arc::new(BatchQueue::new(config.batch));
        Self {
            store,
            analysis,
            events,
            cache,
            queue,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<ScoreCache> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<BatchQueue> {
        &self.queue
    }

    /// Start the batch flush loop and the cache sweeper.
    pub fn spawn_background(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let manager = Arc::clone(self);
        let batch_loop = tokio::spawn(async move { manager.run_batch_loop().await });
        let sweeper = tokio::spawn(Arc::clone(&self.cache).run_sweeper());
        vec![batch_loop, sweeper]
    }

    /// Flush batches as they become due, forever.
    pub async fn run_batch_loop(self: Arc<Self>) {
        tracing::info!(
            "Batch loop started (quiescence={:?}, max_delay={:?}, max_items={})",
            self.config.batch.quiescence,
            self.config.batch.max_delay,
            self.config.batch.max_items
        );
        loop {
            let ids = self.queue.next_batch().await;
            let batch_size = ids.len();
            if let Err(e) = self.process_batch(ids).await {
                tracing::error!(operation = "process_batch", batch_size, error = %e, "Batch dropped");
            }
        }
    }

    /// Process whatever is buffered right now. Returns the number of items
    /// that completed.
    pub async fn flush(&self) -> Result<usize, BabelError> {
        let ids = self.queue.take_all().await;
        if ids.is_empty() {
            return Ok(0);
        }
        self.process_batch(ids).await
    }

    /// Accept a new content item and queue it for scoring.
    pub async fn submit(&self, mut content: Content) -> Result<Content, BabelError> {
        content.validate()?;

        let now = Utc::now();
        content.truth_score = 0.0;
        content.visibility_score = babel_core::content::DEFAULT_VISIBILITY;
        content.consensus = ConsensusInfo::from_score(0.0);
        content.processing_status = ProcessingStatus::Pending;
        content.scores_computed_at = None;
        content.hash = Some(content.compute_hash());
        content.created_at = now;
        content.updated_at = now;

        self.store.create_content(&content).await.map_err(|e| {
            tracing::error!(operation = "submit", content_id = %content.id, error = %e, "Failed to persist content");
            e
        })?;
        let buffered = self.queue.enqueue(&content.id).await;

        tracing::info!(content_id = %content.id, author_id = %content.author_id, buffered, "Content submitted");

        self.emit(Event::broadcast(
            EventKind::ContentUpdate,
            json!({ "action": "created", "content": &content }),
        ))
        .await;

        Ok(content)
    }

    /// Record (or replace) a user's vote on a content item.
    pub async fn record_vote(
        &self,
        content_id: &str,
        voter_id: &str,
        ballot: babel_core::Ballot,
    ) -> Result<Vote, BabelError> {
        ballot.validate()?;
        if voter_id.trim().is_empty() {
            return Err(BabelError::Validation("voter ID is required".to_string()));
        }
        let content = self
            .store
            .get_content(content_id)
            .await?
            .ok_or_else(|| BabelError::NotFound(format!("content {}", content_id)))?;

        let vote = Vote::from_ballot(content_id, voter_id, ballot);
        self.store.record_vote(&vote).await.map_err(|e| {
            tracing::error!(operation = "record_vote", content_id, user_id = voter_id, error = %e, "Failed to persist vote");
            e
        })?;
        self.cache.invalidate_content(&[content_id]).await;
        self.queue.enqueue(content_id).await;

        tracing::debug!(content_id, user_id = voter_id, kind = %vote.kind, "Vote recorded");

        self.emit(Event::to_user(
            &content.author_id,
            EventKind::ContentVote,
            json!({
                "content_id": content_id,
                "voter_id": voter_id,
                "vote_type": vote.kind,
                "certainty": vote.certainty,
                "weight": vote.weight,
            }),
        ))
        .await;

        match self.store.get_content_votes(content_id).await {
            Ok(votes) => {
                let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
                for v in &votes {
                    *counts.entry(v.kind.as_str()).or_default() += 1;
                }
                self.emit(Event::broadcast(
                    EventKind::VoteCountUpdate,
                    json!({ "content_id": content_id, "counts": counts, "total": votes.len() }),
                ))
                .await;
            }
            Err(e) => {
                tracing::warn!(operation = "vote_counts", content_id, error = %e, "Skipping count update");
            }
        }

        Ok(vote)
    }

    /// Attach author context to one of the author's own content items.
    ///
    /// Returns the new context content item.
    pub async fn add_context(
        &self,
        parent_id: &str,
        author_id: &str,
        submission: ContextSubmission,
    ) -> Result<Content, BabelError> {
        if submission.text.trim().is_empty() {
            return Err(BabelError::Validation("context text is required".to_string()));
        }
        // The boost applies to the parent's current score, not the last
        // persisted batch result.
        let mut parent = self.get(parent_id).await?;
        if parent.author_id != author_id {
            return Err(BabelError::Forbidden(
                "only the content author can add context".to_string(),
            ));
        }

        let now = Utc::now();
        let quality = scoring::context_quality(&submission.text, submission.references.len());
        let context_id = submission
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        if self.store.get_content(&context_id).await?.is_some() {
            return Err(BabelError::AlreadyExists(format!("content {}", context_id)));
        }

        let mut context = Content::new(&context_id, author_id, CONTEXT_CONTENT_TYPE, &submission.text);
        context.parent_id = Some(parent_id.to_string());
        context.is_context = true;
        context.media_urls = submission.references.clone();
        context.apply_scores(quality, babel_core::content::DEFAULT_VISIBILITY, now);
        context.hash = Some(context.compute_hash());

        let evidence = Evidence {
            id: Uuid::now_v7().to_string(),
            content_id: parent_id.to_string(),
            submitter_id: author_id.to_string(),
            content_author_id: parent.author_id.clone(),
            kind: EvidenceKind::AuthorContext,
            text: submission.text,
            references: submission.references,
            quality_score: quality,
            created_at: now,
        };

        // Parent first: if it cannot be written, nothing else is.
        let previous = parent.clone();
        let boosted = scoring::boost_truth_with_context(parent.truth_score, quality);
        parent.truth_score = boosted;
        parent.consensus = ConsensusInfo::from_score(boosted);
        parent.updated_at = now;
        self.store.update_content(&parent).await.map_err(|e| {
            tracing::error!(operation = "add_context", content_id = parent_id, error = %e, "Failed to update parent");
            e
        })?;

        if let Err(e) = self.store.create_context(&context, &evidence).await {
            tracing::error!(operation = "add_context", content_id = parent_id, context_id = %context.id, error = %e, "Failed to persist context");
            if let Err(restore) = self.store.update_content(&previous).await {
                tracing::error!(operation = "add_context", content_id = parent_id, error = %restore, "Failed to restore parent");
            }
            return Err(e);
        }
        self.cache
            .set_content(parent_id, boosted, parent.visibility_score, now)
            .await;

        if let Err(e) = self.refresh_context_quality(author_id, now).await {
            tracing::warn!(operation = "context_quality", user_id = author_id, error = %e, "Failed to update context aggregate");
        }

        self.queue.enqueue(&context.id).await;

        tracing::info!(
            "Context {} added to {} (quality={:.3}, parent truth={:.3})",
            context.id,
            parent_id,
            quality,
            boosted
        );

        self.emit(Event::to_user(
            &parent.author_id,
            EventKind::NotifyEvidence,
            json!({
                "content_id": parent_id,
                "context_id": &context.id,
                "quality_score": quality,
                "truth_score": boosted,
            }),
        ))
        .await;
        self.emit(Event::broadcast(
            EventKind::ContentEvidence,
            json!({ "parent_id": parent_id, "context": &context, "parent_truth_score": boosted }),
        ))
        .await;

        Ok(context)
    }

    /// Content with current scores: cached if fresh, recomputed from votes
    /// otherwise.
    pub async fn get(&self, content_id: &str) -> Result<Content, BabelError> {
        let mut content = self
            .store
            .get_content(content_id)
            .await?
            .ok_or_else(|| BabelError::NotFound(format!("content {}", content_id)))?;

        if let Some((cached, true)) = self.cache.get_content(content_id).await {
            content.truth_score = cached.truth_score;
            content.visibility_score = cached.visibility_score;
            content.consensus = cached.consensus;
            content.scores_computed_at = Some(cached.computed_at);
            return Ok(content);
        }

        let votes = self.store.get_content_votes(content_id).await?;
        let now = Utc::now();
        let (truth, visibility) = recompute_scores(&content, &votes, now);
        self.cache.set_content(content_id, truth, visibility, now).await;
        content.apply_scores(truth, visibility, now);
        tracing::trace!(content_id, truth, visibility, "Recomputed scores on read");
        Ok(content)
    }

    /// A user's sub-scores and reputation.
    pub async fn user_scores(&self, user_id: &str) -> Result<UserScores, BabelError> {
        if let Some((scores, true)) = self.cache.get_user(user_id).await {
            return Ok(scores);
        }
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| BabelError::NotFound(format!("user {}", user_id)))?;
        let scores = UserScores::from(&user);
        self.cache.set_user(scores.clone()).await;
        Ok(scores)
    }

    /// Re-derive a user's sub-scores from their activity since the last
    /// analysis, then recompute reputation.
    ///
    /// Skipped (current scores returned) while the cached scores are fresh or
    /// the last analysis is younger than `user_refresh_interval`.
    pub async fn refresh_user_scores(&self, user_id: &str) -> Result<UserScores, BabelError> {
        if let Some((scores, true)) = self.cache.get_user(user_id).await {
            return Ok(scores);
        }
        let mut user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| BabelError::NotFound(format!("user {}", user_id)))?;

        let now = Utc::now();
        let since = user.last_active;
        let due = (now - since)
            .to_std()
            .map(|age| age >= self.config.user_refresh_interval)
            .unwrap_or(false);
        if !due {
            tracing::trace!(user_id, "User analysis throttled");
            return Ok(UserScores::from(&user));
        }

        let activities = self
            .store
            .get_user_contents(user_id, since)
            .await?
            .iter()
            .map(UserActivity::from)
            .collect();
        let votes = self.store.get_user_votes(user_id, since).await?;
        let evidence = self.store.get_user_evidence(user_id, since).await?;
        let request = UserActivityRequest::incremental(&user, activities, votes, evidence, now);

        let response = match tokio::time::timeout(
            self.config.analysis_timeout,
            self.analysis.analyze_user(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BabelError::Timeout(format!(
                "user analysis of {} exceeded {:?}",
                user_id, self.config.analysis_timeout
            ))),
        }
        .map_err(|e| {
            tracing::warn!(operation = "analyze_user", user_id, error = %e, "User analysis failed");
            e
        })?;
        if !response.is_success() {
            return Err(BabelError::Analysis(format!(
                "user analysis failed: {}",
                response.error.as_deref().unwrap_or("unknown error")
            )));
        }

        let previous = user.reputation_score;
        if let Some(fresh) = response.scores {
            user.scores.merge(fresh);
        }
        user.reputation_score = reputation_score(&user.scores);
        user.last_active = now;
        self.persist_user(&user, previous).await?;

        let scores = UserScores::from(&user);
        self.cache.set_user(scores.clone()).await;
        tracing::debug!(user_id, reputation = scores.reputation_score, "User scores refreshed");
        Ok(scores)
    }

    /// Recompute a set of buffered items in one pass.
    ///
    /// Items move `pending -> processing` (persisted) before analysis. Any
    /// collaborator failure after that point drops the whole batch and moves
    /// every item in it to `failed` on a best-effort basis.
    pub async fn process_batch(&self, ids: Vec<String>) -> Result<usize, BabelError> {
        let batch_size = ids.len();
        tracing::debug!(batch_size, "Processing batch");

        let (loaded, unloaded, load_error) = self.load_batch(ids).await;

        let mut items: Vec<(Content, Vec<Vote>)> = Vec::with_capacity(loaded.len());
        for (mut content, votes) in loaded {
            match begin_processing(&mut content.processing_status) {
                Ok(()) => items.push((content, votes)),
                Err(e) => {
                    tracing::warn!(content_id = %content.id, error = %e, "Skipping item");
                }
            }
        }
        let processing: Vec<Content> = items.iter().map(|(content, _)| content.clone()).collect();

        if !processing.is_empty() {
            if let Err(e) = self.store.update_content_batch(&processing).await {
                tracing::error!(operation = "mark_processing", batch_size = processing.len(), error = %e, "Failed to persist batch status");
                self.mark_failed(processing, unloaded).await;
                return Err(e);
            }
        }

        if let Some(e) = load_error {
            tracing::error!(operation = "load_batch", batch_size, unloaded = unloaded.len(), error = %e, "Failed to load batch");
            self.mark_failed(processing, unloaded).await;
            return Err(e);
        }
        if items.is_empty() {
            return Ok(0);
        }

        let request = BatchAnalysisRequest::new(
            items
                .iter()
                .map(|(content, votes)| analysis_item(content, votes))
                .collect(),
        );
        let response = match self.analyze(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(operation = "analyze_batch", batch_size = items.len(), error = %e, "Analysis failed");
                self.mark_failed(processing, Vec::new()).await;
                return Err(e);
            }
        };

        let now = Utc::now();
        let mut updated = Vec::with_capacity(items.len());
        for (mut content, votes) in items {
            let (truth, visibility) = recompute_scores(&content, &votes, now);
            content.apply_scores(truth, visibility, now);
            if let Some(result) = response.results.get(&content.id) {
                content.topics = result.topics.clone();
                content.entities = result.entities.clone();
                content.suggested_truth = result.truth_contribution;
            }
            content.processing_status.transition(ProcessingStatus::Completed)?;
            content.updated_at = now;
            updated.push(content);
        }

        if let Err(e) = self.store.update_content_batch(&updated).await {
            tracing::error!(operation = "update_content_batch", batch_size = updated.len(), error = %e, "Failed to persist batch");
            self.mark_failed(processing, Vec::new()).await;
            return Err(e);
        }

        for content in &updated {
            let cached = self
                .cache
                .set_content(&content.id, content.truth_score, content.visibility_score, now)
                .await;
            self.emit(Event::broadcast(
                EventKind::ConsensusUpdate,
                json!({
                    "content_id": &content.id,
                    "truth_score": cached.truth_score,
                    "visibility_score": cached.visibility_score,
                    "consensus": &cached.consensus,
                    "topics": &content.topics,
                    "scores_computed_at": cached.computed_at,
                    "version": cached.version,
                }),
            ))
            .await;
        }

        self.refresh_authors(&updated, now).await;

        tracing::info!(batch_size = updated.len(), "Batch completed");
        Ok(updated.len())
    }

    /// Fetch every buffered item and its votes in parallel, in queue order.
    ///
    /// Returns the loaded items, the ids that could not be loaded, and the
    /// first load error. Ids whose content no longer exists are dropped.
    async fn load_batch(
        &self,
        ids: Vec<String>,
    ) -> (Vec<(Content, Vec<Vote>)>, Vec<String>, Option<BabelError>) {
        let mut loader = JoinSet::new();
        for (index, id) in ids.iter().cloned().enumerate() {
            let store = Arc::clone(&self.store);
            loader.spawn(async move {
                let loaded = async {
                    let content = store.get_content(&id).await?;
                    let votes = store.get_content_votes(&id).await?;
                    Ok::<_, BabelError>((content, votes))
                }
                .await;
                (index, id, loaded)
            });
        }

        let mut accounted = HashSet::new();
        let mut loaded = Vec::with_capacity(ids.len());
        let mut first_error = None;
        while let Some(joined) = loader.join_next().await {
            match joined {
                Ok((index, _, Ok((Some(content), votes)))) => {
                    accounted.insert(index);
                    loaded.push((index, content, votes));
                }
                Ok((index, id, Ok((None, _)))) => {
                    accounted.insert(index);
                    tracing::warn!(content_id = %id, "Buffered content no longer exists");
                }
                Ok((_, id, Err(e))) => {
                    tracing::warn!(content_id = %id, error = %e, "Failed to load buffered item");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(BabelError::Storage(format!("batch load task failed: {}", e)));
                }
            }
        }
        loaded.sort_by_key(|(index, _, _)| *index);

        let unloaded = ids
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !accounted.contains(index))
            .map(|(_, id)| id)
            .collect();
        let loaded = loaded
            .into_iter()
            .map(|(_, content, votes)| (content, votes))
            .collect();
        (loaded, unloaded, first_error)
    }

    async fn analyze(&self, request: &BatchAnalysisRequest) -> Result<BatchAnalysisResponse, BabelError> {
        match tokio::time::timeout(self.config.analysis_timeout, self.analysis.analyze_batch(request)).await {
            Ok(result) => result,
            Err(_) => Err(BabelError::Timeout(format!(
                "analysis of {} items exceeded {:?}",
                request.items.len(),
                self.config.analysis_timeout
            ))),
        }
    }

    /// Move every item of a dropped batch to `failed`. Items that could not
    /// be loaded with the batch are re-read individually.
    async fn mark_failed(&self, mut contents: Vec<Content>, unloaded: Vec<String>) {
        for id in unloaded {
            match self.store.get_content(&id).await {
                Ok(Some(content)) => contents.push(content),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(operation = "mark_failed", content_id = %id, error = %e, "Cannot reload item to mark failed");
                }
            }
        }

        let mut failed = Vec::with_capacity(contents.len());
        for mut content in contents {
            match fail_processing(&mut content.processing_status) {
                Ok(true) => failed.push(content),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(content_id = %content.id, error = %e, "Cannot mark item failed");
                }
            }
        }
        if failed.is_empty() {
            return;
        }
        if let Err(e) = self.store.update_content_batch(&failed).await {
            tracing::warn!(operation = "mark_failed", batch_size = failed.len(), error = %e, "Failed to persist failed status");
        }
    }

    /// Apply context engagement bumps and recompute reputation for every
    /// author in a completed batch.
    async fn refresh_authors(&self, completed: &[Content], now: DateTime<Utc>) {
        let mut bumps: HashMap<&str, f64> = HashMap::new();
        for content in completed {
            let entry = bumps.entry(content.author_id.as_str()).or_insert(0.0);
            if content.is_context {
                let decay = RecencyDecay::CONTEXT.factor(content.created_at, now);
                *entry += content.truth_score * decay * CONTEXT_ENGAGEMENT_FACTOR;
            }
        }

        for (author_id, bump) in bumps {
            match self.refresh_user_scores(author_id).await {
                Ok(_) | Err(BabelError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(operation = "refresh_user_scores", user_id = author_id, error = %e, "Keeping previous sub-scores");
                }
            }

            let user = match self.store.get_user(author_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    tracing::trace!(user_id = author_id, "Author has no user record");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(operation = "get_user", user_id = author_id, error = %e, "Skipping reputation refresh");
                    continue;
                }
            };
            let mut user = user;
            let previous = user.reputation_score;
            if bump > 0.0 {
                let engagement = user.scores.engagement_quality.unwrap_or(0.0);
                user.scores.engagement_quality = Some((engagement + bump).min(1.0));
            }
            user.reputation_score = reputation_score(&user.scores);

            let changed = (user.reputation_score - previous).abs() > f64::EPSILON;
            if !changed && bump <= 0.0 {
                continue;
            }
            if let Err(e) = self.persist_user(&user, previous).await {
                tracing::warn!(operation = "update_user", user_id = author_id, error = %e, "Failed to refresh reputation");
            }
        }
    }

    /// Recompute the user's 30-day context aggregate and engagement bonus.
    async fn refresh_context_quality(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), BabelError> {
        let Some(mut user) = self.store.get_user(user_id).await? else {
            tracing::debug!(user_id, "No user record for context author");
            return Ok(());
        };
        let previous = user.reputation_score;

        let contexts = self
            .store
            .get_user_contexts(user_id, context_window_start(now))
            .await?;
        let aggregate = context_quality_aggregate(&contexts, now);
        user.context_quality = aggregate;
        if let Some(aggregate) = aggregate {
            let bonus = context_engagement_bonus(aggregate, contexts.len());
            let engagement = user.scores.engagement_quality.unwrap_or(0.0);
            user.scores.engagement_quality = Some((engagement + bonus).min(1.0));
        }
        user.reputation_score = reputation_score(&user.scores);

        self.persist_user(&user, previous).await
    }

    /// Persist a user, refresh its cache entry, and notify it when its
    /// reputation moved.
    async fn persist_user(&self, user: &User, previous_reputation: f64) -> Result<(), BabelError> {
        self.store.update_user(user).await?;
        self.cache.invalidate_users(&[user.id.as_str()]).await;

        if (user.reputation_score - previous_reputation).abs() > f64::EPSILON {
            tracing::debug!(
                user_id = %user.id,
                "Reputation {:.4} -> {:.4}",
                previous_reputation,
                user.reputation_score
            );
            self.emit(Event::to_user(
                &user.id,
                EventKind::NotifyReputation,
                json!({
                    "user_id": &user.id,
                    "reputation_score": user.reputation_score,
                    "previous_score": previous_reputation,
                    "scores": UserScores::from(user),
                }),
            ))
            .await;
        }
        Ok(())
    }

    /// Publish an event; delivery failures are logged, never returned.
    async fn emit(&self, event: Event) {
        let kind = event.kind;
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(event = ?kind, error = %e, "Event dropped");
        }
    }
}

/// Move an item into `Processing`, re-opening completed items first.
fn begin_processing(status: &mut ProcessingStatus) -> Result<(), BabelError> {
    if *status == ProcessingStatus::Completed {
        status.transition(ProcessingStatus::Pending)?;
    }
    status.transition(ProcessingStatus::Processing)
}

/// Move an item into `Failed` through `Processing`. Returns `false` for items
/// that are already failed.
fn fail_processing(status: &mut ProcessingStatus) -> Result<bool, BabelError> {
    match *status {
        ProcessingStatus::Failed => Ok(false),
        ProcessingStatus::Processing => status.transition(ProcessingStatus::Failed).map(|_| true),
        _ => {
            begin_processing(status)?;
            status.transition(ProcessingStatus::Failed).map(|_| true)
        }
    }
}

/// Truth and visibility for an item from its current votes.
///
/// A context item with no truth votes keeps the quality-derived truth it was
/// created with.
fn recompute_scores(content: &Content, votes: &[Vote], now: DateTime<Utc>) -> (f64, f64) {
    let has_truth_votes = votes.iter().any(|v| v.kind.is_truth_vote());
    let truth = if content.is_context && !has_truth_votes {
        content.truth_score
    } else {
        scoring::truth_score(votes, now)
    };
    (truth, scoring::visibility_score(votes, now))
}

fn analysis_item(content: &Content, votes: &[Vote]) -> AnalysisItem {
    AnalysisItem {
        content_id: content.id.clone(),
        author_id: content.author_id.clone(),
        content_type: content.content_type.clone(),
        text: content.text.clone(),
        media_urls: content.media_urls.clone(),
        sources: votes
            .iter()
            .map(|v| ConsensusSource {
                user_id: v.voter_id.clone(),
                vote_value: scoring::vote_value(v.kind, v.certainty),
                timestamp: v.cast_at.timestamp(),
                weight: v.weight,
            })
            .collect(),
        previous_consensus_score: content.consensus.score,
    }
}
