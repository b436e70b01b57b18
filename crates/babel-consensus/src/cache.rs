// crates/babel-consensus/src/cache.rs
//
// Short-TTL score cache shared by the request path and the batch path.
//
// Freshness is checked on every read, so a stale entry is never reported as
// fresh even if the sweeper has not run yet. The sweeper only bounds memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use babel_core::{ConsensusInfo, UserScores};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Memoized scores of one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedScores {
    pub truth_score: f64,
    pub visibility_score: f64,
    pub consensus: ConsensusInfo,
    /// Wall-clock time of the vote snapshot these scores came from.
    pub computed_at: DateTime<Utc>,
    /// Cache-wide write counter; a larger version is a later write.
    pub version: u64,
}

struct Entry<V> {
    value: V,
    last_updated: Instant,
}

/// A string-keyed map whose entries go stale after a fixed TTL.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a key. The flag is `true` while the entry is younger than the TTL.
    pub async fn get(&self, key: &str) -> Option<(V, bool)> {
        let entries = self.entries.read().await;
        entries.get(key).map(|entry| {
            let fresh = entry.last_updated.elapsed() < self.ttl;
            (entry.value.clone(), fresh)
        })
    }

    /// Insert or replace a value, restarting its TTL.
    pub async fn set(&self, key: impl Into<String>, value: V) {
        self.entries.write().await.insert(
            key.into(),
            Entry {
                value,
                last_updated: Instant::now(),
            },
        );
    }

    /// Drop the given keys. Missing keys are ignored.
    pub async fn invalidate(&self, keys: &[&str]) {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(*key);
        }
    }

    /// Remove every entry older than the TTL. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_updated.elapsed() < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Per-content and per-user score caches with one TTL.
pub struct ScoreCache {
    ttl: Duration,
    content: TtlCache<CachedScores>,
    users: TtlCache<UserScores>,
    next_version: AtomicU64,
}

impl ScoreCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            content: TtlCache::new(ttl),
            users: TtlCache::new(ttl),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get_content(&self, content_id: &str) -> Option<(CachedScores, bool)> {
        self.content.get(content_id).await
    }

    /// Cache scores for a content item, stamping them with a new version.
    pub async fn set_content(
        &self,
        content_id: &str,
        truth_score: f64,
        visibility_score: f64,
        computed_at: DateTime<Utc>,
    ) -> CachedScores {
        let scores = CachedScores {
            truth_score,
            visibility_score,
            consensus: ConsensusInfo::from_score(truth_score),
            computed_at,
            version: self.next_version.fetch_add(1, Ordering::Relaxed),
        };
        self.content.set(content_id, scores.clone()).await;
        scores
    }

    pub async fn invalidate_content(&self, content_ids: &[&str]) {
        self.content.invalidate(content_ids).await;
    }

    pub async fn get_user(&self, user_id: &str) -> Option<(UserScores, bool)> {
        self.users.get(user_id).await
    }

    pub async fn set_user(&self, scores: UserScores) {
        let key = scores.user_id.clone();
        self.users.set(key, scores).await;
    }

    pub async fn invalidate_users(&self, user_ids: &[&str]) {
        self.users.invalidate(user_ids).await;
    }

    /// Sweep both maps once.
    pub async fn sweep(&self) -> usize {
        self.content.sweep().await + self.users.sweep().await
    }

    /// Sweep expired entries every TTL until the task is aborted.
    pub async fn run_sweeper(self: Arc<Self>) {
        let period = self.ttl.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let removed = self.sweep().await;
            if removed > 0 {
                tracing::debug!(removed, "Score cache sweep evicted expired entries");
            }
        }
    }
}
