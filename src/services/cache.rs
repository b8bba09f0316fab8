use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::error::{AnalyticsError, Result};
use crate::models::tier::RetentionTier;
use crate::services::retry::RetryPolicy;
use crate::utils::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    DeckStats,
    Totals,
    Daily,
    TopDecks,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::DeckStats => write!(f, "deck-stats"),
            QueryKind::Totals => write!(f, "totals"),
            QueryKind::Daily => write!(f, "daily"),
            QueryKind::TopDecks => write!(f, "top-decks"),
        }
    }
}

/// Time-to-live per query kind.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub page_stats: Duration,
    pub totals: Duration,
    pub rollups: Duration,
}

impl CacheTtls {
    pub fn ttl(&self, kind: QueryKind) -> Duration {
        match kind {
            QueryKind::DeckStats => self.page_stats,
            QueryKind::Totals => self.totals,
            QueryKind::Daily | QueryKind::TopDecks => self.rollups,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            page_stats: Duration::from_secs(120),
            totals: Duration::from_secs(30),
            rollups: Duration::from_secs(60),
        }
    }
}

/// Identity of a dashboard query, built from its semantic parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: QueryKind,
    params: String,
}

impl CacheKey {
    pub fn deck_stats(deck_id: &str, tier: RetentionTier, user_id: Option<&str>) -> Self {
        Self {
            kind: QueryKind::DeckStats,
            params: format!("{}:{}:{}", deck_id, tier, user_id.unwrap_or("-")),
        }
    }

    pub fn totals(user_id: &str, deck_id: Option<&str>) -> Self {
        Self {
            kind: QueryKind::Totals,
            params: format!("{}:{}", user_id, deck_id.unwrap_or("*")),
        }
    }

    pub fn daily(user_id: &str, deck_id: Option<&str>) -> Self {
        Self {
            kind: QueryKind::Daily,
            params: format!("{}:{}", user_id, deck_id.unwrap_or("*")),
        }
    }

    pub fn top_decks(user_id: &str, limit: usize) -> Self {
        Self {
            kind: QueryKind::TopDecks,
            params: format!("{}:{}", user_id, limit),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.params)
    }
}

type Payload = Arc<dyn Any + Send + Sync>;
type PendingFetch = Shared<BoxFuture<'static, Result<Payload>>>;

struct CacheEntry {
    data: Payload,
    timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct CacheState {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    pending: Mutex<HashMap<CacheKey, PendingFetch>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn evict_expired(
    entries: &mut HashMap<CacheKey, CacheEntry>,
    ttls: &CacheTtls,
    now: DateTime<Utc>,
) {
    entries.retain(|key, entry| {
        chrono::Duration::from_std(ttls.ttl(key.kind))
            .is_ok_and(|ttl| now.signed_duration_since(entry.timestamp) < ttl)
    });
}

/// TTL cache in front of dashboard queries with at most one fetch in flight per key.
#[derive(Clone)]
pub struct QueryCache {
    state: Arc<CacheState>,
    clock: Arc<dyn Clock>,
    ttls: CacheTtls,
    retry: RetryPolicy,
}

impl QueryCache {
    pub fn new(clock: Arc<dyn Clock>, ttls: CacheTtls, retry: RetryPolicy) -> Self {
        Self {
            state: Arc::new(CacheState::default()),
            clock,
            ttls,
            retry,
        }
    }

    /// Return the cached value for `key`, join a fetch already in flight, or start one.
    ///
    /// `fetch` is invoked once per retry attempt. With `force_refresh` the cached
    /// value is ignored but an in-flight fetch is still joined.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        key: CacheKey,
        force_refresh: bool,
        fetch: F,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if !force_refresh {
            if let Some(value) = self.fresh::<T>(&key) {
                log::debug!("cache hit {}", key);
                return Ok(value);
            }
        }

        let payload = self.join_or_start(&key, fetch).await?;
        payload.downcast_ref::<T>().cloned().ok_or_else(|| {
            AnalyticsError::Store(format!("cached value for {} has an unexpected type", key))
        })
    }

    fn fresh<T: Clone + 'static>(&self, key: &CacheKey) -> Option<T> {
        let entries = lock(&self.state.entries);
        let entry = entries.get(key)?;
        let ttl = chrono::Duration::from_std(self.ttls.ttl(key.kind)).ok()?;
        if self.clock.now().signed_duration_since(entry.timestamp) >= ttl {
            return None;
        }
        entry.data.downcast_ref::<T>().cloned()
    }

    fn join_or_start<T, F, Fut>(&self, key: &CacheKey, fetch: F) -> PendingFetch
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut pending = lock(&self.state.pending);
        if let Some(in_flight) = pending.get(key) {
            log::debug!("joining in-flight fetch {}", key);
            return in_flight.clone();
        }

        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let ttls = self.ttls;
        let retry = self.retry;
        let owned_key = key.clone();

        let fetch_task = async move {
            let label = owned_key.to_string();
            let result = retry
                .run(&label, fetch)
                .await
                .map(|value| Arc::new(value) as Payload);

            if let Ok(data) = &result {
                let now = clock.now();
                let mut entries = lock(&state.entries);
                evict_expired(&mut entries, &ttls, now);
                entries.insert(
                    owned_key.clone(),
                    CacheEntry {
                        data: Arc::clone(data),
                        timestamp: now,
                    },
                );
            }
            // Cleared on success and failure alike so the next call starts fresh.
            // Blocks until the caller below has registered this fetch.
            lock(&state.pending).remove(&owned_key);
            result
        };

        // Runs to completion even when every waiter goes away
        let handle = tokio::spawn(fetch_task);
        let state = Arc::clone(&self.state);
        let owned_key = key.clone();
        let fetch_once = async move {
            handle.await.unwrap_or_else(|e| {
                lock(&state.pending).remove(&owned_key);
                Err(AnalyticsError::Store(format!("fetch {} aborted: {}", owned_key, e)))
            })
        }
        .boxed()
        .shared();

        pending.insert(key.clone(), fetch_once.clone());
        fetch_once
    }
}
