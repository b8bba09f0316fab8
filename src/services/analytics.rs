use std::sync::Arc;

use chrono::Duration;

use crate::db::store::AnalyticsStore;
use crate::error::{AnalyticsError, Result};
use crate::models::tier::RetentionTier;
use crate::services::cache::{CacheKey, QueryCache};
use crate::services::metrics::{self, DailyMetrics, DeckStats, TopDeck, TotalStats};
use crate::utils::clock::Clock;

fn require_user(user_id: Option<&str>) -> Result<String> {
    match user_id {
        Some(id) if !id.trim().is_empty() => Ok(id.to_string()),
        _ => Err(AnalyticsError::NotAuthenticated),
    }
}

/// Cached dashboard queries for deck owners.
#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn AnalyticsStore>,
    cache: QueryCache,
    clock: Arc<dyn Clock>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn AnalyticsStore>, cache: QueryCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache,
            clock,
        }
    }

    /// Per-page counters for one deck. When `user_id` is given the deck must belong to it.
    pub async fn get_deck_stats(
        &self,
        deck_id: &str,
        tier: RetentionTier,
        user_id: Option<&str>,
        force_refresh: bool,
    ) -> Result<DeckStats> {
        let key = CacheKey::deck_stats(deck_id, tier, user_id);
        let store = self.store.clone();
        let clock = self.clock.clone();
        let deck_id = deck_id.to_string();
        let user_id = user_id.map(str::to_string);

        self.cache
            .get_or_fetch(key, force_refresh, move || {
                load_deck_stats(
                    store.clone(),
                    clock.clone(),
                    deck_id.clone(),
                    tier,
                    user_id.clone(),
                )
            })
            .await
    }

    pub async fn get_user_total_stats(
        &self,
        user_id: Option<&str>,
        deck_id: Option<&str>,
        force_refresh: bool,
    ) -> Result<TotalStats> {
        let user_id = require_user(user_id)?;
        let key = CacheKey::totals(&user_id, deck_id);
        let store = self.store.clone();
        let deck_id = deck_id.map(str::to_string);

        self.cache
            .get_or_fetch(key, force_refresh, move || {
                load_totals(store.clone(), user_id.clone(), deck_id.clone())
            })
            .await
    }

    pub async fn get_top_performing_decks(
        &self,
        user_id: Option<&str>,
        limit: usize,
        force_refresh: bool,
    ) -> Result<Vec<TopDeck>> {
        let user_id = require_user(user_id)?;
        let key = CacheKey::top_decks(&user_id, limit);
        let store = self.store.clone();

        self.cache
            .get_or_fetch(key, force_refresh, move || {
                load_top_decks(store.clone(), user_id.clone(), limit)
            })
            .await
    }

    pub async fn get_daily_metrics(
        &self,
        user_id: Option<&str>,
        deck_id: Option<&str>,
        force_refresh: bool,
    ) -> Result<DailyMetrics> {
        let user_id = require_user(user_id)?;
        let key = CacheKey::daily(&user_id, deck_id);
        let store = self.store.clone();
        let clock = self.clock.clone();
        let deck_id = deck_id.map(str::to_string);

        self.cache
            .get_or_fetch(key, force_refresh, move || {
                load_daily(store.clone(), clock.clone(), user_id.clone(), deck_id.clone())
            })
            .await
    }
}

async fn load_deck_stats(
    store: Arc<dyn AnalyticsStore>,
    clock: Arc<dyn Clock>,
    deck_id: String,
    tier: RetentionTier,
    user_id: Option<String>,
) -> Result<DeckStats> {
    let deck = store
        .find_deck(&deck_id)
        .await?
        .ok_or_else(|| AnalyticsError::NotFound(format!("deck {}", deck_id)))?;
    if let Some(user_id) = &user_id {
        if !deck.is_owned_by(user_id) {
            return Err(AnalyticsError::Forbidden(format!("deck {}", deck_id)));
        }
    }

    let aggregates = store
        .list_page_aggregates(&deck.user_id, Some(&deck.deck_id))
        .await?;
    let since = (clock.now() - Duration::days(tier.retention_days())).timestamp_millis();
    let recent_views = store
        .list_views(std::slice::from_ref(&deck.deck_id), Some(since))
        .await?;

    Ok(metrics::deck_stats(&deck, tier, &aggregates, &recent_views))
}

/// Ids of the user's decks, narrowed to `deck_id` when given.
async fn owned_deck_ids(
    store: &dyn AnalyticsStore,
    user_id: &str,
    deck_id: Option<&str>,
) -> Result<Vec<String>> {
    Ok(store
        .list_decks(user_id)
        .await?
        .into_iter()
        .map(|d| d.deck_id)
        .filter(|id| deck_id.is_none_or(|wanted| wanted == id.as_str()))
        .collect())
}

async fn load_totals(
    store: Arc<dyn AnalyticsStore>,
    user_id: String,
    deck_id: Option<String>,
) -> Result<TotalStats> {
    let aggregates = store
        .list_page_aggregates(&user_id, deck_id.as_deref())
        .await?;
    let deck_ids = owned_deck_ids(store.as_ref(), &user_id, deck_id.as_deref()).await?;
    let views = store.list_views(&deck_ids, None).await?;

    Ok(metrics::compute_totals(&aggregates, &views))
}

async fn load_top_decks(
    store: Arc<dyn AnalyticsStore>,
    user_id: String,
    limit: usize,
) -> Result<Vec<TopDeck>> {
    let decks = store.list_decks(&user_id).await?;
    let aggregates = store.list_page_aggregates(&user_id, None).await?;
    let deck_ids: Vec<String> = decks.iter().map(|d| d.deck_id.clone()).collect();
    let views = store.list_views(&deck_ids, None).await?;

    Ok(metrics::rank_top_decks(&decks, &aggregates, &views, limit))
}

async fn load_daily(
    store: Arc<dyn AnalyticsStore>,
    clock: Arc<dyn Clock>,
    user_id: String,
    deck_id: Option<String>,
) -> Result<DailyMetrics> {
    let today = clock.now().date_naive();
    let deck_ids = owned_deck_ids(store.as_ref(), &user_id, deck_id.as_deref()).await?;
    let views = store
        .list_views(&deck_ids, Some(metrics::daily_window_since(today)))
        .await?;

    Ok(metrics::daily_metrics(&views, today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_store::MemoryStore;
    use crate::models::deck::Deck;
    use crate::models::page_aggregate::{PageAggregate, PageDelta};
    use crate::models::view_event::RawViewEvent;
    use crate::services::cache::CacheTtls;
    use crate::services::recorder::{SlideView, ViewRecorder};
    use crate::services::retry::RetryPolicy;
    use crate::utils::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use mongodb::bson::oid::ObjectId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to a `MemoryStore` and counts reads.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        reads: AtomicUsize,
    }

    impl CountingStore {
        fn read(&self) {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnalyticsStore for CountingStore {
        async fn ping(&self) -> Result<()> {
            self.inner.ping().await
        }

        async fn insert_deck(&self, deck: &Deck) -> Result<()> {
            self.inner.insert_deck(deck).await
        }

        async fn find_deck(&self, deck_id: &str) -> Result<Option<Deck>> {
            self.read();
            self.inner.find_deck(deck_id).await
        }

        async fn list_decks(&self, user_id: &str) -> Result<Vec<Deck>> {
            self.read();
            self.inner.list_decks(user_id).await
        }

        async fn find_recent_view(
            &self,
            deck_id: &str,
            page_number: u32,
            visitor_id: &str,
            since: i64,
        ) -> Result<Option<RawViewEvent>> {
            self.inner
                .find_recent_view(deck_id, page_number, visitor_id, since)
                .await
        }

        async fn insert_view(&self, event: &RawViewEvent) -> Result<()> {
            self.inner.insert_view(event).await
        }

        async fn add_view_time(&self, id: &ObjectId, seconds: f64) -> Result<()> {
            self.inner.add_view_time(id, seconds).await
        }

        async fn list_views(
            &self,
            deck_ids: &[String],
            since: Option<i64>,
        ) -> Result<Vec<RawViewEvent>> {
            self.read();
            self.inner.list_views(deck_ids, since).await
        }

        async fn increment_page_aggregate(
            &self,
            deck_id: &str,
            page_number: u32,
            user_id: &str,
            delta: PageDelta,
            now: i64,
        ) -> Result<PageAggregate> {
            self.inner
                .increment_page_aggregate(deck_id, page_number, user_id, delta, now)
                .await
        }

        async fn list_page_aggregates(
            &self,
            user_id: &str,
            deck_id: Option<&str>,
        ) -> Result<Vec<PageAggregate>> {
            self.read();
            self.inner.list_page_aggregates(user_id, deck_id).await
        }
    }

    struct Fixture {
        service: AnalyticsService,
        recorder: ViewRecorder,
        store: Arc<CountingStore>,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(CountingStore::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 16, 15, 0, 0).unwrap(),
        ));
        for (id, owner, created_at) in [("alpha", "u1", 1), ("beta", "u1", 2), ("other", "u2", 3)] {
            let mut deck = Deck::new(owner.into(), id.to_uppercase(), 4, created_at);
            deck.deck_id = id.into();
            store.insert_deck(&deck).await.unwrap();
        }

        let cache = QueryCache::new(
            clock.clone(),
            CacheTtls::default(),
            RetryPolicy::new(2, std::time::Duration::from_millis(5)),
        );
        Fixture {
            service: AnalyticsService::new(store.clone(), cache, clock.clone()),
            recorder: ViewRecorder::new(store.clone(), clock.clone()),
            store,
            clock,
        }
    }

    async fn view(f: &Fixture, deck: &str, page: u32, visitor: &str, seconds: f64) {
        f.recorder
            .sync_slide_stats(SlideView {
                deck_id: deck.into(),
                page_number: page,
                visitor_id: visitor.into(),
                time_spent: seconds,
                viewer_email: None,
            })
            .await;
    }

    #[tokio::test]
    async fn dashboard_queries_require_a_user() {
        let f = fixture().await;

        assert!(matches!(
            f.service.get_user_total_stats(None, None, false).await,
            Err(AnalyticsError::NotAuthenticated)
        ));
        assert!(matches!(
            f.service.get_daily_metrics(Some(""), None, false).await,
            Err(AnalyticsError::NotAuthenticated)
        ));
        assert!(matches!(
            f.service.get_top_performing_decks(None, 5, false).await,
            Err(AnalyticsError::NotAuthenticated)
        ));
        assert_eq!(f.store.reads(), 0);
    }

    #[tokio::test]
    async fn repeated_deck_stats_within_ttl_read_store_once() {
        let f = fixture().await;
        view(&f, "alpha", 1, "v1", 10.0).await;
        let before = f.store.reads();

        let first = f
            .service
            .get_deck_stats("alpha", RetentionTier::Free, Some("u1"), false)
            .await
            .unwrap();
        let reads_for_one = f.store.reads() - before;
        let second = f
            .service
            .get_deck_stats("alpha", RetentionTier::Free, Some("u1"), false)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(f.store.reads() - before, reads_for_one);
        assert_eq!(first.pages[0].views, 1);
        assert_eq!(first.pages.len(), 4);
    }

    #[tokio::test]
    async fn deck_stats_check_ownership() {
        let f = fixture().await;

        assert!(matches!(
            f.service
                .get_deck_stats("other", RetentionTier::Free, Some("u1"), false)
                .await,
            Err(AnalyticsError::Forbidden(_))
        ));
        assert!(matches!(
            f.service
                .get_deck_stats("nope", RetentionTier::Free, Some("u1"), false)
                .await,
            Err(AnalyticsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn totals_and_top_decks_reflect_recorded_views() {
        let f = fixture().await;
        view(&f, "alpha", 1, "v1", 10.0).await;
        view(&f, "beta", 1, "v1", 3.0).await;
        view(&f, "beta", 2, "v2", 4.0).await;
        view(&f, "beta", 1, "v1", 1.0).await;
        view(&f, "other", 1, "v9", 50.0).await;

        let totals = f
            .service
            .get_user_total_stats(Some("u1"), None, false)
            .await
            .unwrap();
        assert_eq!(totals.total_time_seconds, 18.0);
        assert_eq!(totals.unique_visitors, 3);

        let beta = f
            .service
            .get_user_total_stats(Some("u1"), Some("beta"), false)
            .await
            .unwrap();
        assert_eq!(beta.total_time_seconds, 8.0);
        assert_eq!(beta.unique_visitors, 2);

        let top = f
            .service
            .get_top_performing_decks(Some("u1"), 1, false)
            .await
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].deck_id, "beta");
        assert_eq!(top[0].visitors, 2);
    }

    #[tokio::test]
    async fn daily_metrics_cache_until_refresh() {
        let f = fixture().await;
        view(&f, "alpha", 1, "v1", 10.0).await;

        let first = f
            .service
            .get_daily_metrics(Some("u1"), None, false)
            .await
            .unwrap();
        assert_eq!(first.visits[6], 1);
        assert_eq!(first.labels[6], "Fri");

        f.clock.advance_millis(1_000);
        view(&f, "alpha", 2, "v2", 5.0).await;

        let cached = f
            .service
            .get_daily_metrics(Some("u1"), None, false)
            .await
            .unwrap();
        assert_eq!(cached, first);

        let refreshed = f
            .service
            .get_daily_metrics(Some("u1"), None, true)
            .await
            .unwrap();
        assert_eq!(refreshed.visits[6], 2);
        assert_eq!(refreshed.time_spent[6], 15.0);
    }
}
