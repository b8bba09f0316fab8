use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::db::store::AnalyticsStore;
use crate::error::{AnalyticsError, Result};
use crate::models::deck::Deck;
use crate::models::page_aggregate::{PageAggregate, PageDelta};
use crate::models::view_event::RawViewEvent;

#[derive(Default)]
struct Tables {
    decks: Vec<Deck>,
    views: Vec<RawViewEvent>,
    aggregates: Vec<PageAggregate>,
}

/// Process-local store with the same semantics as `MongoStore`.
///
/// Used for local runs (`ANALYTICS_STORE=memory`) and tests; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_deck(&self, deck: &Deck) -> Result<()> {
        let mut tables = self.tables();
        if tables.decks.iter().any(|d| d.deck_id == deck.deck_id) {
            return Err(AnalyticsError::Store(format!(
                "duplicate deck id {}",
                deck.deck_id
            )));
        }
        let mut deck = deck.clone();
        deck.id.get_or_insert_with(ObjectId::new);
        tables.decks.push(deck);
        Ok(())
    }

    async fn find_deck(&self, deck_id: &str) -> Result<Option<Deck>> {
        Ok(self
            .tables()
            .decks
            .iter()
            .find(|d| d.deck_id == deck_id)
            .cloned())
    }

    async fn list_decks(&self, user_id: &str) -> Result<Vec<Deck>> {
        let mut decks: Vec<Deck> = self
            .tables()
            .decks
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        decks.sort_by_key(|d| d.created_at);
        Ok(decks)
    }

    async fn find_recent_view(
        &self,
        deck_id: &str,
        page_number: u32,
        visitor_id: &str,
        since: i64,
    ) -> Result<Option<RawViewEvent>> {
        Ok(self
            .tables()
            .views
            .iter()
            .filter(|v| {
                v.deck_id == deck_id
                    && v.page_number == page_number
                    && v.visitor_id == visitor_id
                    && v.viewed_at >= since
            })
            .max_by_key(|v| v.viewed_at)
            .cloned())
    }

    async fn insert_view(&self, event: &RawViewEvent) -> Result<()> {
        let mut event = event.clone();
        event.id.get_or_insert_with(ObjectId::new);
        self.tables().views.push(event);
        Ok(())
    }

    async fn add_view_time(&self, id: &ObjectId, seconds: f64) -> Result<()> {
        let mut tables = self.tables();
        let view = tables
            .views
            .iter_mut()
            .find(|v| v.id.as_ref() == Some(id))
            .ok_or_else(|| AnalyticsError::NotFound(format!("view {}", id.to_hex())))?;
        view.time_spent += seconds;
        Ok(())
    }

    async fn list_views(
        &self,
        deck_ids: &[String],
        since: Option<i64>,
    ) -> Result<Vec<RawViewEvent>> {
        let mut views: Vec<RawViewEvent> = self
            .tables()
            .views
            .iter()
            .filter(|v| deck_ids.contains(&v.deck_id))
            .filter(|v| since.is_none_or(|since| v.viewed_at >= since))
            .cloned()
            .collect();
        views.sort_by_key(|v| v.viewed_at);
        Ok(views)
    }

    async fn increment_page_aggregate(
        &self,
        deck_id: &str,
        page_number: u32,
        user_id: &str,
        delta: PageDelta,
        now: i64,
    ) -> Result<PageAggregate> {
        let mut tables = self.tables();
        let position = tables
            .aggregates
            .iter()
            .position(|a| a.deck_id == deck_id && a.page_number == page_number);

        let aggregate = match position {
            Some(index) => &mut tables.aggregates[index],
            None => {
                tables.aggregates.push(PageAggregate {
                    id: Some(ObjectId::new()),
                    deck_id: deck_id.to_string(),
                    page_number,
                    total_views: 0,
                    total_time_seconds: 0.0,
                    user_id: user_id.to_string(),
                    updated_at: now,
                });
                let last = tables.aggregates.len() - 1;
                &mut tables.aggregates[last]
            }
        };

        aggregate.total_views += delta.views;
        aggregate.total_time_seconds += delta.seconds;
        aggregate.user_id = user_id.to_string();
        aggregate.updated_at = now;
        Ok(aggregate.clone())
    }

    async fn list_page_aggregates(
        &self,
        user_id: &str,
        deck_id: Option<&str>,
    ) -> Result<Vec<PageAggregate>> {
        let mut aggregates: Vec<PageAggregate> = self
            .tables()
            .aggregates
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter(|a| deck_id.is_none_or(|id| a.deck_id == id))
            .cloned()
            .collect();
        aggregates.sort_by(|a, b| {
            a.deck_id
                .cmp(&b.deck_id)
                .then(a.page_number.cmp(&b.page_number))
        });
        Ok(aggregates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increment_creates_then_accumulates() {
        let store = MemoryStore::default();

        let first = store
            .increment_page_aggregate("d1", 1, "owner", PageDelta::unique(10.0), 1)
            .await
            .unwrap();
        assert_eq!(first.total_views, 1);
        assert_eq!(first.total_time_seconds, 10.0);

        let second = store
            .increment_page_aggregate("d1", 1, "owner", PageDelta::repeat(5.0), 2)
            .await
            .unwrap();
        assert_eq!(second.total_views, 1);
        assert_eq!(second.total_time_seconds, 15.0);
        assert_eq!(second.updated_at, 2);

        let rows = store.list_page_aggregates("owner", None).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn find_recent_view_respects_window_start() {
        let store = MemoryStore::default();
        store
            .insert_view(&RawViewEvent::new(
                "d1".into(),
                1,
                "v1".into(),
                1_000,
                3.0,
                None,
            ))
            .await
            .unwrap();

        assert!(
            store
                .find_recent_view("d1", 1, "v1", 1_000)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_recent_view("d1", 1, "v1", 1_001)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_recent_view("d1", 2, "v1", 0)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn list_views_filters_by_deck_and_since() {
        let store = MemoryStore::default();
        for (deck, at) in [("d1", 10), ("d2", 20), ("d1", 30), ("d3", 40)] {
            store
                .insert_view(&RawViewEvent::new(
                    deck.into(),
                    1,
                    "v".into(),
                    at,
                    1.0,
                    None,
                ))
                .await
                .unwrap();
        }

        let views = store
            .list_views(&["d1".to_string(), "d2".to_string()], Some(15))
            .await
            .unwrap();
        let stamps: Vec<i64> = views.iter().map(|v| v.viewed_at).collect();
        assert_eq!(stamps, vec![20, 30]);

        assert!(store.list_views(&[], None).await.unwrap().is_empty());
    }
}
