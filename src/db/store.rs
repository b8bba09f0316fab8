use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::error::Result;
use crate::models::deck::Deck;
use crate::models::page_aggregate::{PageAggregate, PageDelta};
use crate::models::view_event::RawViewEvent;

/// Backing store for decks, the raw view log and per-page aggregates.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn insert_deck(&self, deck: &Deck) -> Result<()>;

    async fn find_deck(&self, deck_id: &str) -> Result<Option<Deck>>;

    /// Decks owned by `user_id`, oldest first.
    async fn list_decks(&self, user_id: &str) -> Result<Vec<Deck>>;

    /// Most recent view row for the key with `viewed_at >= since`.
    async fn find_recent_view(
        &self,
        deck_id: &str,
        page_number: u32,
        visitor_id: &str,
        since: i64,
    ) -> Result<Option<RawViewEvent>>;

    async fn insert_view(&self, event: &RawViewEvent) -> Result<()>;

    /// Add `seconds` to an existing row's `time_spent`.
    async fn add_view_time(&self, id: &ObjectId, seconds: f64) -> Result<()>;

    /// View rows for any of `deck_ids`, optionally limited to `viewed_at >= since`,
    /// ordered by `viewed_at`.
    async fn list_views(&self, deck_ids: &[String], since: Option<i64>)
    -> Result<Vec<RawViewEvent>>;

    /// Atomically add `delta` to the aggregate keyed by `(deck_id, page_number)`,
    /// creating it when absent. Returns the row after the update.
    async fn increment_page_aggregate(
        &self,
        deck_id: &str,
        page_number: u32,
        user_id: &str,
        delta: PageDelta,
        now: i64,
    ) -> Result<PageAggregate>;

    async fn list_page_aggregates(
        &self,
        user_id: &str,
        deck_id: Option<&str>,
    ) -> Result<Vec<PageAggregate>>;
}
