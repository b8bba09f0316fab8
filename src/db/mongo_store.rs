use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    Collection, Database, IndexModel,
    bson::{doc, oid::ObjectId},
    options::{IndexOptions, ReturnDocument},
};

use crate::db::store::AnalyticsStore;
use crate::error::{AnalyticsError, Result};
use crate::models::deck::Deck;
use crate::models::page_aggregate::{PageAggregate, PageDelta};
use crate::models::view_event::RawViewEvent;

pub struct MongoStore {
    db: Database,
    decks: Collection<Deck>,
    views: Collection<RawViewEvent>,
    aggregates: Collection<PageAggregate>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            decks: db.collection::<Deck>("decks"),
            views: db.collection::<RawViewEvent>("slide_views"),
            aggregates: db.collection::<PageAggregate>("slide_stats"),
        }
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = IndexOptions::builder().unique(true).build();

        self.decks
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "deck_id": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;
        self.decks
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "created_at": 1 })
                    .build(),
            )
            .await?;

        // Composite key the aggregate upsert resolves conflicts on
        self.aggregates
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "deck_id": 1, "page_number": 1 })
                    .options(unique)
                    .build(),
            )
            .await?;
        self.aggregates
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build())
            .await?;

        self.views
            .create_index(
                IndexModel::builder()
                    .keys(doc! {
                        "deck_id": 1,
                        "page_number": 1,
                        "visitor_id": 1,
                        "viewed_at": -1
                    })
                    .build(),
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for MongoStore {
    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn insert_deck(&self, deck: &Deck) -> Result<()> {
        self.decks.insert_one(deck).await?;
        Ok(())
    }

    async fn find_deck(&self, deck_id: &str) -> Result<Option<Deck>> {
        Ok(self.decks.find_one(doc! { "deck_id": deck_id }).await?)
    }

    async fn list_decks(&self, user_id: &str) -> Result<Vec<Deck>> {
        let cursor = self
            .decks
            .find(doc! { "user_id": user_id })
            .sort(doc! { "created_at": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_recent_view(
        &self,
        deck_id: &str,
        page_number: u32,
        visitor_id: &str,
        since: i64,
    ) -> Result<Option<RawViewEvent>> {
        let view = self
            .views
            .find_one(doc! {
                "deck_id": deck_id,
                "page_number": page_number as i64,
                "visitor_id": visitor_id,
                "viewed_at": { "$gte": since }
            })
            .sort(doc! { "viewed_at": -1 })
            .await?;
        Ok(view)
    }

    async fn insert_view(&self, event: &RawViewEvent) -> Result<()> {
        self.views.insert_one(event).await?;
        Ok(())
    }

    async fn add_view_time(&self, id: &ObjectId, seconds: f64) -> Result<()> {
        let result = self
            .views
            .update_one(doc! { "_id": *id }, doc! { "$inc": { "time_spent": seconds } })
            .await?;
        if result.matched_count == 0 {
            return Err(AnalyticsError::NotFound(format!("view {}", id.to_hex())));
        }
        Ok(())
    }

    async fn list_views(
        &self,
        deck_ids: &[String],
        since: Option<i64>,
    ) -> Result<Vec<RawViewEvent>> {
        if deck_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut filter = doc! { "deck_id": { "$in": deck_ids.to_vec() } };
        if let Some(since) = since {
            filter.insert("viewed_at", doc! { "$gte": since });
        }

        let cursor = self
            .views
            .find(filter)
            .sort(doc! { "viewed_at": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn increment_page_aggregate(
        &self,
        deck_id: &str,
        page_number: u32,
        user_id: &str,
        delta: PageDelta,
        now: i64,
    ) -> Result<PageAggregate> {
        // Server-side $inc keeps concurrent recorders from overwriting each other
        let updated = self
            .aggregates
            .find_one_and_update(
                doc! { "deck_id": deck_id, "page_number": page_number as i64 },
                doc! {
                    "$inc": {
                        "total_views": delta.views,
                        "total_time_seconds": delta.seconds
                    },
                    "$set": { "user_id": user_id, "updated_at": now }
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?;

        updated.ok_or_else(|| {
            AnalyticsError::Store(format!(
                "upsert of {}#{} returned no document",
                deck_id, page_number
            ))
        })
    }

    async fn list_page_aggregates(
        &self,
        user_id: &str,
        deck_id: Option<&str>,
    ) -> Result<Vec<PageAggregate>> {
        let mut filter = doc! { "user_id": user_id };
        if let Some(deck_id) = deck_id {
            filter.insert("deck_id", deck_id);
        }

        let cursor = self
            .aggregates
            .find(filter)
            .sort(doc! { "deck_id": 1, "page_number": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }
}
