use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::deck::Deck;

#[derive(Deserialize, Validate)]
pub struct CreateDeckRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[validate(range(min = 1, max = 1000, message = "page_count must be 1-1000"))]
    pub page_count: u32,
}

#[derive(Serialize)]
pub struct DeckResponse {
    pub deck_id: String,
    pub title: String,
    pub page_count: u32,
    pub created_at: i64,
}

impl From<Deck> for DeckResponse {
    fn from(deck: Deck) -> Self {
        Self {
            deck_id: deck.deck_id,
            title: deck.title,
            page_count: deck.page_count,
            created_at: deck.created_at,
        }
    }
}
