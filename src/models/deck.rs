use mongodb::bson::oid::ObjectId;
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Deck {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub deck_id: String,
    pub user_id: String, // Owner
    pub title: String,
    pub page_count: u32,
    pub created_at: i64,
}

impl Deck {
    pub fn new(user_id: String, title: String, page_count: u32, created_at: i64) -> Self {
        Self {
            id: None,
            deck_id: nanoid!(10),
            user_id,
            title,
            page_count,
            created_at,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn has_page(&self, page_number: u32) -> bool {
        (1..=self.page_count).contains(&page_number)
    }
}
