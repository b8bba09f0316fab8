use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Running counters for one `(deck_id, page_number)`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PageAggregate {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub deck_id: String,
    pub page_number: u32,
    #[serde(default)]
    pub total_views: i64, // unique visitors, all time
    #[serde(default)]
    pub total_time_seconds: f64,
    pub user_id: String, // deck owner
    pub updated_at: i64,
}

/// Amount to add to a page's counters for one recorded dwell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDelta {
    pub views: i64,
    pub seconds: f64,
}

impl PageDelta {
    pub fn unique(seconds: f64) -> Self {
        Self { views: 1, seconds }
    }

    pub fn repeat(seconds: f64) -> Self {
        Self { views: 0, seconds }
    }
}
