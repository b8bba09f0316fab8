use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// One row of the raw view log: a visitor's dwell on a deck page.
///
/// Repeat dwells by the same visitor inside the dedup window accumulate into
/// `time_spent` on the existing row instead of creating a new one.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RawViewEvent {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub deck_id: String,
    pub page_number: u32,
    pub visitor_id: String,
    pub viewed_at: i64,  // epoch millis of the first dwell in the window
    pub time_spent: f64, // seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_email: Option<String>,
}

impl RawViewEvent {
    pub fn new(
        deck_id: String,
        page_number: u32,
        visitor_id: String,
        viewed_at: i64,
        time_spent: f64,
        viewer_email: Option<String>,
    ) -> Self {
        Self {
            id: None,
            deck_id,
            page_number,
            visitor_id,
            viewed_at,
            time_spent,
            viewer_email,
        }
    }
}
