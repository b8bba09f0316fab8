use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

#[derive(Deserialize, Validate, Default)]
pub struct OpenDeckRequest {
    #[validate(range(min = 1, message = "Pages start at 1"))]
    pub page: Option<u32>,
    #[validate(email(message = "Invalid email format"))]
    pub viewer_email: Option<String>,
    pub metadata: Option<Map<String, Value>>, // Forwarded to deck_viewed
}

#[derive(Serialize)]
pub struct OpenDeckResponse {
    pub visitor_id: String,
    pub session_id: Option<String>, // Absent when tracking is off
    pub preview: bool,
    pub tracking: bool,
}

#[derive(Deserialize)]
pub struct PageChangeRequest {
    pub session_id: String,
    pub page: u32,
}

#[derive(Deserialize)]
pub struct CloseSessionRequest {
    pub session_id: String,
}

/// Dwell measured by the client itself.
#[derive(Deserialize, Validate)]
pub struct DwellRequest {
    #[validate(range(min = 1, message = "Pages start at 1"))]
    pub page: u32,
    #[validate(range(min = 0.0, max = 86400.0, message = "time_spent out of range"))]
    pub time_spent: f64,
    #[validate(email(message = "Invalid email format"))]
    pub viewer_email: Option<String>,
}
