use actix_web::{HttpResponse, web};

use crate::state::app_state::AppState;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    // Perform a simple ping against the backing store
    let ping_result = state.store.ping().await;

    match ping_result {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "open_sessions": state.sessions.len(),
            "capture_enabled": state.capture.is_enabled()
        })),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({
            "success": false,
            "error": format!("Store unavailable: {}", e)
        })),
    }
}
