use actix_web::web;

use crate::handlers::deck_handlers::{create_deck, list_decks};
use crate::handlers::health_handlers::health_check;
use crate::handlers::stats_handlers::{
    get_daily_metrics, get_deck_stats, get_top_decks, get_total_stats,
};
use crate::handlers::view_handlers::{change_page, close_deck, open_deck, record_dwell};
use crate::middlewares::authmw::JwtAuth;

/// Configure the routes
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    // Viewer routes - anonymous, identified by the visitor cookie
    cfg.service(
        web::scope("/api/view/{deck_id}")
            .route("/open", web::post().to(open_deck))
            .route("/page", web::post().to(change_page))
            .route("/close", web::post().to(close_deck))
            .route("/dwell", web::post().to(record_dwell)),
    );
    cfg.route("/api/health/check", web::get().to(health_check));
    // Owner routes - require authentication
    cfg.service(
        web::scope("/api")
            .wrap(JwtAuth)
            .route("/decks", web::post().to(create_deck))
            .route("/decks", web::get().to(list_decks))
            .route("/decks/{deck_id}/stats", web::get().to(get_deck_stats))
            .service(
                web::scope("/stats")
                    .route("/totals", web::get().to(get_total_stats))
                    .route("/top", web::get().to(get_top_decks))
                    .route("/daily", web::get().to(get_daily_metrics)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::cookie::Cookie;
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, test, web};
    use serde_json::{Value, json};

    use super::init_routes;
    use crate::config::AppConfig;
    use crate::db::memory_store::MemoryStore;
    use crate::db::store::AnalyticsStore;
    use crate::models::deck::Deck;
    use crate::state::app_state::AppState;
    use crate::utils::clock::SystemClock;
    use crate::utils::jwt::create_token;
    use crate::utils::visitor_id::VISITOR_COOKIE;

    const SECRET: &str = "route-test-secret";

    async fn state_with_deck(owner: &str, pages: u32) -> (web::Data<AppState>, String) {
        let config = AppConfig::from_lookup(|key| match key {
            "ANALYTICS_STORE" => Some("memory".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();
        let store = Arc::new(MemoryStore::default());
        let deck = Deck::new(owner.into(), "Seed round".into(), pages, 0);
        store.insert_deck(&deck).await.unwrap();

        let (state, _signals) = AppState::build(store, Arc::new(SystemClock), &config);
        (web::Data::new(state), deck.deck_id)
    }

    fn bearer(user_id: &str) -> (header::HeaderName, String) {
        (
            header::AUTHORIZATION,
            format!("Bearer {}", create_token(user_id, SECRET).unwrap()),
        )
    }

    #[actix_web::test]
    async fn owner_routes_require_a_token() {
        let (state, _deck_id) = state_with_deck("owner", 3).await;
        let app = test::init_service(App::new().app_data(state).configure(init_routes)).await;

        let req = test::TestRequest::get().uri("/api/stats/totals").to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/stats/totals")
            .insert_header((header::AUTHORIZATION, "Bearer not-a-token"))
            .to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn health_check_is_public() {
        let (state, _deck_id) = state_with_deck("owner", 3).await;
        let app = test::init_service(App::new().app_data(state).configure(init_routes)).await;

        let req = test::TestRequest::get().uri("/api/health/check").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success"], true);
        assert_eq!(body["open_sessions"], 0);
        assert_eq!(body["capture_enabled"], false);
    }

    #[actix_web::test]
    async fn create_and_list_decks() {
        let (state, _deck_id) = state_with_deck("owner", 3).await;
        let app = test::init_service(App::new().app_data(state).configure(init_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/decks")
            .insert_header(bearer("alice"))
            .set_json(json!({ "title": "Q3 update", "page_count": 12 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/decks")
            .insert_header(bearer("alice"))
            .set_json(json!({ "title": "", "page_count": 0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri("/api/decks")
            .insert_header(bearer("alice"))
            .to_request();
        let decks: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(decks.as_array().unwrap().len(), 1);
        assert_eq!(decks[0]["title"], "Q3 update");
        assert_eq!(decks[0]["page_count"], 12);
    }

    #[actix_web::test]
    async fn open_issues_visitor_cookie_once() {
        let (state, deck_id) = state_with_deck("owner", 3).await;
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(init_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/open", deck_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let visitor_id = resp
            .response()
            .cookies()
            .find(|c| c.name() == VISITOR_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap();
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["visitor_id"], visitor_id.as_str());
        assert_eq!(body["preview"], false);
        assert_eq!(body["tracking"], true);
        assert!(body["session_id"].is_string());
        assert_eq!(state.sessions.len(), 1);

        // Returning visitor keeps the id and gets no new cookie
        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/open", deck_id))
            .cookie(Cookie::new(VISITOR_COOKIE, visitor_id.clone()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.response().cookies().next().is_none());
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["visitor_id"], visitor_id.as_str());
        // A second tab gets its own session
        assert_eq!(state.sessions.len(), 2);
    }

    #[actix_web::test]
    async fn viewer_routes_reject_unknown_deck_and_session() {
        let (state, deck_id) = state_with_deck("owner", 3).await;
        let app = test::init_service(App::new().app_data(state).configure(init_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/view/missing/open")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/page", deck_id))
            .set_json(json!({ "session_id": "unknown", "page": 2 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/close", deck_id))
            .set_json(json!({ "session_id": "unknown" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::post()
            .uri("/api/view/missing/dwell")
            .set_json(json!({ "page": 1, "time_spent": 4.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/dwell", deck_id))
            .set_json(json!({ "page": 9, "time_spent": 4.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn page_and_close_follow_the_session_id() {
        let (state, deck_id) = state_with_deck("owner", 3).await;
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(init_routes),
        )
        .await;
        let visitor = Cookie::new(VISITOR_COOKIE, "7c0b8f55-2f0a-4a57-9d8c-7b2d3c2f4e10");

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/open", deck_id))
            .cookie(visitor.clone())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/page", deck_id))
            .cookie(visitor.clone())
            .set_json(json!({ "session_id": session_id, "page": 2 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/close", deck_id))
            .cookie(visitor)
            .set_json(json!({ "session_id": session_id }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.sessions.len(), 0);
    }

    #[actix_web::test]
    async fn owner_preview_is_flagged() {
        let (state, deck_id) = state_with_deck("owner", 3).await;
        let app = test::init_service(App::new().app_data(state).configure(init_routes)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/open", deck_id))
            .insert_header(bearer("owner"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["preview"], true);

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/open", deck_id))
            .insert_header(bearer("someone-else"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["preview"], false);
    }

    #[actix_web::test]
    async fn owner_dwell_is_not_recorded() {
        let (state, deck_id) = state_with_deck("owner", 3).await;
        let app = test::init_service(App::new().app_data(state).configure(init_routes)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/view/{}/dwell", deck_id))
            .insert_header(bearer("owner"))
            .set_json(json!({ "page": 1, "time_spent": 30.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let req = test::TestRequest::get()
            .uri(&format!("/api/decks/{}/stats", deck_id))
            .insert_header(bearer("owner"))
            .to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["total_views"], 0);
        assert_eq!(stats["total_time_seconds"], 0.0);
    }

    #[actix_web::test]
    async fn dwell_reports_reach_owner_stats() {
        let (state, deck_id) = state_with_deck("owner", 3).await;
        let app = test::init_service(App::new().app_data(state).configure(init_routes)).await;
        let visitor = Cookie::new(VISITOR_COOKIE, "7c0b8f55-2f0a-4a57-9d8c-7b2d3c2f4e10");

        for (page, time_spent) in [(1, 15.0), (2, 20.0), (2, 0.2)] {
            let req = test::TestRequest::post()
                .uri(&format!("/api/view/{}/dwell", deck_id))
                .cookie(visitor.clone())
                .set_json(json!({ "page": page, "time_spent": time_spent }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::ACCEPTED);
        }

        let req = test::TestRequest::get()
            .uri(&format!("/api/decks/{}/stats", deck_id))
            .insert_header(bearer("owner"))
            .to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["total_views"], 2);
        assert_eq!(stats["total_time_seconds"], 35.0);
        assert_eq!(stats["pages"].as_array().unwrap().len(), 3);
        assert_eq!(stats["pages"][2]["views"], 0);

        let req = test::TestRequest::get()
            .uri(&format!("/api/decks/{}/stats", deck_id))
            .insert_header(bearer("intruder"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/stats/top?limit=500")
            .insert_header(bearer("owner"))
            .to_request();
        let top: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(top[0]["deck_id"], deck_id.as_str());
        assert_eq!(top[0]["visitors"], 1);
    }
}
