use actix_web::{HttpRequest, HttpResponse, Result, web};
use validator::Validate;

use crate::error::AnalyticsError;
use crate::middlewares::authmw::current_user_id;
use crate::models::deck::Deck;
use crate::state::app_state::AppState;
use crate::structs::deck_request::{CreateDeckRequest, DeckResponse};

/// Register a rendered deck for analytics
pub async fn create_deck(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    web::Json(body): web::Json<CreateDeckRequest>,
) -> Result<HttpResponse> {
    if let Err(errors) = body.validate() {
        return Ok(HttpResponse::BadRequest().json(errors));
    }
    let user_id = current_user_id(&req).ok_or(AnalyticsError::NotAuthenticated)?;

    let deck = Deck::new(
        user_id,
        body.title,
        body.page_count,
        app_state.clock.now_millis(),
    );
    app_state.store.insert_deck(&deck).await?;
    log::info!("Registered deck {} ({} pages)", deck.deck_id, deck.page_count);

    Ok(HttpResponse::Created().json(DeckResponse::from(deck)))
}

pub async fn list_decks(app_state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let user_id = current_user_id(&req).ok_or(AnalyticsError::NotAuthenticated)?;

    let decks: Vec<DeckResponse> = app_state
        .store
        .list_decks(&user_id)
        .await?
        .into_iter()
        .map(DeckResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(decks))
}
