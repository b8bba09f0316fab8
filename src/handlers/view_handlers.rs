use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder, Result, web};
use validator::Validate;

use crate::error::AnalyticsError;
use crate::middlewares::authmw::verified_claims;
use crate::models::deck::Deck;
use crate::services::recorder::SlideView;
use crate::services::tracker::{MIN_DWELL_SECONDS, ViewerContext};
use crate::state::app_state::AppState;
use crate::structs::view_request::{
    CloseSessionRequest, DwellRequest, OpenDeckRequest, OpenDeckResponse, PageChangeRequest,
};
use crate::utils::visitor_id::VisitorIdentity;

fn with_identity(mut builder: HttpResponseBuilder, identity: &VisitorIdentity) -> HttpResponseBuilder {
    if let Some(cookie) = identity.cookie() {
        builder.cookie(cookie);
    }
    builder
}

/// The deck owner looking at their own deck.
fn is_owner_preview(req: &HttpRequest, app_state: &AppState, deck: &Deck) -> bool {
    verified_claims(req, &app_state.jwt_secret).is_some_and(|claims| deck.is_owned_by(&claims.sub))
}

/// Start a deck-view session
pub async fn open_deck(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: Option<web::Json<OpenDeckRequest>>,
) -> Result<HttpResponse> {
    let deck_id = path.into_inner();
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    if let Err(errors) = body.validate() {
        return Ok(HttpResponse::BadRequest().json(errors));
    }
    let identity = VisitorIdentity::from_request(&req);

    let deck = match app_state.store.find_deck(&deck_id).await {
        Ok(Some(deck)) => deck,
        Ok(None) => return Err(AnalyticsError::NotFound(format!("deck {}", deck_id)).into()),
        Err(e) => {
            // Viewing goes on without tracking
            log::error!("Deck lookup for {} failed: {}", deck_id, e);
            return Ok(with_identity(HttpResponse::Ok(), &identity).json(OpenDeckResponse {
                visitor_id: identity.id.clone(),
                session_id: None,
                preview: false,
                tracking: false,
            }));
        }
    };

    let preview = is_owner_preview(&req, &app_state, &deck);
    let ctx = ViewerContext {
        deck_id: deck.deck_id.clone(),
        visitor_id: identity.id.clone(),
        viewer_email: body.viewer_email.clone(),
        page_count: deck.page_count,
        preview,
    };
    let session_id = app_state.sessions.open(ctx, body.page.unwrap_or(1))?;

    if !preview {
        app_state
            .capture
            .track_deck_view(&deck.deck_id, &identity.id, body.metadata);
    }

    Ok(with_identity(HttpResponse::Ok(), &identity).json(OpenDeckResponse {
        visitor_id: identity.id.clone(),
        session_id: Some(session_id),
        preview,
        tracking: true,
    }))
}

/// Move an open session to another page
pub async fn change_page(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    web::Json(body): web::Json<PageChangeRequest>,
) -> Result<HttpResponse> {
    let deck_id = path.into_inner();
    let identity = VisitorIdentity::from_request(&req);

    app_state
        .sessions
        .navigate(&identity.id, &deck_id, &body.session_id, body.page)?;

    Ok(with_identity(HttpResponse::NoContent(), &identity).finish())
}

/// End a session; the open page is flushed
pub async fn close_deck(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    web::Json(body): web::Json<CloseSessionRequest>,
) -> HttpResponse {
    let deck_id = path.into_inner();
    let identity = VisitorIdentity::from_request(&req);

    if !app_state
        .sessions
        .close(&identity.id, &deck_id, &body.session_id)
    {
        log::debug!("close for {} without an open session", deck_id);
    }

    with_identity(HttpResponse::NoContent(), &identity).finish()
}

/// Record a dwell the client measured itself
pub async fn record_dwell(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    web::Json(body): web::Json<DwellRequest>,
) -> Result<HttpResponse> {
    if let Err(errors) = body.validate() {
        return Ok(HttpResponse::BadRequest().json(errors));
    }
    let deck_id = path.into_inner();
    let identity = VisitorIdentity::from_request(&req);
    let accepted = with_identity(HttpResponse::Accepted(), &identity).finish();

    if body.time_spent <= MIN_DWELL_SECONDS {
        return Ok(accepted);
    }

    let deck = match app_state.store.find_deck(&deck_id).await {
        Ok(Some(deck)) => deck,
        Ok(None) => return Err(AnalyticsError::NotFound(format!("deck {}", deck_id)).into()),
        Err(e) => {
            log::error!("Deck lookup for {} failed; dwell dropped: {}", deck_id, e);
            return Ok(accepted);
        }
    };
    if !deck.has_page(body.page) {
        return Err(AnalyticsError::InvalidInput(format!(
            "page {} outside 1..={}",
            body.page, deck.page_count
        ))
        .into());
    }
    if is_owner_preview(&req, &app_state, &deck) {
        return Ok(accepted);
    }

    app_state
        .capture
        .track_page_view(&deck.deck_id, &identity.id, body.page, body.time_spent);
    app_state
        .recorder
        .sync_slide_stats(SlideView {
            deck_id: deck.deck_id,
            page_number: body.page,
            visitor_id: identity.id.clone(),
            time_spent: body.time_spent,
            viewer_email: body.viewer_email,
        })
        .await;

    Ok(accepted)
}
