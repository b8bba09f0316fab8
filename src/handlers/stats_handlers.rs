use actix_web::{HttpRequest, HttpResponse, Result, web};

use crate::middlewares::authmw::current_user_id;
use crate::state::app_state::AppState;
use crate::structs::stats_query::{DeckStatsParams, RollupParams, TopDecksParams};

/// Per-page stats for one of the caller's decks
pub async fn get_deck_stats(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<DeckStatsParams>,
) -> Result<HttpResponse> {
    let deck_id = path.into_inner();
    let user_id = current_user_id(&req);

    let stats = app_state
        .analytics
        .get_deck_stats(&deck_id, query.tier, user_id.as_deref(), query.refresh)
        .await?;

    Ok(HttpResponse::Ok().json(stats))
}

pub async fn get_total_stats(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RollupParams>,
) -> Result<HttpResponse> {
    let user_id = current_user_id(&req);

    let totals = app_state
        .analytics
        .get_user_total_stats(user_id.as_deref(), query.deck_id.as_deref(), query.refresh)
        .await?;

    Ok(HttpResponse::Ok().json(totals))
}

pub async fn get_top_decks(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<TopDecksParams>,
) -> Result<HttpResponse> {
    let user_id = current_user_id(&req);

    let top = app_state
        .analytics
        .get_top_performing_decks(user_id.as_deref(), query.limit(), query.refresh)
        .await?;

    Ok(HttpResponse::Ok().json(top))
}

pub async fn get_daily_metrics(
    app_state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<RollupParams>,
) -> Result<HttpResponse> {
    let user_id = current_user_id(&req);

    let daily = app_state
        .analytics
        .get_daily_metrics(user_id.as_deref(), query.deck_id.as_deref(), query.refresh)
        .await?;

    Ok(HttpResponse::Ok().json(daily))
}
