mod config;
mod db;
mod error;
mod handlers;
mod middlewares;
mod models;
mod routes;
mod services;
mod state;
mod structs;
mod utils;

use std::sync::Arc;

use crate::config::{AppConfig, StoreBackend};
use crate::db::memory_store::MemoryStore;
use crate::db::mongo_store::MongoStore;
use crate::db::store::AnalyticsStore;
use crate::services::sessions::{spawn_idle_sweeper, spawn_signal_worker};
use crate::state::app_state::AppState;
use crate::utils::clock::SystemClock;
use actix_cors::Cors;
use actix_web::{App, HttpServer, http, middleware::Logger, web};
use anyhow::Context;
use db::mongodb::get_database;
use dotenv::dotenv;
use env_logger::Env;
use routes::init_routes;

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn AnalyticsStore>> {
    match config.store {
        StoreBackend::Mongo => {
            let uri = config.mongodb_uri.as_deref().context("MONGODB_URI not set")?;
            let db = get_database(uri, &config.mongodb_db).await?;
            let store = MongoStore::new(&db);
            store.ensure_indexes().await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            log::warn!("Using the in-memory store; analytics are lost on restart");
            Ok(Arc::new(MemoryStore::default()))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let config = AppConfig::from_env()?;

    // Initialize the store
    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            log::error!("Error connecting to the database: {:#}", e);
            std::process::exit(1);
        }
    };

    // Create shared state and start the background workers
    let (state, signals) = AppState::build(store, Arc::new(SystemClock), &config);
    spawn_signal_worker(signals, state.recorder.clone(), state.capture.clone());
    spawn_idle_sweeper(state.sessions.clone());
    let app_state = web::Data::new(state);

    let cors_origins = config.cors_origins.clone();
    log::info!(
        "Listening on {}:{} (query retries: {})",
        config.bind_addr,
        config.port,
        config.retry.max_attempts()
    );

    // Start the Actix Web server
    HttpServer::new(move || {
        // Create a logger with a custom format instead
        let logger = Logger::new("%a \"%r\" %s %b \"%{Referer}i\" \"%{User-Agent}i\" %D ms");
        let cors = cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![http::header::AUTHORIZATION, http::header::ACCEPT])
            .allowed_header(http::header::CONTENT_TYPE)
            .supports_credentials()
            .max_age(3600);
        App::new()
            .wrap(logger)
            .wrap(cors)
            .app_data(app_state.clone())
            .configure(init_routes)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
