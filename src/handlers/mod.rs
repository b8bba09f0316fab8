pub mod deck_handlers;
pub mod health_handlers;
pub mod stats_handlers;
pub mod view_handlers;
