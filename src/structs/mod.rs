pub mod deck_request;
pub mod stats_query;
pub mod view_request;
