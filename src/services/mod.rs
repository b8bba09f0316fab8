pub mod analytics;
pub mod cache;
pub mod capture;
pub mod metrics;
pub mod recorder;
pub mod retry;
pub mod sessions;
pub mod tracker;
