use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::services::cache::CacheTtls;
use crate::services::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub store: StoreBackend,
    pub mongodb_uri: Option<String>,
    pub mongodb_db: String,
    pub jwt_secret: String,
    pub capture_api_key: Option<String>,
    pub capture_host: String,
    pub cache_ttls: CacheTtls,
    pub retry: RetryPolicy,
    pub session_idle: Duration,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store = match get("ANALYTICS_STORE").as_deref() {
            None | Some("mongo") => StoreBackend::Mongo,
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("ANALYTICS_STORE must be 'mongo' or 'memory', got '{}'", other),
        };

        let mongodb_uri = get("MONGODB_URI");
        if store == StoreBackend::Mongo && mongodb_uri.is_none() {
            bail!("MONGODB_URI not set");
        }

        let jwt_secret = get("JWT_SECRET").context("JWT_SECRET not set")?;

        let cache_ttls = CacheTtls {
            page_stats: Duration::from_secs(parse_or(&get, "CACHE_TTL_PAGE_SECS", 120)?),
            totals: Duration::from_secs(parse_or(&get, "CACHE_TTL_TOTALS_SECS", 30)?),
            rollups: Duration::from_secs(parse_or(&get, "CACHE_TTL_ROLLUP_SECS", 60)?),
        };
        let retry = RetryPolicy::new(
            parse_or(&get, "QUERY_RETRY_ATTEMPTS", 3)?,
            Duration::from_millis(parse_or(&get, "QUERY_RETRY_BASE_MS", 200)?),
        );

        let cors_origins = get("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173,http://localhost:4173".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&get, "PORT", 8080)?,
            store,
            mongodb_uri,
            mongodb_db: get("MONGODB_DB").unwrap_or_else(|| "deckpulse".to_string()),
            jwt_secret,
            capture_api_key: get("CAPTURE_API_KEY"),
            capture_host: get("CAPTURE_HOST")
                .unwrap_or_else(|| "https://app.posthog.com".to_string()),
            cache_ttls,
            retry,
            session_idle: Duration::from_secs(parse_or(&get, "SESSION_IDLE_SECS", 1800)?),
            cors_origins,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: '{}'", key, raw)),
        None => Ok(default),
    }
}
