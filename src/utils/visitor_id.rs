use std::sync::atomic::{AtomicU64, Ordering};

use actix_web::HttpRequest;
use actix_web::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use nanoid::nanoid;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub const VISITOR_COOKIE: &str = "deck_visitor";
const COOKIE_MAX_AGE_DAYS: i64 = 365;

/// Random visitor identifier. Never fails.
pub fn generate_visitor_id() -> String {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string(),
        Err(e) => {
            log::warn!("OS randomness unavailable ({}); using fallback visitor id", e);
            fallback_visitor_id()
        }
    }
}

fn fallback_visitor_id() -> String {
    nanoid!(21, &nanoid::alphabet::SAFE, digest_random)
}

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Weak byte source for when the OS RNG is gone: SHA-256 over clock, counter and pid.
fn digest_random(size: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(size);
    while bytes.len() < size {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(nanos.to_le_bytes());
        hasher.update(FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        hasher.update(std::process::id().to_le_bytes());
        bytes.extend_from_slice(&hasher.finalize());
    }
    bytes.truncate(size);
    bytes
}

/// Accepts ids we could have issued; anything else is replaced.
pub fn is_valid_visitor_id(id: &str) -> bool {
    (8..=64).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// The visitor behind a viewer request, persisted in a long-lived cookie.
#[derive(Debug, Clone)]
pub struct VisitorIdentity {
    pub id: String,
    pub is_new: bool,
}

impl VisitorIdentity {
    pub fn from_request(req: &HttpRequest) -> Self {
        match req.cookie(VISITOR_COOKIE) {
            Some(cookie) if is_valid_visitor_id(cookie.value()) => Self {
                id: cookie.value().to_string(),
                is_new: false,
            },
            _ => Self {
                id: generate_visitor_id(),
                is_new: true,
            },
        }
    }

    /// Cookie to set on the response, only when the id was just minted.
    pub fn cookie(&self) -> Option<Cookie<'static>> {
        if !self.is_new {
            return None;
        }
        Some(
            Cookie::build(VISITOR_COOKIE, self.id.clone())
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(CookieDuration::days(COOKIE_MAX_AGE_DAYS))
                .finish(),
        )
    }
}
