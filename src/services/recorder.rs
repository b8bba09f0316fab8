use std::sync::Arc;

use chrono::Duration;

use crate::db::store::AnalyticsStore;
use crate::error::{AnalyticsError, Result};
use crate::models::page_aggregate::PageDelta;
use crate::models::view_event::RawViewEvent;
use crate::utils::clock::Clock;

pub const DEDUP_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Unique,
    Repeat,
}

/// One measured dwell on a deck page.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideView {
    pub deck_id: String,
    pub page_number: u32,
    pub visitor_id: String,
    pub time_spent: f64,
    pub viewer_email: Option<String>,
}

/// Turns dwell events into raw view rows and page aggregate updates.
pub struct ViewRecorder {
    store: Arc<dyn AnalyticsStore>,
    clock: Arc<dyn Clock>,
    dedup_window: Duration,
}

impl ViewRecorder {
    pub fn new(store: Arc<dyn AnalyticsStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            dedup_window: Duration::hours(DEDUP_WINDOW_HOURS),
        }
    }

    /// Best-effort entry point: failures are logged and dropped so viewing is never interrupted.
    pub async fn sync_slide_stats(&self, view: SlideView) {
        match self.record(&view).await {
            Ok(kind) => log::debug!(
                "recorded {:?} view of {}#{} ({:.1}s)",
                kind,
                view.deck_id,
                view.page_number,
                view.time_spent
            ),
            Err(e) => log::error!(
                "dropping view of {}#{} by {}: {}",
                view.deck_id,
                view.page_number,
                view.visitor_id,
                e
            ),
        }
    }

    pub async fn record(&self, view: &SlideView) -> Result<ViewKind> {
        if !view.time_spent.is_finite() || view.time_spent < 0.0 {
            return Err(AnalyticsError::InvalidInput(format!(
                "time_spent {}",
                view.time_spent
            )));
        }

        let deck = self
            .store
            .find_deck(&view.deck_id)
            .await?
            .ok_or_else(|| AnalyticsError::NotFound(format!("deck {}", view.deck_id)))?;
        if !deck.has_page(view.page_number) {
            return Err(AnalyticsError::InvalidInput(format!(
                "page {} outside 1..={}",
                view.page_number, deck.page_count
            )));
        }

        let now = self.clock.now_millis();
        let since = now - self.dedup_window.num_milliseconds();

        // Find-then-insert is not atomic; two tabs racing here can both insert.
        let existing = self
            .store
            .find_recent_view(&view.deck_id, view.page_number, &view.visitor_id, since)
            .await?;

        let kind = match existing {
            None => {
                let event = RawViewEvent::new(
                    view.deck_id.clone(),
                    view.page_number,
                    view.visitor_id.clone(),
                    now,
                    view.time_spent,
                    view.viewer_email.clone(),
                );
                self.store.insert_view(&event).await?;
                ViewKind::Unique
            }
            Some(row) => {
                let id = row.id.ok_or_else(|| {
                    AnalyticsError::Store(format!("view row for {} has no id", view.deck_id))
                })?;
                self.store.add_view_time(&id, view.time_spent).await?;
                ViewKind::Repeat
            }
        };

        let delta = match kind {
            ViewKind::Unique => PageDelta::unique(view.time_spent),
            ViewKind::Repeat => PageDelta::repeat(view.time_spent),
        };
        self.store
            .increment_page_aggregate(&view.deck_id, view.page_number, &deck.user_id, delta, now)
            .await?;

        Ok(kind)
    }
}
