//! Per-viewer dwell measurement.
//!
//! A `DwellTracker` lives for one deck-view session. Entering a page starts a
//! timer; leaving it (navigation or teardown) emits one dwell signal for the
//! page being left. Teardown is `Drop`, so the last page is flushed however
//! the session ends.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{AnalyticsError, Result};
use crate::utils::clock::Clock;

/// Dwell at or below this is an accidental scroll-through and is discarded.
pub const MIN_DWELL_SECONDS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerSignal {
    PageDwell {
        deck_id: String,
        page_number: u32,
        visitor_id: String,
        time_spent: f64,
        viewer_email: Option<String>,
    },
    DeckCompleted {
        deck_id: String,
        visitor_id: String,
        total_pages: u32,
    },
}

/// Receives tracker output. Called on the request path, so it must not block.
pub trait SignalSink: Send + Sync {
    fn emit(&self, signal: TrackerSignal);
}

impl SignalSink for UnboundedSender<TrackerSignal> {
    fn emit(&self, signal: TrackerSignal) {
        if self.send(signal).is_err() {
            log::warn!("tracker signal dropped: signal worker has stopped");
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub deck_id: String,
    pub visitor_id: String,
    pub viewer_email: Option<String>,
    pub page_count: u32,
    /// Owner previewing their own deck; nothing is emitted
    pub preview: bool,
}

struct ActivePage {
    page_number: u32,
    entered_at: DateTime<Utc>,
}

pub struct DwellTracker {
    ctx: ViewerContext,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn SignalSink>,
    current: Option<ActivePage>,
    visited: HashSet<u32>,
    completed: bool,
    last_activity: DateTime<Utc>,
}

impl DwellTracker {
    /// Open a session on `first_page`.
    pub fn start(
        ctx: ViewerContext,
        first_page: u32,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn SignalSink>,
    ) -> Result<Self> {
        check_page(&ctx, first_page)?;
        let now = clock.now();
        let mut tracker = Self {
            ctx,
            clock,
            sink,
            current: None,
            visited: HashSet::new(),
            completed: false,
            last_activity: now,
        };
        tracker.enter(first_page);
        Ok(tracker)
    }

    /// Leave the current page for `page_number`. Re-entering the current page is a no-op.
    pub fn navigate(&mut self, page_number: u32) -> Result<()> {
        check_page(&self.ctx, page_number)?;
        if self.current_page() == Some(page_number) {
            self.last_activity = self.clock.now();
            return Ok(());
        }
        self.flush();
        self.enter(page_number);
        Ok(())
    }

    pub fn deck_id(&self) -> &str {
        &self.ctx.deck_id
    }

    pub fn current_page(&self) -> Option<u32> {
        self.current.as_ref().map(|p| p.page_number)
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    fn enter(&mut self, page_number: u32) {
        let now = self.clock.now();
        self.current = Some(ActivePage {
            page_number,
            entered_at: now,
        });
        self.last_activity = now;

        self.visited.insert(page_number);
        if !self.completed && self.visited.len() == self.ctx.page_count as usize {
            self.completed = true;
            if !self.ctx.preview {
                self.sink.emit(TrackerSignal::DeckCompleted {
                    deck_id: self.ctx.deck_id.clone(),
                    visitor_id: self.ctx.visitor_id.clone(),
                    total_pages: self.ctx.page_count,
                });
            }
        }
    }

    fn flush(&mut self) {
        let Some(page) = self.current.take() else {
            return;
        };
        let now = self.clock.now();
        self.last_activity = now;

        let elapsed = (now - page.entered_at).num_milliseconds() as f64 / 1000.0;
        if self.ctx.preview {
            return;
        }
        if elapsed <= MIN_DWELL_SECONDS {
            log::debug!(
                "discarding {:.3}s dwell on {}#{}",
                elapsed,
                self.ctx.deck_id,
                page.page_number
            );
            return;
        }

        self.sink.emit(TrackerSignal::PageDwell {
            deck_id: self.ctx.deck_id.clone(),
            page_number: page.page_number,
            visitor_id: self.ctx.visitor_id.clone(),
            time_spent: elapsed,
            viewer_email: self.ctx.viewer_email.clone(),
        });
    }
}

impl Drop for DwellTracker {
    fn drop(&mut self) {
        self.flush();
    }
}

fn check_page(ctx: &ViewerContext, page_number: u32) -> Result<()> {
    if (1..=ctx.page_count).contains(&page_number) {
        Ok(())
    } else {
        Err(AnalyticsError::InvalidInput(format!(
            "page {} outside 1..={}",
            page_number, ctx.page_count
        )))
    }
}
