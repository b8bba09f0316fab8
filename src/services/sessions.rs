use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nanoid::nanoid;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::{AnalyticsError, Result};
use crate::services::capture::EventCapture;
use crate::services::recorder::{SlideView, ViewRecorder};
use crate::services::tracker::{DwellTracker, SignalSink, TrackerSignal, ViewerContext};
use crate::utils::clock::Clock;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// (visitor_id, session_id)
type SessionKey = (String, String);

/// Open deck-view sessions, one tracker per browser tab.
///
/// Removing a tracker from the map drops it, which flushes its current page.
pub struct ViewerSessions {
    sessions: Mutex<HashMap<SessionKey, DwellTracker>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn SignalSink>,
    idle_timeout: chrono::Duration,
}

impl ViewerSessions {
    pub fn new(clock: Arc<dyn Clock>, sink: Arc<dyn SignalSink>, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
            sink,
            idle_timeout: chrono::Duration::from_std(idle_timeout)
                .unwrap_or(chrono::Duration::minutes(30)),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, DwellTracker>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a session on `first_page` and return its id.
    ///
    /// Every call opens a new session, so two tabs on the same deck are timed separately.
    pub fn open(&self, ctx: ViewerContext, first_page: u32) -> Result<String> {
        let session_id = nanoid!();
        let key = (ctx.visitor_id.clone(), session_id.clone());
        let tracker =
            DwellTracker::start(ctx, first_page, self.clock.clone(), self.sink.clone())?;
        self.sessions().insert(key, tracker);
        Ok(session_id)
    }

    pub fn navigate(
        &self,
        visitor_id: &str,
        deck_id: &str,
        session_id: &str,
        page_number: u32,
    ) -> Result<()> {
        let mut sessions = self.sessions();
        let tracker = sessions
            .get_mut(&(visitor_id.to_string(), session_id.to_string()))
            .filter(|tracker| tracker.deck_id() == deck_id)
            .ok_or_else(|| AnalyticsError::NotFound(format!("no open session for {}", deck_id)))?;
        tracker.navigate(page_number)
    }

    /// End a session. Returns whether one was open.
    pub fn close(&self, visitor_id: &str, deck_id: &str, session_id: &str) -> bool {
        let key = (visitor_id.to_string(), session_id.to_string());
        let removed = {
            let mut sessions = self.sessions();
            let matches_deck = sessions
                .get(&key)
                .is_some_and(|tracker| tracker.deck_id() == deck_id);
            if matches_deck { sessions.remove(&key) } else { None }
        };
        removed.is_some()
    }

    /// Close sessions idle longer than the timeout. Returns how many were closed.
    pub fn sweep_idle(&self) -> usize {
        let cutoff = self.clock.now() - self.idle_timeout;
        let stale: Vec<DwellTracker> = {
            let mut sessions = self.sessions();
            let keys: Vec<SessionKey> = sessions
                .iter()
                .filter(|(_, tracker)| tracker.last_activity() < cutoff)
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter().filter_map(|key| sessions.remove(key)).collect()
        };
        let closed = stale.len();
        if closed > 0 {
            log::info!("closed {} idle viewer sessions", closed);
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }
}

/// Drain tracker signals into the recorder and capture SDK, one at a time and in order.
pub fn spawn_signal_worker(
    mut signals: UnboundedReceiver<TrackerSignal>,
    recorder: Arc<ViewRecorder>,
    capture: EventCapture,
) {
    actix_web::rt::spawn(async move {
        while let Some(signal) = signals.recv().await {
            handle_signal(signal, &recorder, &capture).await;
        }
        log::info!("tracker signal channel closed; worker exiting");
    });
}

async fn handle_signal(signal: TrackerSignal, recorder: &ViewRecorder, capture: &EventCapture) {
    match signal {
        TrackerSignal::PageDwell {
            deck_id,
            page_number,
            visitor_id,
            time_spent,
            viewer_email,
        } => {
            capture.track_page_view(&deck_id, &visitor_id, page_number, time_spent);
            recorder
                .sync_slide_stats(SlideView {
                    deck_id,
                    page_number,
                    visitor_id,
                    time_spent,
                    viewer_email,
                })
                .await;
        }
        TrackerSignal::DeckCompleted {
            deck_id,
            visitor_id,
            total_pages,
        } => capture.track_deck_complete(&deck_id, &visitor_id, total_pages),
    }
}

pub fn spawn_idle_sweeper(sessions: Arc<ViewerSessions>) {
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sessions.sweep_idle();
        }
    });
}
