use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::config::AppConfig;
use crate::db::store::AnalyticsStore;
use crate::services::analytics::AnalyticsService;
use crate::services::cache::QueryCache;
use crate::services::capture::EventCapture;
use crate::services::recorder::ViewRecorder;
use crate::services::sessions::ViewerSessions;
use crate::services::tracker::TrackerSignal;
use crate::utils::clock::Clock;

pub struct AppState {
    pub store: Arc<dyn AnalyticsStore>,
    pub clock: Arc<dyn Clock>,
    pub analytics: AnalyticsService,
    pub recorder: Arc<ViewRecorder>,
    pub sessions: Arc<ViewerSessions>,
    pub capture: EventCapture,
    pub jwt_secret: String,
}

impl AppState {
    /// Wire the pipeline together. Tracker signals come out of the returned receiver.
    pub fn build(
        store: Arc<dyn AnalyticsStore>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> (Self, UnboundedReceiver<TrackerSignal>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let cache = QueryCache::new(clock.clone(), config.cache_ttls, config.retry);
        let state = Self {
            analytics: AnalyticsService::new(store.clone(), cache, clock.clone()),
            recorder: Arc::new(ViewRecorder::new(store.clone(), clock.clone())),
            sessions: Arc::new(ViewerSessions::new(
                clock.clone(),
                Arc::new(signal_tx),
                config.session_idle,
            )),
            capture: EventCapture::new(config.capture_api_key.clone(), &config.capture_host),
            jwt_secret: config.jwt_secret.clone(),
            store,
            clock,
        };

        (state, signal_rx)
    }
}
