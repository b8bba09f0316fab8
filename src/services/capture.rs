use std::sync::Arc;

use serde_json::{Map, Value, json};

struct CaptureClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

/// Fire-and-forget product analytics events.
///
/// Without an API key every call is a silent no-op.
#[derive(Clone)]
pub struct EventCapture {
    client: Option<Arc<CaptureClient>>,
}

impl EventCapture {
    pub fn new(api_key: Option<String>, host: &str) -> Self {
        let Some(api_key) = api_key.filter(|key| !key.trim().is_empty()) else {
            log::info!("CAPTURE_API_KEY not set; product analytics events are disabled");
            return Self::disabled();
        };

        Self {
            client: Some(Arc::new(CaptureClient {
                http: reqwest::Client::new(),
                endpoint: format!("{}/capture/", host.trim_end_matches('/')),
                api_key,
            })),
        }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub fn track_deck_view(
        &self,
        deck_id: &str,
        visitor_id: &str,
        metadata: Option<Map<String, Value>>,
    ) {
        let mut properties = metadata.unwrap_or_default();
        properties.insert("deck_id".into(), json!(deck_id));
        self.capture("deck_viewed", visitor_id, properties);
    }

    pub fn track_page_view(&self, deck_id: &str, visitor_id: &str, page: u32, time_spent: f64) {
        let mut properties = Map::new();
        properties.insert("deck_id".into(), json!(deck_id));
        properties.insert("page_number".into(), json!(page));
        properties.insert("time_spent".into(), json!(time_spent));
        self.capture("pdf_page_viewed", visitor_id, properties);
    }

    pub fn track_deck_complete(&self, deck_id: &str, visitor_id: &str, total_pages: u32) {
        let mut properties = Map::new();
        properties.insert("deck_id".into(), json!(deck_id));
        properties.insert("total_pages".into(), json!(total_pages));
        self.capture("deck_completed", visitor_id, properties);
    }

    fn capture(&self, event: &'static str, distinct_id: &str, properties: Map<String, Value>) {
        let Some(client) = &self.client else {
            return;
        };

        let client = Arc::clone(client);
        let body = capture_payload(&client.api_key, event, distinct_id, properties);

        actix_web::rt::spawn(async move {
            let result = client
                .http
                .post(&client.endpoint)
                .json(&body)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            if let Err(e) = result {
                log::warn!("failed to send {} event: {}", event, e);
            }
        });
    }
}

fn capture_payload(
    api_key: &str,
    event: &str,
    distinct_id: &str,
    properties: Map<String, Value>,
) -> Value {
    json!({
        "api_key": api_key,
        "event": event,
        "distinct_id": distinct_id,
        "properties": properties,
    })
}
