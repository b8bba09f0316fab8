use serde::Deserialize;

use crate::models::tier::RetentionTier;

pub const DEFAULT_TOP_LIMIT: usize = 5;
pub const MAX_TOP_LIMIT: usize = 50;

#[derive(Deserialize)]
pub struct DeckStatsParams {
    #[serde(default)]
    pub tier: RetentionTier,
    #[serde(default)]
    pub refresh: bool,
}

/// Optional single-deck filter for user-wide rollups.
#[derive(Deserialize)]
pub struct RollupParams {
    pub deck_id: Option<String>,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Deserialize)]
pub struct TopDecksParams {
    pub limit: Option<usize>,
    #[serde(default)]
    pub refresh: bool,
}

impl TopDecksParams {
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_TOP_LIMIT)
            .clamp(1, MAX_TOP_LIMIT)
    }
}
