use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner plan tier; decides how far back raw view events are consulted.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetentionTier {
    #[default]
    Free,
    Pro,
    Business,
}

impl RetentionTier {
    pub fn retention_days(&self) -> i64 {
        match self {
            RetentionTier::Free => 7,
            RetentionTier::Pro => 90,
            RetentionTier::Business => 365,
        }
    }
}

impl fmt::Display for RetentionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionTier::Free => write!(f, "free"),
            RetentionTier::Pro => write!(f, "pro"),
            RetentionTier::Business => write!(f, "business"),
        }
    }
}
