use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Product personality (cross-session)
// ============================================================================

/// Average swipe duration per speed bucket, with sample counts for
/// running-average updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwipeSpeedProfile {
    pub fast_avg_ms: f64,
    pub medium_avg_ms: f64,
    pub slow_avg_ms: f64,
    pub fast_count: i64,
    pub medium_count: i64,
    pub slow_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductPersonality {
    pub user_id: String,
    /// Theme tag -> preference in [-1, 1].
    pub product_biases: BTreeMap<String, f64>,
    /// Technical theme -> preference in [-1, 1].
    pub technical_biases: BTreeMap<String, f64>,
    pub disliked_patterns: Vec<String>,
    pub swipe_speed_profile: SwipeSpeedProfile,
    pub total_sessions: i64,
    pub updated_at: String,
}

impl ProductPersonality {
    pub fn empty(user_id: &str, now: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            product_biases: BTreeMap::new(),
            technical_biases: BTreeMap::new(),
            disliked_patterns: Vec::new(),
            swipe_speed_profile: SwipeSpeedProfile::default(),
            total_sessions: 0,
            updated_at: now.to_string(),
        }
    }
}
