use serde::{Deserialize, Serialize};

use crate::engine::types::{SpeedBucket, SwipeDirection};

// ============================================================================
// Swipes (append-only)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Swipe {
    pub id: String,
    pub session_id: String,
    pub idea_id: String,
    pub user_id: String,
    pub direction: SwipeDirection,
    pub duration_ms: i64,
    pub speed_category: SpeedBucket,
    pub timestamp: String,
}
