use serde::{Deserialize, Serialize};

use crate::engine::phase::Phase;
use crate::engine::types::SessionStatus;

// ============================================================================
// Sessions
// ============================================================================

/// One run of the idea pipeline. Owns every other pipeline entity through
/// `id`; only phase-advancing operations mutate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub app_type: Option<String>,
    /// 1 (weekend project) to 5 (platform).
    pub complexity_level: Option<i64>,
    pub current_phase: Phase,
    pub status: SessionStatus,
    pub top_idea_ids: Vec<String>,
    pub selected_idea_ids: Vec<String>,
    /// Feature variation picked as the proto-app to refine.
    pub selected_variation_id: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub updated_at: String,
}
