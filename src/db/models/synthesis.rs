use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Synthesis (at most one per session)
// ============================================================================

pub const MIN_SYNTHESIS_SOURCES: usize = 2;
pub const MAX_SYNTHESIS_SOURCES: usize = 10;
pub const MAX_MERGED_TITLE_LEN: usize = 100;
pub const MAX_MERGED_DESCRIPTION_LEN: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Synthesis {
    pub id: String,
    pub session_id: String,
    pub source_idea_ids: Vec<String>,
    pub merged_title: String,
    pub merged_description: String,
    pub thematic_bridge: String,
    /// Source id -> retained concept fragments. Every source has an entry.
    pub retained_elements: BTreeMap<String, Vec<String>>,
    /// True when produced by the deterministic fallback path.
    pub is_fallback: bool,
    pub created_at: String,
}
