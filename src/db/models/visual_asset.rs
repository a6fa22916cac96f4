use serde::{Deserialize, Serialize};

// ============================================================================
// Visual assets
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StyleAttributes {
    pub palette: String,
    pub layout: String,
    pub vibe: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisualAsset {
    pub id: String,
    pub session_id: String,
    pub blob_url: String,
    pub thumbnail_url: String,
    pub prompt: String,
    pub style_attributes: StyleAttributes,
    /// At most one selected asset per session.
    pub is_selected: bool,
    pub created_at: String,
}
