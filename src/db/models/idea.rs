use serde::{Deserialize, Serialize};

// ============================================================================
// Ideas
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Idea {
    pub id: String,
    pub session_id: String,
    /// Monotonic per session, starting at 1.
    pub batch_number: i64,
    pub title: String,
    pub description: String,
    /// Ordered, de-duplicated theme tags.
    pub dna_keywords: Vec<String>,
    /// Never negative.
    pub score: f64,
    /// True when the idea came from template fallback instead of the model.
    pub is_fallback: bool,
    pub created_at: String,
}
