use serde::{Deserialize, Serialize};

use crate::engine::types::RefinementRole;

// ============================================================================
// Refinement interview answers
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefinementAnswer {
    pub id: String,
    pub session_id: String,
    pub role: RefinementRole,
    /// 1-based position in the interview.
    pub question_index: i64,
    pub question: String,
    pub answer: String,
    pub created_at: String,
}
