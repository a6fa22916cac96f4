use serde::{Deserialize, Serialize};

use crate::engine::types::MutationType;

// ============================================================================
// Mutations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub id: String,
    pub session_id: String,
    /// One parent for repurposing, two for crossover.
    pub parent_idea_ids: Vec<String>,
    pub mutation_type: MutationType,
    pub title: String,
    pub description: String,
    pub mutation_rationale: String,
    pub dna_keywords: Vec<String>,
    pub score: f64,
    pub is_fallback: bool,
    pub created_at: String,
}
