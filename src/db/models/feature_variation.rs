use serde::{Deserialize, Serialize};

use crate::engine::types::{Priority, VariationTheme};

// ============================================================================
// Feature variations
// ============================================================================

pub const MIN_FEATURES: usize = 3;
pub const MAX_FEATURES: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub name: String,
    pub description: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVariation {
    pub id: String,
    pub session_id: String,
    pub mutation_id: String,
    pub variation_theme: VariationTheme,
    /// Between `MIN_FEATURES` and `MAX_FEATURES` entries.
    pub features: Vec<Feature>,
    pub service_integrations: Vec<String>,
    pub score: f64,
    pub created_at: String,
}
