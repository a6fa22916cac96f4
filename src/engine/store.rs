//! Persistence boundary for the pipeline.
//!
//! Every `get_*` returns `AppError::NotFound` for a missing id; `find_*`
//! returns `Option`. List operations return rows in creation order.

use crate::db::models::{
    FeatureVariation, GalleryEntry, GalleryPage, GalleryQuery, Idea, Mutation, ProductPersonality,
    RefinementAnswer, Session, Swipe, Synthesis, VisualAsset,
};
use crate::error::AppError;

use super::types::RefinementRole;

pub trait DurableStore: Send + Sync {
    // -- Sessions -------------------------------------------------------------
    fn create_session(&self, session: &Session) -> Result<(), AppError>;
    fn get_session(&self, id: &str) -> Result<Session, AppError>;
    fn update_session(&self, session: &Session) -> Result<(), AppError>;

    // -- Ideas ----------------------------------------------------------------
    fn insert_ideas(&self, ideas: &[Idea]) -> Result<(), AppError>;
    fn get_idea(&self, id: &str) -> Result<Idea, AppError>;
    fn list_ideas(&self, session_id: &str) -> Result<Vec<Idea>, AppError>;
    /// Highest batch number so far, 0 for a fresh session.
    fn max_batch_number(&self, session_id: &str) -> Result<i64, AppError>;

    // -- Swipes (append-only) -------------------------------------------------
    /// Append the swipe and set its idea's score, atomically.
    fn record_swipe(&self, swipe: &Swipe, idea_score: f64) -> Result<(), AppError>;
    fn list_swipes(&self, session_id: &str) -> Result<Vec<Swipe>, AppError>;

    // -- Mutations ------------------------------------------------------------
    fn insert_mutations(&self, mutations: &[Mutation]) -> Result<(), AppError>;
    fn get_mutation(&self, id: &str) -> Result<Mutation, AppError>;
    fn list_mutations(&self, session_id: &str) -> Result<Vec<Mutation>, AppError>;
    fn update_mutation_score(&self, id: &str, score: f64) -> Result<(), AppError>;

    // -- Synthesis ------------------------------------------------------------
    fn create_synthesis(&self, synthesis: &Synthesis) -> Result<(), AppError>;
    fn find_synthesis(&self, session_id: &str) -> Result<Option<Synthesis>, AppError>;

    // -- Feature variations ---------------------------------------------------
    /// All rows are written or none are.
    fn create_feature_variations(&self, variations: &[FeatureVariation]) -> Result<(), AppError>;
    fn get_feature_variation(&self, id: &str) -> Result<FeatureVariation, AppError>;
    fn list_feature_variations(&self, session_id: &str) -> Result<Vec<FeatureVariation>, AppError>;
    fn update_variation_score(&self, id: &str, score: f64) -> Result<(), AppError>;

    // -- Visual assets --------------------------------------------------------
    fn insert_visual_asset(&self, asset: &VisualAsset) -> Result<(), AppError>;
    fn list_visual_assets(&self, session_id: &str) -> Result<Vec<VisualAsset>, AppError>;
    /// Mark `asset_id` selected and every other asset of the session
    /// unselected, atomically.
    fn select_visual_asset(&self, session_id: &str, asset_id: &str) -> Result<VisualAsset, AppError>;

    // -- Refinement -----------------------------------------------------------
    fn insert_refinement_answer(&self, answer: &RefinementAnswer) -> Result<(), AppError>;
    fn list_refinement_answers(
        &self,
        session_id: &str,
        role: RefinementRole,
    ) -> Result<Vec<RefinementAnswer>, AppError>;

    // -- Personality ----------------------------------------------------------
    fn find_personality(&self, user_id: &str) -> Result<Option<ProductPersonality>, AppError>;
    fn upsert_personality(&self, personality: &ProductPersonality) -> Result<(), AppError>;

    // -- Gallery --------------------------------------------------------------
    fn upsert_gallery_entry(&self, entry: &GalleryEntry) -> Result<(), AppError>;
    fn get_gallery_entry(&self, id: &str) -> Result<GalleryEntry, AppError>;
    fn find_gallery_entry_for_session(&self, session_id: &str) -> Result<Option<GalleryEntry>, AppError>;
    fn query_gallery(&self, query: &GalleryQuery) -> Result<GalleryPage, AppError>;
}
