//! SQLite-backed `DurableStore`.

use crate::db::models::{
    FeatureVariation, GalleryEntry, GalleryPage, GalleryQuery, Idea, Mutation, ProductPersonality,
    RefinementAnswer, Session, Swipe, Synthesis, VisualAsset,
};
use crate::db::repos::{
    feature_variations, gallery, ideas, mutations, personalities, refinement_answers, sessions,
    swipes, syntheses, visual_assets,
};
use crate::db::DbPool;
use crate::engine::store::DurableStore;
use crate::engine::types::RefinementRole;
use crate::error::AppError;

/// Thin adapter from the engine's store trait to the repo functions.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl DurableStore for SqliteStore {
    fn create_session(&self, session: &Session) -> Result<(), AppError> {
        sessions::create(&self.pool, session)
    }

    fn get_session(&self, id: &str) -> Result<Session, AppError> {
        sessions::get_by_id(&self.pool, id)
    }

    fn update_session(&self, session: &Session) -> Result<(), AppError> {
        sessions::update(&self.pool, session)
    }

    fn insert_ideas(&self, batch: &[Idea]) -> Result<(), AppError> {
        ideas::insert_batch(&self.pool, batch)
    }

    fn get_idea(&self, id: &str) -> Result<Idea, AppError> {
        ideas::get_by_id(&self.pool, id)
    }

    fn list_ideas(&self, session_id: &str) -> Result<Vec<Idea>, AppError> {
        ideas::get_by_session(&self.pool, session_id)
    }

    fn max_batch_number(&self, session_id: &str) -> Result<i64, AppError> {
        ideas::max_batch_number(&self.pool, session_id)
    }

    fn record_swipe(&self, swipe: &Swipe, idea_score: f64) -> Result<(), AppError> {
        swipes::record(&self.pool, swipe, idea_score)
    }

    fn list_swipes(&self, session_id: &str) -> Result<Vec<Swipe>, AppError> {
        swipes::get_by_session(&self.pool, session_id)
    }

    fn insert_mutations(&self, batch: &[Mutation]) -> Result<(), AppError> {
        mutations::insert_batch(&self.pool, batch)
    }

    fn get_mutation(&self, id: &str) -> Result<Mutation, AppError> {
        mutations::get_by_id(&self.pool, id)
    }

    fn list_mutations(&self, session_id: &str) -> Result<Vec<Mutation>, AppError> {
        mutations::get_by_session(&self.pool, session_id)
    }

    fn update_mutation_score(&self, id: &str, score: f64) -> Result<(), AppError> {
        mutations::update_score(&self.pool, id, score)
    }

    fn create_synthesis(&self, synthesis: &Synthesis) -> Result<(), AppError> {
        syntheses::create(&self.pool, synthesis)
    }

    fn find_synthesis(&self, session_id: &str) -> Result<Option<Synthesis>, AppError> {
        syntheses::find_by_session(&self.pool, session_id)
    }

    fn create_feature_variations(&self, variations: &[FeatureVariation]) -> Result<(), AppError> {
        feature_variations::create_batch(&self.pool, variations)
    }

    fn get_feature_variation(&self, id: &str) -> Result<FeatureVariation, AppError> {
        feature_variations::get_by_id(&self.pool, id)
    }

    fn list_feature_variations(&self, session_id: &str) -> Result<Vec<FeatureVariation>, AppError> {
        feature_variations::get_by_session(&self.pool, session_id)
    }

    fn update_variation_score(&self, id: &str, score: f64) -> Result<(), AppError> {
        feature_variations::update_score(&self.pool, id, score)
    }

    fn insert_visual_asset(&self, asset: &VisualAsset) -> Result<(), AppError> {
        visual_assets::create(&self.pool, asset)
    }

    fn list_visual_assets(&self, session_id: &str) -> Result<Vec<VisualAsset>, AppError> {
        visual_assets::get_by_session(&self.pool, session_id)
    }

    fn select_visual_asset(&self, session_id: &str, asset_id: &str) -> Result<VisualAsset, AppError> {
        visual_assets::select(&self.pool, session_id, asset_id)
    }

    fn insert_refinement_answer(&self, answer: &RefinementAnswer) -> Result<(), AppError> {
        refinement_answers::create(&self.pool, answer)
    }

    fn list_refinement_answers(
        &self,
        session_id: &str,
        role: RefinementRole,
    ) -> Result<Vec<RefinementAnswer>, AppError> {
        refinement_answers::get_by_session_role(&self.pool, session_id, role)
    }

    fn find_personality(&self, user_id: &str) -> Result<Option<ProductPersonality>, AppError> {
        personalities::find_by_user(&self.pool, user_id)
    }

    fn upsert_personality(&self, personality: &ProductPersonality) -> Result<(), AppError> {
        personalities::upsert(&self.pool, personality)
    }

    fn upsert_gallery_entry(&self, entry: &GalleryEntry) -> Result<(), AppError> {
        gallery::upsert(&self.pool, entry)
    }

    fn get_gallery_entry(&self, id: &str) -> Result<GalleryEntry, AppError> {
        gallery::get_by_id(&self.pool, id)
    }

    fn find_gallery_entry_for_session(&self, session_id: &str) -> Result<Option<GalleryEntry>, AppError> {
        gallery::find_by_session(&self.pool, session_id)
    }

    fn query_gallery(&self, query: &GalleryQuery) -> Result<GalleryPage, AppError> {
        gallery::query_published(&self.pool, query)
    }
}
