//! IdeaPipeline: the phase-gated orchestration over the engines.
//!
//! Every operation loads the session, asks the phase machine whether the
//! action is legal, does its work through the injected collaborators and
//! commits any phase change back to the session. The pipeline holds no
//! per-session state of its own; callers serialize writes per session.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::blobs::BlobStore;
use crate::clock::Clock;
use crate::config::{ForgeConfig, PipelineConfig};
use crate::db::models::{
    Feature, FeatureVariation, GalleryEntry, GalleryPage, GalleryQuery, Idea, Mutation,
    ProductPersonality, RefinementAnswer, Session, StyleAttributes, Swipe, Synthesis, VisualAsset,
    MAX_FEATURES, MIN_FEATURES, MIN_SYNTHESIS_SOURCES,
};
use crate::error::{AppError, ItemFailure};
use crate::validation::{require_max_len, require_non_empty, require_range, require_valid_id};

use super::cache::CachePolicy;
use super::features;
use super::gallery::GalleryBrowseCache;
use super::generator::CandidateGenerator;
use super::ideas::IdeaRequest;
use super::learning::{self, LearningContext};
use super::mutation::{MutationDraft, MutationRequest};
use super::phase::{self, Phase, PhaseAction};
use super::queue::{OfflineGenerationQueue, ReplayReport, VisualRequest};
use super::refinement::{self, RefinementQuestion};
use super::scoring::{self, TopIdeas};
use super::store::DurableStore;
use super::synthesis::{self, SynthesisSource};
use super::types::{
    GenerationOutcome, MutationType, SessionStatus, SwipeDirection, VariationTheme,
};
use super::visuals;

const MAX_APP_TYPE_LEN: usize = 100;
const MAX_ANSWER_LEN: usize = 4_000;

// =============================================================================
// Result DTOs
// =============================================================================

/// Items that succeeded plus per-item failures. Only returned when at least
/// one item succeeded; an all-failed batch is `AppError::PartialBatchFailure`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome<T> {
    pub items: Vec<T>,
    pub failures: Vec<ItemFailure>,
}

impl<T> BatchOutcome<T> {
    fn finish(items: Vec<T>, failures: Vec<ItemFailure>) -> Result<Self, AppError> {
        if items.is_empty() && !failures.is_empty() {
            return Err(AppError::PartialBatchFailure {
                succeeded: 0,
                failures,
            });
        }
        Ok(Self { items, failures })
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaBatch {
    pub batch_number: i64,
    pub ideas: Vec<Idea>,
    /// Why the batch came from template fallback, if it did.
    pub degraded_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeOutcome {
    pub swipe: Swipe,
    pub idea_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementProgress {
    pub answer: RefinementAnswer,
    pub phase: Phase,
    /// `None` once both interviews are finished.
    pub next_question: Option<RefinementQuestion>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualBatch {
    pub assets: Vec<VisualAsset>,
    /// Requests parked in the offline queue for later replay.
    pub queued: usize,
    pub failures: Vec<ItemFailure>,
}

// =============================================================================
// Construction
// =============================================================================

/// Collaborators the pipeline is built from.
pub struct PipelineDeps {
    pub store: Arc<dyn DurableStore>,
    pub generator: Arc<dyn CandidateGenerator>,
    pub blobs: Arc<dyn BlobStore>,
    pub clock: Arc<dyn Clock>,
    pub queue: Arc<OfflineGenerationQueue>,
    pub gallery_cache: Arc<GalleryBrowseCache>,
    pub config: PipelineConfig,
}

impl PipelineDeps {
    /// Build the queue and gallery cache from configuration.
    pub fn from_config(
        config: &ForgeConfig,
        store: Arc<dyn DurableStore>,
        generator: Arc<dyn CandidateGenerator>,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queue = Arc::new(OfflineGenerationQueue::new(&config.queue, clock.clone()));
        let gallery_cache = Arc::new(GalleryBrowseCache::new(
            CachePolicy::new(config.cache.gallery_sliding_secs, config.cache.gallery_absolute_secs),
            clock.clone(),
        ));
        Self {
            store,
            generator,
            blobs,
            clock,
            queue,
            gallery_cache,
            config: config.pipeline.clone(),
        }
    }
}

pub struct IdeaPipeline {
    store: Arc<dyn DurableStore>,
    generator: Arc<dyn CandidateGenerator>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    queue: Arc<OfflineGenerationQueue>,
    gallery_cache: Arc<GalleryBrowseCache>,
    config: PipelineConfig,
}

impl IdeaPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        tracing::info!(generator = deps.generator.name(), "idea pipeline ready");
        Self {
            store: deps.store,
            generator: deps.generator,
            blobs: deps.blobs,
            clock: deps.clock,
            queue: deps.queue,
            gallery_cache: deps.gallery_cache,
            config: deps.config,
        }
    }

    pub fn queue(&self) -> &OfflineGenerationQueue {
        &self.queue
    }

    pub fn gallery_cache(&self) -> &GalleryBrowseCache {
        &self.gallery_cache
    }

    fn now(&self) -> String {
        self.clock.now().to_rfc3339()
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Load a session and check `action` is legal in its phase.
    fn load_for(&self, session_id: &str, action: PhaseAction) -> Result<Session, AppError> {
        require_valid_id("session_id", session_id)?;
        let session = self.store.get_session(session_id)?;
        phase::ensure_allowed(session.current_phase, action)?;
        Ok(session)
    }

    /// Persist `session`, moving it to the phase `action` leads to, if any.
    fn commit(
        &self,
        session: &mut Session,
        action: PhaseAction,
        answers_recorded: usize,
    ) -> Result<(), AppError> {
        if let Some(next) = phase::next_phase(session.current_phase, action, answers_recorded) {
            phase::ensure_forward(session.current_phase, next)?;
            tracing::info!(
                session_id = %session.id,
                from = %session.current_phase,
                to = %next,
                action = action.name(),
                "session phase advanced"
            );
            session.current_phase = next;
        }
        session.updated_at = self.now();
        self.store.update_session(session)
    }

    // =========================================================================
    // Scope
    // =========================================================================

    pub fn create_session(&self, user_id: &str) -> Result<Session, AppError> {
        require_valid_id("user_id", user_id)?;
        let now = self.now();
        let session = Session {
            id: Self::new_id(),
            user_id: user_id.to_string(),
            app_type: None,
            complexity_level: None,
            current_phase: Phase::Scope,
            status: SessionStatus::InProgress,
            top_idea_ids: Vec::new(),
            selected_idea_ids: Vec::new(),
            selected_variation_id: None,
            created_at: now.clone(),
            completed_at: None,
            updated_at: now,
        };
        self.store.create_session(&session)?;
        tracing::info!(session_id = %session.id, user_id, "session created");
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session, AppError> {
        self.store.get_session(session_id)
    }

    pub fn configure_scope(
        &self,
        session_id: &str,
        app_type: &str,
        complexity_level: i64,
    ) -> Result<Session, AppError> {
        let mut session = self.load_for(session_id, PhaseAction::ConfigureScope)?;
        require_non_empty("app_type", app_type)?;
        require_max_len("app_type", app_type.trim(), MAX_APP_TYPE_LEN)?;
        require_range("complexity_level", complexity_level, 1, 5)?;

        session.app_type = Some(app_type.trim().to_string());
        session.complexity_level = Some(complexity_level);
        self.commit(&mut session, PhaseAction::ConfigureScope, 0)?;
        Ok(session)
    }

    // =========================================================================
    // Spark: ideas and swipes
    // =========================================================================

    /// Generate the next idea batch, biased by everything swiped so far.
    pub async fn generate_ideas(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<IdeaBatch, AppError> {
        let session = self.load_for(session_id, PhaseAction::GenerateIdeas)?;

        let current = self.store.max_batch_number(session_id)?;
        if current >= self.config.max_idea_batches {
            return Err(AppError::Validation(format!(
                "Idea batch limit reached ({current} of {})",
                self.config.max_idea_batches
            )));
        }
        let batch_number = current + 1;

        let existing = self.store.list_ideas(session_id)?;
        let swipes = self.store.list_swipes(session_id)?;
        let learning = LearningContext::build(&swipes, &existing);
        let request = IdeaRequest {
            app_type: session.app_type.clone(),
            complexity_level: session.complexity_level,
            batch_number,
            count: self.config.ideas_per_batch,
            learning,
            existing_titles: existing.iter().map(|i| i.title.clone()).collect(),
        };

        let outcome = self.generator.generate_ideas(&request, cancel).await?;
        let is_fallback = outcome.is_degraded();
        let degraded_reason = outcome.reason().map(str::to_string);
        let drafts = outcome.into_value();
        if drafts.is_empty() {
            return Err(AppError::GenerationFailure(
                "generator returned no ideas".into(),
            ));
        }

        let now = self.now();
        let ideas: Vec<Idea> = drafts
            .into_iter()
            .map(|d| Idea {
                id: Self::new_id(),
                session_id: session_id.to_string(),
                batch_number,
                title: d.title,
                description: d.description,
                dna_keywords: d.dna_keywords,
                score: 0.0,
                is_fallback,
                created_at: now.clone(),
            })
            .collect();
        self.store.insert_ideas(&ideas)?;

        tracing::info!(
            session_id,
            batch_number,
            count = ideas.len(),
            fallback = is_fallback,
            "idea batch generated"
        );
        Ok(IdeaBatch {
            batch_number,
            ideas,
            degraded_reason,
        })
    }

    pub fn record_swipe(
        &self,
        session_id: &str,
        idea_id: &str,
        user_id: &str,
        direction: SwipeDirection,
        duration_ms: i64,
    ) -> Result<SwipeOutcome, AppError> {
        self.load_for(session_id, PhaseAction::RecordSwipe)?;
        require_valid_id("user_id", user_id)?;
        require_range("duration_ms", duration_ms, 0, i64::MAX)?;

        let idea = self.store.get_idea(idea_id)?;
        if idea.session_id != session_id {
            return Err(AppError::NotFound(format!("Idea {idea_id} in session {session_id}")));
        }

        let speed_category = scoring::speed_bucket(duration_ms);
        let idea_score =
            scoring::apply_delta(idea.score, scoring::swipe_delta(direction, duration_ms));

        let swipe = Swipe {
            id: Self::new_id(),
            session_id: session_id.to_string(),
            idea_id: idea_id.to_string(),
            user_id: user_id.to_string(),
            direction,
            duration_ms,
            speed_category,
            timestamp: self.now(),
        };
        self.store.record_swipe(&swipe, idea_score)?;

        tracing::debug!(
            session_id,
            idea_id,
            direction = %direction,
            speed = %speed_category,
            score = idea_score,
            "swipe recorded"
        );
        Ok(SwipeOutcome { swipe, idea_score })
    }

    /// Every idea of the session, oldest batch first.
    pub fn list_ideas(&self, session_id: &str) -> Result<Vec<Idea>, AppError> {
        self.store.list_ideas(session_id)
    }

    pub fn get_top_ideas(&self, session_id: &str) -> Result<TopIdeas, AppError> {
        require_valid_id("session_id", session_id)?;
        self.store.get_session(session_id)?;
        let ideas = self.store.list_ideas(session_id)?;
        let swipes = self.store.list_swipes(session_id)?;
        Ok(scoring::rank_top_ideas(
            &ideas,
            &swipes,
            self.config.top_idea_count,
            self.config.all_disliked_threshold,
        ))
    }

    /// Pick the ideas to evolve and move on to mutation.
    pub fn select_ideas(&self, session_id: &str, idea_ids: &[String]) -> Result<Session, AppError> {
        let mut session = self.load_for(session_id, PhaseAction::SelectIdeas)?;
        if idea_ids.is_empty() {
            return Err(AppError::Validation("Select at least one idea".into()));
        }

        let known: HashSet<String> = self
            .store
            .list_ideas(session_id)?
            .into_iter()
            .map(|i| i.id)
            .collect();
        let mut selected = Vec::new();
        for id in idea_ids {
            if !known.contains(id) {
                return Err(AppError::NotFound(format!("Idea {id} in session {session_id}")));
            }
            if !selected.contains(id) {
                selected.push(id.clone());
            }
        }

        let top = self.get_top_ideas(session_id)?;
        session.top_idea_ids = top.ideas.into_iter().map(|r| r.idea.id).collect();
        session.selected_idea_ids = selected;
        self.commit(&mut session, PhaseAction::SelectIdeas, 0)?;
        Ok(session)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// One mutation batch per requested type; a failing type is reported
    /// alongside the types that succeeded.
    pub async fn generate_mutations(
        &self,
        session_id: &str,
        types: &[MutationType],
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome<Mutation>, AppError> {
        let session = self.load_for(session_id, PhaseAction::GenerateMutations)?;
        if types.is_empty() {
            return Err(AppError::Validation("Request at least one mutation type".into()));
        }

        let ideas = self.store.list_ideas(session_id)?;
        let swipes = self.store.list_swipes(session_id)?;
        let (liked, disliked) = self.mutation_parents(&session, &ideas, &swipes);

        let mut items = Vec::new();
        let mut failures = Vec::new();
        let mut seen = HashSet::new();

        for mutation_type in types.iter().copied().filter(|t| seen.insert(*t)) {
            let request = MutationRequest {
                liked: liked.clone(),
                disliked: disliked.clone(),
                mutation_type,
                count: self.config.mutations_per_type,
            };
            let result = match self.generator.generate_mutations(&request, cancel).await {
                Ok(outcome) => self.persist_mutations(session_id, outcome),
                Err(e) => Err(e),
            };
            match result {
                Ok(batch) => items.extend(batch),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        session_id,
                        mutation_type = %mutation_type,
                        error = %e,
                        "mutation batch failed"
                    );
                    failures.push(ItemFailure::from_error(mutation_type.as_str(), &e));
                }
            }
        }

        BatchOutcome::finish(items, failures)
    }

    /// Liked parents are the selected ideas (best first); disliked are ideas
    /// whose latest swipe was Left.
    fn mutation_parents(
        &self,
        session: &Session,
        ideas: &[Idea],
        swipes: &[Swipe],
    ) -> (Vec<Idea>, Vec<Idea>) {
        let by_id: HashMap<&str, &Idea> = ideas.iter().map(|i| (i.id.as_str(), i)).collect();

        let mut liked: Vec<Idea> = session
            .selected_idea_ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).map(|i| (*i).clone()))
            .collect();
        liked.sort_by(|a, b| b.score.total_cmp(&a.score));
        liked.truncate(self.config.max_liked_for_mutation);

        let mut latest: HashMap<&str, SwipeDirection> = HashMap::new();
        for swipe in swipes {
            latest.insert(swipe.idea_id.as_str(), swipe.direction);
        }
        let liked_ids: HashSet<&str> = liked.iter().map(|i| i.id.as_str()).collect();
        let disliked: Vec<Idea> = ideas
            .iter()
            .filter(|i| !liked_ids.contains(i.id.as_str()))
            .filter(|i| latest.get(i.id.as_str()) == Some(&SwipeDirection::Left))
            .take(self.config.max_disliked_for_mutation)
            .cloned()
            .collect();

        (liked, disliked)
    }

    fn persist_mutations(
        &self,
        session_id: &str,
        outcome: GenerationOutcome<Vec<MutationDraft>>,
    ) -> Result<Vec<Mutation>, AppError> {
        let is_fallback = outcome.is_degraded();
        let drafts = outcome.into_value();
        if drafts.is_empty() {
            return Err(AppError::GenerationFailure("generator returned no mutations".into()));
        }
        let now = self.now();
        let mutations: Vec<Mutation> = drafts
            .into_iter()
            .map(|d| Mutation {
                id: Self::new_id(),
                session_id: session_id.to_string(),
                parent_idea_ids: d.parent_idea_ids,
                mutation_type: d.mutation_type,
                title: d.title,
                description: d.description,
                mutation_rationale: d.mutation_rationale,
                dna_keywords: d.dna_keywords,
                score: 0.0,
                is_fallback,
                created_at: now.clone(),
            })
            .collect();
        self.store.insert_mutations(&mutations)?;
        Ok(mutations)
    }

    pub fn record_mutation_feedback(
        &self,
        mutation_id: &str,
        direction: SwipeDirection,
        duration_ms: i64,
    ) -> Result<Mutation, AppError> {
        require_valid_id("mutation_id", mutation_id)?;
        require_range("duration_ms", duration_ms, 0, i64::MAX)?;
        let mut mutation = self.store.get_mutation(mutation_id)?;
        self.load_for(&mutation.session_id, PhaseAction::RecordMutationFeedback)?;

        mutation.score =
            scoring::apply_delta(mutation.score, scoring::swipe_delta(direction, duration_ms));
        self.store.update_mutation_score(mutation_id, mutation.score)?;
        Ok(mutation)
    }

    /// Merge 2-10 ideas or mutations of the session into one concept.
    pub async fn synthesize(
        &self,
        session_id: &str,
        source_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Synthesis, AppError> {
        self.load_for(session_id, PhaseAction::Synthesize)?;
        if self.store.find_synthesis(session_id)?.is_some() {
            return Err(AppError::Validation(format!(
                "Session {session_id} already has a synthesis"
            )));
        }

        let sources = self.synthesis_sources(session_id, source_ids)?;
        synthesis::validate_sources(&sources)?;

        let outcome = self.generator.synthesize(&sources, cancel).await?;
        let is_fallback = outcome.is_degraded();
        let draft = outcome.into_value();
        let record = Synthesis {
            id: Self::new_id(),
            session_id: session_id.to_string(),
            source_idea_ids: sources.iter().map(|s| s.id.clone()).collect(),
            merged_title: draft.merged_title,
            merged_description: draft.merged_description,
            thematic_bridge: draft.thematic_bridge,
            retained_elements: draft.retained_elements,
            is_fallback,
            created_at: self.now(),
        };
        self.store.create_synthesis(&record)?;
        tracing::info!(
            session_id,
            sources = record.source_idea_ids.len(),
            fallback = is_fallback,
            "synthesis created"
        );
        Ok(record)
    }

    pub fn get_synthesis(&self, session_id: &str) -> Result<Synthesis, AppError> {
        self.store
            .find_synthesis(session_id)?
            .ok_or_else(|| AppError::NotFound(format!("Synthesis for session {session_id}")))
    }

    fn synthesis_sources(
        &self,
        session_id: &str,
        source_ids: &[String],
    ) -> Result<Vec<SynthesisSource>, AppError> {
        let ideas = self.store.list_ideas(session_id)?;
        let mutations = self.store.list_mutations(session_id)?;
        let mut by_id: HashMap<&str, SynthesisSource> = HashMap::new();
        for idea in &ideas {
            by_id.insert(
                idea.id.as_str(),
                source_from(&idea.id, &idea.title, &idea.description, &idea.dna_keywords),
            );
        }
        for m in &mutations {
            by_id.insert(
                m.id.as_str(),
                source_from(&m.id, &m.title, &m.description, &m.dna_keywords),
            );
        }

        // A short list is a validation error even when an id is also unknown
        if source_ids.len() < MIN_SYNTHESIS_SOURCES {
            return Err(AppError::Validation(format!(
                "Synthesis needs at least {} sources, got {}",
                MIN_SYNTHESIS_SOURCES,
                source_ids.len()
            )));
        }
        source_ids
            .iter()
            .map(|id| {
                by_id
                    .get(id.as_str())
                    .cloned()
                    .ok_or_else(|| {
                        AppError::NotFound(format!("Idea or mutation {id} in session {session_id}"))
                    })
            })
            .collect()
    }

    // =========================================================================
    // Feature expansion
    // =========================================================================

    /// Expand each mutation into up to five themed feature sets with one
    /// generation call per mutation. Each mutation's variations are stored
    /// together or not at all. Themes a mutation already has are not
    /// requested again.
    pub async fn expand_features(
        &self,
        session_id: &str,
        mutation_ids: &[String],
        theme_count: usize,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome<FeatureVariation>, AppError> {
        let mut session = self.load_for(session_id, PhaseAction::ExpandFeatures)?;
        let themes = features::themes_for(theme_count)?;
        if mutation_ids.is_empty() {
            return Err(AppError::Validation("Select at least one mutation".into()));
        }

        let mut targets = Vec::with_capacity(mutation_ids.len());
        for id in mutation_ids {
            let mutation = self.store.get_mutation(id)?;
            if mutation.session_id != session_id {
                return Err(AppError::NotFound(format!("Mutation {id} in session {session_id}")));
            }
            targets.push(mutation);
        }

        let expanded: HashSet<(String, VariationTheme)> = self
            .store
            .list_feature_variations(session_id)?
            .into_iter()
            .map(|v| (v.mutation_id, v.variation_theme))
            .collect();

        let mut items = Vec::new();
        let mut failures = Vec::new();
        for mutation in &targets {
            let missing: Vec<VariationTheme> = themes
                .iter()
                .copied()
                .filter(|t| !expanded.contains(&(mutation.id.clone(), *t)))
                .collect();
            if missing.is_empty() {
                tracing::debug!(
                    session_id,
                    mutation_id = %mutation.id,
                    "mutation already has every requested theme"
                );
                continue;
            }
            let result = match self.generator.generate_feature_set(mutation, &missing, cancel).await {
                Ok(outcome) => self.persist_variations(mutation, outcome.into_value()),
                Err(e) => Err(e),
            };
            match result {
                Ok(batch) => items.extend(batch),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        session_id,
                        mutation_id = %mutation.id,
                        error = %e,
                        "feature expansion failed"
                    );
                    failures.push(ItemFailure::from_error(mutation.id.clone(), &e));
                }
            }
        }

        let outcome = BatchOutcome::finish(items, failures)?;
        self.commit(&mut session, PhaseAction::ExpandFeatures, 0)?;
        Ok(outcome)
    }

    fn persist_variations(
        &self,
        mutation: &Mutation,
        drafts: Vec<features::FeatureSetDraft>,
    ) -> Result<Vec<FeatureVariation>, AppError> {
        let now = self.now();
        let variations: Vec<FeatureVariation> = drafts
            .into_iter()
            .filter(|d| d.features.len() >= MIN_FEATURES)
            .map(|d| FeatureVariation {
                id: Self::new_id(),
                session_id: mutation.session_id.clone(),
                mutation_id: mutation.id.clone(),
                variation_theme: d.theme,
                features: d
                    .features
                    .into_iter()
                    .take(MAX_FEATURES)
                    .collect(),
                service_integrations: d.service_integrations,
                score: 0.0,
                created_at: now.clone(),
            })
            .collect();
        if variations.is_empty() {
            return Err(AppError::GenerationFailure(format!(
                "no usable feature sets for mutation {}",
                mutation.id
            )));
        }
        self.store.create_feature_variations(&variations)?;
        Ok(variations)
    }

    pub fn rate_variation(&self, variation_id: &str, rating: i64) -> Result<FeatureVariation, AppError> {
        require_valid_id("variation_id", variation_id)?;
        require_range("rating", rating, 1, 5)?;
        let mut variation = self.store.get_feature_variation(variation_id)?;
        self.load_for(&variation.session_id, PhaseAction::RateVariation)?;

        variation.score = rating as f64;
        self.store.update_variation_score(variation_id, variation.score)?;
        Ok(variation)
    }

    /// Feature variations of the session, best rated first.
    pub fn list_proto_app_candidates(&self, session_id: &str) -> Result<Vec<FeatureVariation>, AppError> {
        let mut variations = self.store.list_feature_variations(session_id)?;
        variations.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(variations)
    }

    pub fn select_proto_app(&self, session_id: &str, variation_id: &str) -> Result<Session, AppError> {
        let mut session = self.load_for(session_id, PhaseAction::SelectProtoApp)?;
        let variation = self.store.get_feature_variation(variation_id)?;
        if variation.session_id != session_id {
            return Err(AppError::NotFound(format!(
                "FeatureVariation {variation_id} in session {session_id}"
            )));
        }
        session.selected_variation_id = Some(variation.id);
        self.commit(&mut session, PhaseAction::SelectProtoApp, 0)?;
        Ok(session)
    }

    // =========================================================================
    // Refinement interviews
    // =========================================================================

    /// The question to ask next, or `None` outside the refinement phases.
    pub fn next_refinement_question(&self, session_id: &str) -> Result<Option<RefinementQuestion>, AppError> {
        require_valid_id("session_id", session_id)?;
        let session = self.store.get_session(session_id)?;
        let Some(role) = refinement::role_for_phase(session.current_phase) else {
            return Ok(None);
        };
        let answered = self.store.list_refinement_answers(session_id, role)?.len();
        Ok(refinement::next_question(role, answered))
    }

    /// Record the answer to the current question. The tenth answer of an
    /// interview moves the session to the next phase.
    pub fn submit_refinement_answer(
        &self,
        session_id: &str,
        answer: &str,
    ) -> Result<RefinementProgress, AppError> {
        let mut session = self.load_for(session_id, PhaseAction::SubmitRefinementAnswer)?;
        require_non_empty("answer", answer)?;
        require_max_len("answer", answer, MAX_ANSWER_LEN)?;

        let role = refinement::role_for_phase(session.current_phase).ok_or_else(|| {
            AppError::Internal(format!("no interview for phase {}", session.current_phase))
        })?;
        let answered = self.store.list_refinement_answers(session_id, role)?.len();
        let question = refinement::next_question(role, answered).ok_or_else(|| {
            AppError::Internal(format!("{role} interview already complete for {session_id}"))
        })?;

        let record = RefinementAnswer {
            id: Self::new_id(),
            session_id: session_id.to_string(),
            role,
            question_index: question.index as i64,
            question: question.question.to_string(),
            answer: answer.trim().to_string(),
            created_at: self.now(),
        };
        self.store.insert_refinement_answer(&record)?;

        let recorded = answered + 1;
        self.commit(&mut session, PhaseAction::SubmitRefinementAnswer, recorded)?;

        let next_question = match refinement::role_for_phase(session.current_phase) {
            Some(next_role) if next_role == role => refinement::next_question(role, recorded),
            Some(next_role) => refinement::next_question(next_role, 0),
            None => None,
        };
        Ok(RefinementProgress {
            answer: record,
            phase: session.current_phase,
            next_question,
        })
    }

    // =========================================================================
    // Visuals
    // =========================================================================

    /// Render `count` mockups of the selected proto-app. Generation failures
    /// that may clear up later are parked in the offline queue.
    pub async fn generate_visuals(
        &self,
        session_id: &str,
        count: usize,
        style: Option<StyleAttributes>,
        cancel: &CancellationToken,
    ) -> Result<VisualBatch, AppError> {
        let session = self.load_for(session_id, PhaseAction::GenerateVisuals)?;
        require_range("count", count, 1, self.config.max_visuals_per_request)?;

        let (title, description, feature_list) = self.proto_app_brief(&session)?;

        let mut assets = Vec::new();
        let mut failures = Vec::new();
        let mut queued = 0;
        for index in 0..count {
            let style = visuals::style_for(index, style.as_ref());
            let request = VisualRequest {
                prompt: visuals::build_visual_prompt(&title, &description, &feature_list, &style),
                style,
            };
            match self.render_visual(session_id, &request, cancel).await {
                Ok(asset) => assets.push(asset),
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) if e.is_deferrable() => {
                    tracing::warn!(session_id, index, error = %e, "visual deferred to offline queue");
                    self.queue.enqueue(session_id, request);
                    queued += 1;
                }
                Err(e) => failures.push(ItemFailure::from_error(format!("visual {}", index + 1), &e)),
            }
        }

        if assets.is_empty() && queued == 0 {
            return Err(AppError::PartialBatchFailure {
                succeeded: 0,
                failures,
            });
        }
        Ok(VisualBatch {
            assets,
            queued,
            failures,
        })
    }

    /// Retry parked visual requests for a session, oldest first.
    pub async fn replay_queued_visuals(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ReplayReport<VisualAsset>, AppError> {
        self.load_for(session_id, PhaseAction::GenerateVisuals)?;
        let this = self;
        self.queue
            .replay(session_id, cancel, move |request| async move {
                this.render_visual(&request.session_id, &request.params, cancel)
                    .await
            })
            .await
    }

    pub fn list_visuals(&self, session_id: &str) -> Result<Vec<VisualAsset>, AppError> {
        self.store.list_visual_assets(session_id)
    }

    pub fn select_visual(&self, session_id: &str, asset_id: &str) -> Result<VisualAsset, AppError> {
        self.load_for(session_id, PhaseAction::SelectVisual)?;
        require_valid_id("asset_id", asset_id)?;
        self.store.select_visual_asset(session_id, asset_id)
    }

    async fn render_visual(
        &self,
        session_id: &str,
        request: &VisualRequest,
        cancel: &CancellationToken,
    ) -> Result<VisualAsset, AppError> {
        let bytes = self
            .generator
            .generate_image(&request.prompt, cancel)
            .await?
            .ok_or_else(|| AppError::GenerationFailure("provider returned no image".into()))?;

        let id = Self::new_id();
        let stored = self.blobs.put(session_id, &id, &bytes).await?;
        let asset = VisualAsset {
            id,
            session_id: session_id.to_string(),
            blob_url: stored.blob_url,
            thumbnail_url: stored.thumbnail_url,
            prompt: request.prompt.clone(),
            style_attributes: request.style.clone(),
            is_selected: false,
            created_at: self.now(),
        };
        self.store.insert_visual_asset(&asset)?;
        Ok(asset)
    }

    /// Title, description and features of the chosen proto-app.
    fn proto_app_brief(
        &self,
        session: &Session,
    ) -> Result<(String, String, Vec<Feature>), AppError> {
        let variation_id = session.selected_variation_id.as_deref().ok_or_else(|| {
            AppError::Validation(format!("Session {} has no selected proto-app", session.id))
        })?;
        let variation = self.store.get_feature_variation(variation_id)?;
        let mutation = self.store.get_mutation(&variation.mutation_id)?;
        Ok((
            format!("{} ({})", mutation.title, variation.variation_theme),
            mutation.description,
            variation.features,
        ))
    }

    // =========================================================================
    // Completion and personality
    // =========================================================================

    /// Collaborator hook once final artifacts exist.
    pub fn mark_completed(&self, session_id: &str) -> Result<Session, AppError> {
        let mut session = self.load_for(session_id, PhaseAction::Complete)?;
        session.status = SessionStatus::Completed;
        session.completed_at = Some(self.now());
        self.commit(&mut session, PhaseAction::Complete, 0)?;
        tracing::info!(session_id, "session completed");
        Ok(session)
    }

    /// Fold this session's swipes and ratings into the user's cross-session
    /// personality.
    pub fn update_personality(&self, session_id: &str) -> Result<ProductPersonality, AppError> {
        require_valid_id("session_id", session_id)?;
        let session = self.store.get_session(session_id)?;
        let swipes = self.store.list_swipes(session_id)?;
        let ideas = self.store.list_ideas(session_id)?;
        let variations = self.store.list_feature_variations(session_id)?;

        let now = self.now();
        let existing = self
            .store
            .find_personality(&session.user_id)?
            .unwrap_or_else(|| ProductPersonality::empty(&session.user_id, &now));
        let updated = learning::aggregate_personality(existing, &swipes, &ideas, &variations, &now);
        self.store.upsert_personality(&updated)?;

        tracing::info!(
            session_id,
            user_id = %session.user_id,
            total_sessions = updated.total_sessions,
            disliked = updated.disliked_patterns.len(),
            "personality updated"
        );
        Ok(updated)
    }

    pub fn get_personality(&self, user_id: &str) -> Result<ProductPersonality, AppError> {
        self.store
            .find_personality(user_id)?
            .ok_or_else(|| AppError::NotFound(format!("ProductPersonality {user_id}")))
    }

    // =========================================================================
    // Gallery
    // =========================================================================

    /// Publish the session's proto-app to the gallery. Re-publishing updates
    /// the existing entry.
    pub fn publish(&self, session_id: &str) -> Result<GalleryEntry, AppError> {
        let session = self.load_for(session_id, PhaseAction::Publish)?;
        let variation_id = session.selected_variation_id.as_deref().ok_or_else(|| {
            AppError::Validation(format!("Session {session_id} has no selected proto-app"))
        })?;
        let variation = self.store.get_feature_variation(variation_id)?;
        let mutation = self.store.get_mutation(&variation.mutation_id)?;
        let thumbnail_url = self
            .store
            .list_visual_assets(session_id)?
            .into_iter()
            .find(|a| a.is_selected)
            .map(|a| a.thumbnail_url);

        let mut tags = mutation.dna_keywords.clone();
        tags.push(variation.variation_theme.as_str().to_string());

        let id = self
            .store
            .find_gallery_entry_for_session(session_id)?
            .map(|e| e.id)
            .unwrap_or_else(Self::new_id);
        let entry = GalleryEntry {
            id,
            session_id: session_id.to_string(),
            user_id: session.user_id.clone(),
            title: mutation.title,
            description: mutation.description,
            app_type: session.app_type.clone(),
            thumbnail_url,
            tags,
            is_published: true,
            published_at: self.now(),
        };
        self.store.upsert_gallery_entry(&entry)?;
        self.gallery_cache.invalidate_all();
        tracing::info!(session_id, entry_id = %entry.id, "published to gallery");
        Ok(entry)
    }

    pub fn unpublish(&self, entry_id: &str) -> Result<GalleryEntry, AppError> {
        require_valid_id("entry_id", entry_id)?;
        let mut entry = self.store.get_gallery_entry(entry_id)?;
        entry.is_published = false;
        self.store.upsert_gallery_entry(&entry)?;
        self.gallery_cache.invalidate_all();
        tracing::info!(entry_id, "removed from gallery");
        Ok(entry)
    }

    pub fn browse(&self, query: &GalleryQuery) -> Result<GalleryPage, AppError> {
        self.gallery_cache
            .browse(query, |q| self.store.query_gallery(q))
    }
}

fn source_from(id: &str, title: &str, description: &str, keywords: &[String]) -> SynthesisSource {
    SynthesisSource {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        key_features: keywords.to_vec(),
    }
}
