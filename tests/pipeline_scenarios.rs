//! End-to-end pipeline scenarios against an in-memory SQLite store, a
//! temporary blob directory and a manual clock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ideaforge::blobs::LocalBlobStore;
use ideaforge::clock::ManualClock;
use ideaforge::config::ForgeConfig;
use ideaforge::db::models::{GalleryQuery, Mutation};
use ideaforge::db::{init_memory_db, SqliteStore};
use ideaforge::engine::features::FeatureSetDraft;
use ideaforge::engine::ideas::{IdeaDraft, IdeaRequest};
use ideaforge::engine::mutation::{MutationDraft, MutationRequest};
use ideaforge::engine::synthesis::{SynthesisDraft, SynthesisSource};
use ideaforge::engine::types::{
    GenerationOutcome, MutationType, RefinementRole, SwipeDirection, VariationTheme,
};
use ideaforge::engine::{CandidateGenerator, IdeaPipeline, MockCandidateGenerator, Phase, PipelineDeps};
use ideaforge::error::AppError;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Mock generator with switchable failures for images and feature sets.
#[derive(Default)]
struct FlakyGenerator {
    inner: MockCandidateGenerator,
    /// Image calls that fail as rate limited before images start working.
    rate_limited_images: AtomicUsize,
    /// Every image call fails with a non-deferrable error.
    broken_images: AtomicBool,
    /// The next feature-set call fails.
    fail_next_feature_set: AtomicBool,
}

#[async_trait]
impl CandidateGenerator for FlakyGenerator {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn generate_ideas(
        &self,
        request: &IdeaRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<IdeaDraft>>, AppError> {
        self.inner.generate_ideas(request, cancel).await
    }

    async fn generate_mutations(
        &self,
        request: &MutationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<MutationDraft>>, AppError> {
        self.inner.generate_mutations(request, cancel).await
    }

    async fn synthesize(
        &self,
        sources: &[SynthesisSource],
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<SynthesisDraft>, AppError> {
        self.inner.synthesize(sources, cancel).await
    }

    async fn generate_feature_set(
        &self,
        mutation: &Mutation,
        themes: &[VariationTheme],
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<FeatureSetDraft>>, AppError> {
        if self.fail_next_feature_set.swap(false, Ordering::SeqCst) {
            return Err(AppError::GenerationFailure("model returned prose".into()));
        }
        self.inner.generate_feature_set(mutation, themes, cancel).await
    }

    async fn generate_image(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, AppError> {
        if self.broken_images.load(Ordering::SeqCst) {
            return Err(AppError::Validation("prompt rejected".into()));
        }
        let limited = self
            .rate_limited_images
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(AppError::RateLimited {
                attempts: 4,
                last_error: "429 Too Many Requests".into(),
            });
        }
        self.inner.generate_image(prompt, cancel).await
    }
}

struct Harness {
    pipeline: IdeaPipeline,
    generator: Arc<FlakyGenerator>,
    clock: Arc<ManualClock>,
    cancel: CancellationToken,
    _blobs: TempDir,
}

fn harness() -> Harness {
    let mut config = ForgeConfig::default();
    config.pipeline.max_idea_batches = 2;
    config.queue.replay_delay_ms = 1;

    let blobs = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ));
    let generator = Arc::new(FlakyGenerator::default());
    let store = Arc::new(SqliteStore::new(init_memory_db().unwrap()));

    let deps = PipelineDeps::from_config(
        &config,
        store,
        generator.clone(),
        Arc::new(LocalBlobStore::new(blobs.path().to_path_buf())),
        clock.clone(),
    );
    Harness {
        pipeline: IdeaPipeline::new(deps),
        generator,
        clock,
        cancel: CancellationToken::new(),
        _blobs: blobs,
    }
}

impl Harness {
    async fn spark_session(&self) -> String {
        let session = self.pipeline.create_session("user-1").unwrap();
        self.pipeline
            .configure_scope(&session.id, "fitness tracking", 3)
            .unwrap();
        self.pipeline
            .generate_ideas(&session.id, &self.cancel)
            .await
            .unwrap();
        session.id
    }

    /// Swipe right on three ideas, select two of them and generate
    /// repurposing mutations. Returns the session id and mutation ids.
    async fn mutation_session(&self) -> (String, Vec<String>) {
        let sid = self.spark_session().await;
        let batch_ideas = pipeline_ideas(&self.pipeline, &sid);
        for id in batch_ideas.iter().take(3) {
            self.pipeline
                .record_swipe(&sid, id, "user-1", SwipeDirection::Right, 2_000)
                .unwrap();
        }
        let picks: Vec<String> = batch_ideas.iter().take(2).cloned().collect();
        self.pipeline.select_ideas(&sid, &picks).unwrap();

        let mutations = self
            .pipeline
            .generate_mutations(&sid, &[MutationType::Repurposing], &self.cancel)
            .await
            .unwrap();
        let ids = mutations.items.iter().map(|m| m.id.clone()).collect();
        (sid, ids)
    }

    async fn refinement_session(&self) -> String {
        let (sid, mutation_ids) = self.mutation_session().await;
        let variations = self
            .pipeline
            .expand_features(&sid, &mutation_ids[..1], 2, &self.cancel)
            .await
            .unwrap();
        self.pipeline
            .select_proto_app(&sid, &variations.items[0].id)
            .unwrap();
        sid
    }

    async fn visual_session(&self) -> String {
        let sid = self.refinement_session().await;
        for i in 0..20 {
            self.pipeline
                .submit_refinement_answer(&sid, &format!("answer {i}"))
                .unwrap();
        }
        sid
    }
}

/// Ideas of the session in generation order.
fn pipeline_ideas(pipeline: &IdeaPipeline, session_id: &str) -> Vec<String> {
    pipeline
        .list_ideas(session_id)
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect()
}

// ---------------------------------------------------------------------------
// Spark
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_numbers_increase_until_the_limit() {
    let h = harness();
    let session = h.pipeline.create_session("user-1").unwrap();
    h.pipeline.configure_scope(&session.id, "budgeting", 2).unwrap();

    let first = h.pipeline.generate_ideas(&session.id, &h.cancel).await.unwrap();
    let second = h.pipeline.generate_ideas(&session.id, &h.cancel).await.unwrap();
    assert_eq!(first.batch_number, 1);
    assert_eq!(second.batch_number, 2);
    assert_eq!(first.ideas.len(), 10);
    assert!(first.ideas.iter().all(|i| i.score == 0.0));

    let third = h.pipeline.generate_ideas(&session.id, &h.cancel).await;
    assert!(matches!(third, Err(AppError::Validation(_))));
    assert_eq!(h.pipeline.list_ideas(&session.id).unwrap().len(), 20);
}

#[tokio::test]
async fn ten_left_swipes_signal_all_disliked() {
    let h = harness();
    let sid = h.spark_session().await;

    for id in pipeline_ideas(&h.pipeline, &sid) {
        let outcome = h
            .pipeline
            .record_swipe(&sid, &id, "user-1", SwipeDirection::Left, 500)
            .unwrap();
        assert_eq!(outcome.idea_score, 0.0);
    }

    let top = h.pipeline.get_top_ideas(&sid).unwrap();
    assert!(top.ideas.is_empty());
    assert!(top.all_disliked);
    assert_eq!(top.dislike_count, 10);
}

#[tokio::test]
async fn ranking_weighs_score_by_swipe_confidence() {
    let h = harness();
    let sid = h.spark_session().await;
    let ids = pipeline_ideas(&h.pipeline, &sid);

    h.pipeline
        .record_swipe(&sid, &ids[0], "user-1", SwipeDirection::Right, 5_000)
        .unwrap();
    h.pipeline
        .record_swipe(&sid, &ids[1], "user-1", SwipeDirection::Up, 200)
        .unwrap();
    h.pipeline
        .record_swipe(&sid, &ids[2], "user-1", SwipeDirection::Right, 200)
        .unwrap();

    let top = h.pipeline.get_top_ideas(&sid).unwrap();
    let order: Vec<&str> = top.ideas.iter().map(|r| r.idea.id.as_str()).collect();
    // Right@5s: 1.5 * 1.5, Up@200ms: 1.0 * 2.0, Right@200ms: 0.5 * 0.75
    assert_eq!(order, vec![ids[0].as_str(), ids[1].as_str(), ids[2].as_str()]);
    assert_eq!(top.ideas[1].confidence, 2.0);
}

#[tokio::test]
async fn swipe_on_foreign_idea_is_not_found() {
    let h = harness();
    let a = h.spark_session().await;
    let b = h.spark_session().await;
    let foreign = pipeline_ideas(&h.pipeline, &b).remove(0);

    let result = h
        .pipeline
        .record_swipe(&a, &foreign, "user-1", SwipeDirection::Right, 1_500);
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// ---------------------------------------------------------------------------
// Phase gating
// ---------------------------------------------------------------------------

#[tokio::test]
async fn actions_outside_their_phase_are_rejected() {
    let h = harness();
    let session = h.pipeline.create_session("user-1").unwrap();

    let early = h.pipeline.generate_ideas(&session.id, &h.cancel).await;
    match early {
        Err(AppError::PhaseViolation { current, .. }) => assert_eq!(current, Phase::Scope),
        other => panic!("expected phase violation, got {other:?}"),
    }

    let sid = h.spark_session().await;
    let visuals = h.pipeline.generate_visuals(&sid, 1, None, &h.cancel).await;
    assert!(matches!(visuals, Err(AppError::PhaseViolation { .. })));
    let rescope = h.pipeline.configure_scope(&sid, "again", 1);
    assert!(matches!(rescope, Err(AppError::PhaseViolation { .. })));
}

#[tokio::test]
async fn scope_input_is_validated() {
    let h = harness();
    let session = h.pipeline.create_session("user-1").unwrap();
    assert!(matches!(
        h.pipeline.configure_scope(&session.id, "  ", 3),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.pipeline.configure_scope(&session.id, "notes", 6),
        Err(AppError::Validation(_))
    ));
    let unchanged = h.pipeline.get_session(&session.id).unwrap();
    assert_eq!(unchanged.current_phase, Phase::Scope);
}

// ---------------------------------------------------------------------------
// Mutation and synthesis
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_failing_mutation_type_does_not_sink_the_batch() {
    let h = harness();
    let sid = h.spark_session().await;
    let ids = pipeline_ideas(&h.pipeline, &sid);
    h.pipeline
        .record_swipe(&sid, &ids[0], "user-1", SwipeDirection::Up, 2_000)
        .unwrap();
    // Crossover needs two liked parents, only one is selected.
    h.pipeline.select_ideas(&sid, &ids[..1]).unwrap();

    let outcome = h
        .pipeline
        .generate_mutations(
            &sid,
            &[MutationType::Crossover, MutationType::Repurposing],
            &h.cancel,
        )
        .await
        .unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].item, "crossover");
    assert!(outcome
        .items
        .iter()
        .all(|m| m.mutation_type == MutationType::Repurposing && m.parent_idea_ids.len() == 1));
}

#[tokio::test]
async fn synthesis_needs_two_sources_and_happens_once() {
    let h = harness();
    let (sid, mutation_ids) = h.mutation_session().await;

    let short = h
        .pipeline
        .synthesize(&sid, &mutation_ids[..1], &h.cancel)
        .await;
    assert!(matches!(short, Err(AppError::Validation(_))));

    let merged = h
        .pipeline
        .synthesize(&sid, &mutation_ids[..2], &h.cancel)
        .await
        .unwrap();
    assert_eq!(merged.source_idea_ids, mutation_ids[..2].to_vec());
    assert_eq!(h.pipeline.get_synthesis(&sid).unwrap().id, merged.id);

    let again = h
        .pipeline
        .synthesize(&sid, &mutation_ids[..2], &h.cancel)
        .await;
    assert!(matches!(again, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn mutation_feedback_moves_scores_without_going_negative() {
    let h = harness();
    let (_sid, mutation_ids) = h.mutation_session().await;
    let target = &mutation_ids[0];

    let liked = h
        .pipeline
        .record_mutation_feedback(target, SwipeDirection::Up, 4_000)
        .unwrap();
    assert_eq!(liked.score, 3.0);
    for _ in 0..10 {
        let m = h
            .pipeline
            .record_mutation_feedback(target, SwipeDirection::Left, 4_000)
            .unwrap();
        assert!(m.score >= 0.0);
    }
    assert!(matches!(
        h.pipeline.record_mutation_feedback(target, SwipeDirection::Right, -1),
        Err(AppError::Validation(_))
    ));
}

// ---------------------------------------------------------------------------
// Feature expansion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_mutation_is_reported_next_to_expanded_ones() {
    let h = harness();
    let (sid, mutation_ids) = h.mutation_session().await;
    h.generator.fail_next_feature_set.store(true, Ordering::SeqCst);

    let outcome = h
        .pipeline
        .expand_features(&sid, &mutation_ids[..2], 3, &h.cancel)
        .await
        .unwrap();
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].item, mutation_ids[0]);
    assert_eq!(outcome.items.len(), 3);
    assert!(outcome.items.iter().all(|v| v.mutation_id == mutation_ids[1]));
    assert_eq!(
        h.pipeline.get_session(&sid).unwrap().current_phase,
        Phase::FeatureExpansion
    );
}

#[tokio::test]
async fn re_expansion_only_fills_missing_themes() {
    let h = harness();
    let (sid, mutation_ids) = h.mutation_session().await;
    let target = &mutation_ids[..1];

    let first = h.pipeline.expand_features(&sid, target, 2, &h.cancel).await.unwrap();
    assert_eq!(first.items.len(), 2);
    let again = h.pipeline.expand_features(&sid, target, 2, &h.cancel).await.unwrap();
    assert!(again.items.is_empty());
    assert!(again.is_complete());

    let wider = h.pipeline.expand_features(&sid, target, 3, &h.cancel).await.unwrap();
    assert_eq!(wider.items.len(), 1);
    assert_eq!(wider.items[0].variation_theme, VariationTheme::first(3)[2]);

    let stored = h.pipeline.list_proto_app_candidates(&sid).unwrap();
    assert_eq!(stored.len(), 3);
    for theme in VariationTheme::first(3) {
        assert_eq!(stored.iter().filter(|v| v.variation_theme == *theme).count(), 1);
    }
}

#[tokio::test]
async fn rated_variations_rank_first() {
    let h = harness();
    let (sid, mutation_ids) = h.mutation_session().await;
    let outcome = h
        .pipeline
        .expand_features(&sid, &mutation_ids[..1], 3, &h.cancel)
        .await
        .unwrap();

    let favourite = &outcome.items[2];
    h.pipeline.rate_variation(&favourite.id, 5).unwrap();
    h.pipeline.rate_variation(&outcome.items[0].id, 2).unwrap();
    assert!(matches!(
        h.pipeline.rate_variation(&favourite.id, 0),
        Err(AppError::Validation(_))
    ));

    let ranked = h.pipeline.list_proto_app_candidates(&sid).unwrap();
    assert_eq!(ranked[0].id, favourite.id);
    assert_eq!(ranked[0].score, 5.0);
}

// ---------------------------------------------------------------------------
// Refinement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tenth_answer_moves_to_the_next_interview() {
    let h = harness();
    let sid = h.refinement_session().await;

    let first = h.pipeline.next_refinement_question(&sid).unwrap().unwrap();
    assert_eq!(first.role, RefinementRole::ProductManager);
    assert_eq!(first.index, 1);

    for i in 1..=9 {
        let progress = h
            .pipeline
            .submit_refinement_answer(&sid, &format!("pm answer {i}"))
            .unwrap();
        assert_eq!(progress.phase, Phase::ProductRefinement);
    }
    let tenth = h.pipeline.submit_refinement_answer(&sid, "pm answer 10").unwrap();
    assert_eq!(tenth.phase, Phase::TechnicalRefinement);
    let next = tenth.next_question.unwrap();
    assert_eq!(next.role, RefinementRole::Architect);
    assert_eq!(next.index, 1);

    let mut last = None;
    for i in 1..=10 {
        last = Some(
            h.pipeline
                .submit_refinement_answer(&sid, &format!("architect answer {i}"))
                .unwrap(),
        );
    }
    let last = last.unwrap();
    assert_eq!(last.phase, Phase::Visual);
    assert!(last.next_question.is_none());
    assert!(h.pipeline.next_refinement_question(&sid).is_ok_and(|q| q.is_none()));
}

// ---------------------------------------------------------------------------
// Visuals and the offline queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limited_visuals_are_queued_and_replayed() {
    let h = harness();
    let sid = h.visual_session().await;
    h.generator.rate_limited_images.store(2, Ordering::SeqCst);

    let batch = h
        .pipeline
        .generate_visuals(&sid, 3, None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(batch.assets.len(), 1);
    assert_eq!(batch.queued, 2);
    assert_eq!(h.pipeline.queue().pending(&sid), 2);

    let report = h.pipeline.replay_queued_visuals(&sid, &h.cancel).await.unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.remaining, 0);
    assert!(!report.expired);
    assert_eq!(h.pipeline.list_visuals(&sid).unwrap().len(), 3);
    assert!(!h.pipeline.queue().has_queue(&sid));
}

#[tokio::test]
async fn queued_visuals_expire_after_a_day() {
    let h = harness();
    let sid = h.visual_session().await;
    h.generator.rate_limited_images.store(10, Ordering::SeqCst);

    let batch = h
        .pipeline
        .generate_visuals(&sid, 2, None, &h.cancel)
        .await
        .unwrap();
    assert!(batch.assets.is_empty());
    assert_eq!(batch.queued, 2);

    h.clock.advance(Duration::hours(25));
    h.generator.rate_limited_images.store(0, Ordering::SeqCst);
    let report = h.pipeline.replay_queued_visuals(&sid, &h.cancel).await.unwrap();
    assert!(report.expired);
    assert!(report.results.is_empty());
    assert_eq!(h.pipeline.queue().pending(&sid), 0);
    assert!(h.pipeline.list_visuals(&sid).unwrap().is_empty());
}

#[tokio::test]
async fn visuals_that_all_fail_hard_are_a_batch_failure() {
    let h = harness();
    let sid = h.visual_session().await;
    h.generator.broken_images.store(true, Ordering::SeqCst);

    let result = h.pipeline.generate_visuals(&sid, 2, None, &h.cancel).await;
    match result {
        Err(AppError::PartialBatchFailure { succeeded, failures }) => {
            assert_eq!(succeeded, 0);
            assert_eq!(failures.len(), 2);
        }
        other => panic!("expected batch failure, got {other:?}"),
    }
    assert_eq!(h.pipeline.queue().pending(&sid), 0);
}

#[tokio::test]
async fn only_one_visual_is_selected_at_a_time() {
    let h = harness();
    let sid = h.visual_session().await;
    let batch = h
        .pipeline
        .generate_visuals(&sid, 3, None, &h.cancel)
        .await
        .unwrap();

    h.pipeline.select_visual(&sid, &batch.assets[0].id).unwrap();
    let chosen = h.pipeline.select_visual(&sid, &batch.assets[2].id).unwrap();
    assert!(chosen.is_selected);

    let selected: Vec<String> = h
        .pipeline
        .list_visuals(&sid)
        .unwrap()
        .into_iter()
        .filter(|a| a.is_selected)
        .map(|a| a.id)
        .collect();
    assert_eq!(selected, vec![batch.assets[2].id.clone()]);
}

// ---------------------------------------------------------------------------
// Completion, personality and gallery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn published_sessions_show_up_until_unpublished() {
    let h = harness();
    let sid = h.visual_session().await;
    let batch = h
        .pipeline
        .generate_visuals(&sid, 1, None, &h.cancel)
        .await
        .unwrap();
    h.pipeline.select_visual(&sid, &batch.assets[0].id).unwrap();

    let empty = h.pipeline.browse(&GalleryQuery::default()).unwrap();
    assert_eq!(empty.total, 0);

    let completed = h.pipeline.mark_completed(&sid).unwrap();
    assert_eq!(completed.current_phase, Phase::Completed);
    assert!(completed.completed_at.is_some());

    let entry = h.pipeline.publish(&sid).unwrap();
    assert_eq!(entry.thumbnail_url.as_deref(), Some(batch.assets[0].thumbnail_url.as_str()));
    let page = h.pipeline.browse(&GalleryQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].id, entry.id);

    let republished = h.pipeline.publish(&sid).unwrap();
    assert_eq!(republished.id, entry.id);

    h.pipeline.unpublish(&entry.id).unwrap();
    let after = h.pipeline.browse(&GalleryQuery::default()).unwrap();
    assert_eq!(after.total, 0);
}

#[tokio::test]
async fn personality_accumulates_across_sessions() {
    let h = harness();
    let first = h.spark_session().await;
    for id in pipeline_ideas(&h.pipeline, &first).iter().take(5) {
        h.pipeline
            .record_swipe(&first, id, "user-1", SwipeDirection::Left, 1_500)
            .unwrap();
    }
    let second = h.spark_session().await;

    assert!(matches!(
        h.pipeline.get_personality("user-1"),
        Err(AppError::NotFound(_))
    ));
    h.pipeline.update_personality(&first).unwrap();
    let updated = h.pipeline.update_personality(&second).unwrap();
    assert_eq!(updated.total_sessions, 2);
    assert_eq!(h.pipeline.get_personality("user-1").unwrap().total_sessions, 2);
}

#[tokio::test]
async fn cancelled_generation_leaves_no_batch() {
    let h = harness();
    let session = h.pipeline.create_session("user-1").unwrap();
    h.pipeline.configure_scope(&session.id, "recipes", 1).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = h.pipeline.generate_ideas(&session.id, &cancel).await;
    assert!(matches!(result, Err(AppError::Cancelled)));
    assert!(h.pipeline.list_ideas(&session.id).unwrap().is_empty());
}
