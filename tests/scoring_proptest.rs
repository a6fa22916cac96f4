//! Property tests for the swipe scoring primitives.

use ideaforge::db::models::{Idea, Swipe};
use ideaforge::engine::scoring::{
    apply_delta, base_score, rank_top_ideas, speed_bucket, swipe_delta, FAST_THRESHOLD_MS,
    SLOW_THRESHOLD_MS,
};
use ideaforge::engine::types::{SpeedBucket, SwipeDirection};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_direction() -> impl Strategy<Value = SwipeDirection> {
    prop_oneof![
        Just(SwipeDirection::Left),
        Just(SwipeDirection::Right),
        Just(SwipeDirection::Up),
    ]
}

fn arb_swipe() -> impl Strategy<Value = (SwipeDirection, i64)> {
    (arb_direction(), 0i64..20_000)
}

fn idea(id: usize, score: f64) -> Idea {
    Idea {
        id: format!("i{id}"),
        session_id: "s".into(),
        batch_number: 1,
        title: format!("Idea {id}"),
        description: String::new(),
        dna_keywords: vec![],
        score,
        is_fallback: false,
        created_at: "2026-01-01T00:00:00Z".into(),
    }
}

fn swipe(n: usize, idea_id: &str, direction: SwipeDirection, duration_ms: i64) -> Swipe {
    Swipe {
        id: format!("sw{n}"),
        session_id: "s".into(),
        idea_id: idea_id.into(),
        user_id: "u".into(),
        direction,
        duration_ms,
        speed_category: speed_bucket(duration_ms),
        timestamp: "2026-01-01T00:00:00Z".into(),
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn base_score_is_fixed_per_direction(direction in arb_direction()) {
        let expected = match direction {
            SwipeDirection::Right => 1.0,
            SwipeDirection::Left => -0.5,
            SwipeDirection::Up => 2.0,
        };
        prop_assert_eq!(base_score(direction), expected);
    }

    #[test]
    fn speed_bucket_matches_thresholds(duration_ms in 0i64..100_000) {
        let bucket = speed_bucket(duration_ms);
        prop_assert_eq!(bucket == SpeedBucket::Fast, duration_ms < FAST_THRESHOLD_MS);
        prop_assert_eq!(bucket == SpeedBucket::Slow, duration_ms > SLOW_THRESHOLD_MS);
    }

    #[test]
    fn score_never_goes_negative(
        start in 0.0f64..10.0,
        swipes in prop::collection::vec(arb_swipe(), 0..50),
    ) {
        let mut score = start;
        for (direction, duration_ms) in swipes {
            score = apply_delta(score, swipe_delta(direction, duration_ms));
            prop_assert!(score >= 0.0);
        }
    }

    #[test]
    fn slower_swipes_never_weigh_less(direction in arb_direction(), a in 0i64..10_000, b in 0i64..10_000) {
        let (fast, slow) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(swipe_delta(direction, slow).abs() >= swipe_delta(direction, fast).abs());
    }

    #[test]
    fn only_liked_ideas_are_ranked(
        swipes in prop::collection::vec((0usize..8, arb_swipe()), 0..40),
        limit in 1usize..8,
    ) {
        let ideas: Vec<Idea> = (0..8).map(|i| idea(i, i as f64)).collect();
        let log: Vec<Swipe> = swipes
            .iter()
            .enumerate()
            .map(|(n, (target, (direction, duration)))| swipe(n, &format!("i{target}"), *direction, *duration))
            .collect();

        let top = rank_top_ideas(&ideas, &log, limit, 5);
        prop_assert!(top.ideas.len() <= limit);
        for ranked in &top.ideas {
            prop_assert!(log.iter().any(|s| s.idea_id == ranked.idea.id && s.direction != SwipeDirection::Left));
        }
        for pair in top.ideas.windows(2) {
            prop_assert!(pair[0].rank_score >= pair[1].rank_score);
        }
        if top.all_disliked {
            prop_assert!(top.ideas.is_empty());
        }
    }
}
