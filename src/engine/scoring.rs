//! Swipe scoring primitives and top-idea ranking.
//!
//! Pure functions, no I/O or randomness.

use std::collections::HashMap;

use serde::Serialize;

use crate::db::models::{Idea, Swipe};

use super::types::{SpeedBucket, SwipeDirection};

/// Swipes faster than this are `Fast`.
pub const FAST_THRESHOLD_MS: i64 = 1_000;
/// Swipes slower than this are `Slow`.
pub const SLOW_THRESHOLD_MS: i64 = 3_000;

// =============================================================================
// Per-swipe score deltas
// =============================================================================

/// Base score for a swipe direction. Left is a weighted dislike.
pub fn base_score(direction: SwipeDirection) -> f64 {
    match direction {
        SwipeDirection::Right => 1.0,
        SwipeDirection::Up => 2.0,
        SwipeDirection::Left => -0.5,
    }
}

pub fn speed_bucket(duration_ms: i64) -> SpeedBucket {
    if duration_ms < FAST_THRESHOLD_MS {
        SpeedBucket::Fast
    } else if duration_ms > SLOW_THRESHOLD_MS {
        SpeedBucket::Slow
    } else {
        SpeedBucket::Medium
    }
}

/// Deliberate swipes count more.
pub fn speed_weight(bucket: SpeedBucket) -> f64 {
    match bucket {
        SpeedBucket::Fast => 0.5,
        SpeedBucket::Medium => 1.0,
        SpeedBucket::Slow => 1.5,
    }
}

pub fn swipe_delta(direction: SwipeDirection, duration_ms: i64) -> f64 {
    base_score(direction) * speed_weight(speed_bucket(duration_ms))
}

/// New score after a delta, clamped at zero.
pub fn apply_delta(score: f64, delta: f64) -> f64 {
    (score + delta).max(0.0)
}

// =============================================================================
// Top-idea ranking
// =============================================================================

/// Confidence multiplier used to break ties between liked ideas. Super-likes
/// dominate regardless of speed.
pub fn confidence_multiplier(direction: SwipeDirection, bucket: SpeedBucket) -> f64 {
    if direction == SwipeDirection::Up {
        return 2.0;
    }
    match bucket {
        SpeedBucket::Slow => 1.5,
        SpeedBucket::Medium => 1.0,
        SpeedBucket::Fast => 0.75,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedIdea {
    pub idea: Idea,
    pub confidence: f64,
    pub rank_score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopIdeas {
    pub ideas: Vec<RankedIdea>,
    /// Set when nothing was liked and dislikes reached the threshold; the
    /// caller should offer a fresh batch instead of moving on.
    pub all_disliked: bool,
    pub dislike_count: usize,
}

/// Rank ideas that received at least one Right/Up swipe by
/// `score * confidence`, where confidence comes from the idea's most recent
/// positive swipe. `swipes` must be in submission order.
pub fn rank_top_ideas(
    ideas: &[Idea],
    swipes: &[Swipe],
    limit: usize,
    all_disliked_threshold: usize,
) -> TopIdeas {
    let mut latest_positive: HashMap<&str, &Swipe> = HashMap::new();
    let mut dislike_count = 0;

    for swipe in swipes {
        match swipe.direction {
            SwipeDirection::Left => dislike_count += 1,
            SwipeDirection::Right | SwipeDirection::Up => {
                latest_positive.insert(swipe.idea_id.as_str(), swipe);
            }
        }
    }

    if latest_positive.is_empty() {
        return TopIdeas {
            ideas: Vec::new(),
            all_disliked: dislike_count >= all_disliked_threshold,
            dislike_count,
        };
    }

    let mut ranked: Vec<(usize, RankedIdea)> = ideas
        .iter()
        .enumerate()
        .filter_map(|(pos, idea)| {
            let swipe = latest_positive.get(idea.id.as_str())?;
            let confidence = confidence_multiplier(swipe.direction, swipe.speed_category);
            Some((
                pos,
                RankedIdea {
                    idea: idea.clone(),
                    confidence,
                    rank_score: idea.score * confidence,
                },
            ))
        })
        .collect();

    ranked.sort_by(|(pos_a, a), (pos_b, b)| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then(b.idea.score.total_cmp(&a.idea.score))
            .then(pos_a.cmp(pos_b))
    });
    ranked.truncate(limit);

    TopIdeas {
        ideas: ranked.into_iter().map(|(_, r)| r).collect(),
        all_disliked: false,
        dislike_count,
    }
}
