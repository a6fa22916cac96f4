//! Learning from swipe history.
//!
//! `LearningContext` turns one session's swipes into prefer/avoid theme sets
//! that bias the next generation prompt. It is recomputed per call and never
//! persisted. `aggregate_personality` folds a finished session into the
//! user's cross-session `ProductPersonality`.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::db::models::{FeatureVariation, Idea, ProductPersonality, Swipe, SwipeSpeedProfile};

use super::scoring::base_score;
use super::types::{SpeedBucket, SwipeDirection};

/// Product bias at or below which a tag counts as a disliked pattern.
pub const DISLIKED_PATTERN_THRESHOLD: f64 = -0.25;

// =============================================================================
// LearningContext
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LearningContext {
    pub super_liked_themes: Vec<String>,
    pub liked_themes: Vec<String>,
    pub disliked_themes: Vec<String>,
}

impl LearningContext {
    /// Build from a session's swipes and the ideas they target. Tags keep
    /// first-seen order; swipes on unknown ideas are ignored.
    pub fn build(swipes: &[Swipe], ideas: &[Idea]) -> Self {
        let by_id: HashMap<&str, &Idea> = ideas.iter().map(|i| (i.id.as_str(), i)).collect();
        let mut ctx = LearningContext::default();

        for swipe in swipes {
            let Some(idea) = by_id.get(swipe.idea_id.as_str()) else {
                continue;
            };
            let target = match swipe.direction {
                SwipeDirection::Up => &mut ctx.super_liked_themes,
                SwipeDirection::Right => &mut ctx.liked_themes,
                SwipeDirection::Left => &mut ctx.disliked_themes,
            };
            for tag in &idea.dna_keywords {
                push_unique(target, tag);
            }
        }
        ctx
    }

    pub fn is_empty(&self) -> bool {
        self.super_liked_themes.is_empty()
            && self.liked_themes.is_empty()
            && self.disliked_themes.is_empty()
    }

    /// Render as explicit prompt directives. Empty context renders nothing.
    pub fn to_prompt_directives(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::from("## Learned Preferences\n");
        if !self.super_liked_themes.is_empty() {
            out.push_str(&format!(
                "- STRONGLY PREFER themes: {}\n",
                self.super_liked_themes.join(", ")
            ));
        }
        if !self.liked_themes.is_empty() {
            out.push_str(&format!("- PREFER themes: {}\n", self.liked_themes.join(", ")));
        }
        if !self.disliked_themes.is_empty() {
            out.push_str(&format!(
                "- AVOID themes: {}\n",
                self.disliked_themes.join(", ")
            ));
        }
        out.push('\n');
        out
    }
}

fn push_unique(target: &mut Vec<String>, tag: &str) {
    let tag = tag.trim();
    if tag.is_empty() {
        return;
    }
    if !target.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
        target.push(tag.to_string());
    }
}

// =============================================================================
// ProductPersonality aggregation
// =============================================================================

/// Fold one session into the user's personality. Biases are running averages
/// across sessions; tags absent from this session keep their old value.
pub fn aggregate_personality(
    existing: ProductPersonality,
    swipes: &[Swipe],
    ideas: &[Idea],
    rated_variations: &[FeatureVariation],
    now: &str,
) -> ProductPersonality {
    let sessions_before = existing.total_sessions.max(0) as f64;

    // Session-level tag preference: mean base score per tag, clamped.
    let by_id: HashMap<&str, &Idea> = ideas.iter().map(|i| (i.id.as_str(), i)).collect();
    let mut tag_totals: HashMap<String, (f64, u32)> = HashMap::new();
    for swipe in swipes {
        let Some(idea) = by_id.get(swipe.idea_id.as_str()) else {
            continue;
        };
        let unique: HashSet<String> = idea
            .dna_keywords
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        for tag in unique {
            let entry = tag_totals.entry(tag).or_insert((0.0, 0));
            entry.0 += base_score(swipe.direction);
            entry.1 += 1;
        }
    }
    let session_product: BTreeMap<String, f64> = tag_totals
        .into_iter()
        .map(|(tag, (sum, n))| (tag, (sum / n as f64).clamp(-1.0, 1.0)))
        .collect();

    // Technical preference from user ratings (1..=5 mapped onto -1..=1).
    let mut theme_totals: HashMap<String, (f64, u32)> = HashMap::new();
    for variation in rated_variations.iter().filter(|v| v.score > 0.0) {
        let pref = ((variation.score - 3.0) / 2.0).clamp(-1.0, 1.0);
        let entry = theme_totals
            .entry(variation.variation_theme.as_str().to_string())
            .or_insert((0.0, 0));
        entry.0 += pref;
        entry.1 += 1;
    }
    let session_technical: BTreeMap<String, f64> = theme_totals
        .into_iter()
        .map(|(theme, (sum, n))| (theme, sum / n as f64))
        .collect();

    let product_biases = blend(existing.product_biases, session_product, sessions_before);
    let technical_biases = blend(existing.technical_biases, session_technical, sessions_before);

    let disliked_patterns = product_biases
        .iter()
        .filter(|(_, bias)| **bias <= DISLIKED_PATTERN_THRESHOLD)
        .map(|(tag, _)| tag.clone())
        .collect();

    ProductPersonality {
        user_id: existing.user_id,
        product_biases,
        technical_biases,
        disliked_patterns,
        swipe_speed_profile: update_speed_profile(existing.swipe_speed_profile, swipes),
        total_sessions: existing.total_sessions + 1,
        updated_at: now.to_string(),
    }
}

fn blend(
    mut old: BTreeMap<String, f64>,
    session: BTreeMap<String, f64>,
    sessions_before: f64,
) -> BTreeMap<String, f64> {
    for (key, value) in session {
        let merged = match old.get(&key) {
            Some(prev) => (prev * sessions_before + value) / (sessions_before + 1.0),
            None => value,
        };
        old.insert(key, merged.clamp(-1.0, 1.0));
    }
    old
}

fn update_speed_profile(mut profile: SwipeSpeedProfile, swipes: &[Swipe]) -> SwipeSpeedProfile {
    for swipe in swipes {
        let (avg, count) = match swipe.speed_category {
            SpeedBucket::Fast => (&mut profile.fast_avg_ms, &mut profile.fast_count),
            SpeedBucket::Medium => (&mut profile.medium_avg_ms, &mut profile.medium_count),
            SpeedBucket::Slow => (&mut profile.slow_avg_ms, &mut profile.slow_count),
        };
        *avg = (*avg * *count as f64 + swipe.duration_ms as f64) / (*count + 1) as f64;
        *count += 1;
    }
    profile
}
