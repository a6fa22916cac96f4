//! Feature expansion: one batched call returns a feature set per theme.

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::db::models::{Feature, Mutation, MAX_FEATURES, MIN_FEATURES};
use crate::error::AppError;
use crate::validation::truncate_chars;

use super::generator::GenerationGateway;
use super::json::{extract_array, str_field, string_list};
use super::types::{GenerationOutcome, Priority, VariationTheme};

pub const FEATURES_CATEGORY: &str = "features";
pub const MAX_THEMES: usize = VariationTheme::ALL.len();

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSetDraft {
    pub theme: VariationTheme,
    pub features: Vec<Feature>,
    pub service_integrations: Vec<String>,
}

/// The first `count` canonical themes; `count` must be in `1..=5`.
pub fn themes_for(count: usize) -> Result<&'static [VariationTheme], AppError> {
    if count == 0 || count > MAX_THEMES {
        return Err(AppError::Validation(format!(
            "theme count must be between 1 and {MAX_THEMES}, got {count}"
        )));
    }
    Ok(VariationTheme::first(count))
}

pub fn build_prompt(mutation: &Mutation, themes: &[VariationTheme]) -> String {
    let mut prompt = format!(
        "Design feature sets for the app concept below, one per theme, in a single answer.\n\n\
         ## Concept\n{}\n{}\nThemes: {}\n\n## Requested themes\n",
        mutation.title,
        mutation.description,
        mutation.dna_keywords.join(", ")
    );
    for theme in themes {
        prompt.push_str(&format!("- {}: focus on {}\n", theme, theme.focus()));
    }
    prompt.push_str(&format!(
        "\nRespond with a JSON array with one object per theme:\n\
         - \"theme\": the theme name exactly as listed\n\
         - \"features\": {MIN_FEATURES} to {MAX_FEATURES} objects with \"name\", \"description\" \
           and \"priority\" (must, should, could or wont)\n\
         - \"serviceIntegrations\": third-party services the variation relies on\n"
    ));
    prompt
}

/// Parse the batched response. Variations end up in requested-theme order,
/// one per theme at most; ones with too few valid features are dropped.
pub fn parse_feature_sets(output: &str, themes: &[VariationTheme]) -> Vec<FeatureSetDraft> {
    let Some(items) = extract_array(output) else {
        return Vec::new();
    };

    let mut by_theme: Vec<Option<FeatureSetDraft>> = vec![None; themes.len()];
    for (index, item) in items.iter().enumerate() {
        let Some(slot) = theme_slot(item, index, themes, &by_theme) else {
            continue;
        };
        let features = parse_features(item);
        if features.len() < MIN_FEATURES {
            tracing::debug!(
                theme = %themes[slot],
                valid_features = features.len(),
                "dropping variation with too few valid features"
            );
            continue;
        }
        let mut integrations = string_list(item, "serviceIntegrations");
        if integrations.is_empty() {
            integrations = string_list(item, "integrations");
        }
        integrations.dedup();
        by_theme[slot] = Some(FeatureSetDraft {
            theme: themes[slot],
            features,
            service_integrations: integrations,
        });
    }
    by_theme.into_iter().flatten().collect()
}

/// Slot of the requested theme this item fills. Unrecognized theme names fall
/// back to the theme at the same position; duplicates are ignored.
fn theme_slot(
    item: &Value,
    index: usize,
    themes: &[VariationTheme],
    filled: &[Option<FeatureSetDraft>],
) -> Option<usize> {
    let named = str_field(item, "theme")
        .or_else(|| str_field(item, "variationTheme"))
        .and_then(|raw| VariationTheme::parse_lenient(&raw));
    let slot = match named {
        Some(theme) => themes.iter().position(|t| *t == theme)?,
        None if index < themes.len() => index,
        None => return None,
    };
    if filled[slot].is_some() {
        return None;
    }
    Some(slot)
}

fn parse_features(item: &Value) -> Vec<Feature> {
    let Some(Value::Array(raw)) = item.get("features") else {
        return Vec::new();
    };
    let mut features: Vec<Feature> = Vec::new();
    for entry in raw {
        let feature = match entry {
            Value::String(name) if !name.trim().is_empty() => Feature {
                name: truncate_chars(name.trim(), 100),
                description: String::new(),
                priority: Priority::Could,
            },
            Value::Object(_) => {
                let Some(name) = str_field(entry, "name") else {
                    continue;
                };
                Feature {
                    name: truncate_chars(&name, 100),
                    description: str_field(entry, "description").unwrap_or_default(),
                    priority: entry
                        .get("priority")
                        .and_then(Value::as_str)
                        .map(Priority::parse_lenient)
                        .unwrap_or(Priority::Could),
                }
            }
            _ => continue,
        };
        if features.iter().any(|f| f.name.eq_ignore_ascii_case(&feature.name)) {
            continue;
        }
        features.push(feature);
        if features.len() == MAX_FEATURES {
            break;
        }
    }
    features
}

pub async fn generate(
    gateway: &GenerationGateway,
    mutation: &Mutation,
    themes: &[VariationTheme],
    cancel: &CancellationToken,
) -> Result<GenerationOutcome<Vec<FeatureSetDraft>>, AppError> {
    if themes.is_empty() || themes.len() > MAX_THEMES {
        return Err(AppError::Validation(format!(
            "theme count must be between 1 and {MAX_THEMES}, got {}",
            themes.len()
        )));
    }
    let prompt = build_prompt(mutation, themes);
    let parsed = gateway
        .complete(FEATURES_CATEGORY, &prompt, cancel, |output| {
            let sets = parse_feature_sets(output, themes);
            (!sets.is_empty()).then_some(sets)
        })
        .await?;

    let Some(sets) = parsed else {
        return Err(AppError::GenerationFailure(format!(
            "no valid feature variations for mutation {}",
            mutation.id
        )));
    };
    tracing::debug!(
        mutation_id = %mutation.id,
        requested = themes.len(),
        parsed = sets.len(),
        "feature sets parsed"
    );
    Ok(GenerationOutcome::Genuine(sets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::generator::gateway::tests::{gateway_with, ScriptedClient};
    use crate::engine::types::MutationType;
    use std::sync::Arc;

    fn mutation() -> Mutation {
        Mutation {
            id: "m-1".into(),
            session_id: "s-1".into(),
            parent_idea_ids: vec!["a".into()],
            mutation_type: MutationType::Repurposing,
            title: "Run Club for healthcare".into(),
            description: "Group walks prescribed by clinics.".into(),
            mutation_rationale: "r".into(),
            dna_keywords: vec!["health".into()],
            score: 0.0,
            is_fallback: false,
            created_at: "t".into(),
        }
    }

    fn features_json(n: usize) -> String {
        let items: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"name": "F{i}", "description": "d", "priority": "MUST"}}"#))
            .collect();
        format!("[{}]", items.join(","))
    }

    #[test]
    fn test_theme_count_bounds() {
        assert!(themes_for(0).is_err());
        assert_eq!(themes_for(3).unwrap().len(), 3);
        assert!(themes_for(6).is_err());
    }

    #[test]
    fn test_zero_feature_variations_dropped() {
        let themes = VariationTheme::first(2);
        let out = format!(
            r#"[{{"theme": "Minimalist MVP", "features": []}},
                {{"theme": "enterprise ready", "features": {}}}]"#,
            features_json(4)
        );
        let sets = parse_feature_sets(&out, themes);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].theme, VariationTheme::EnterpriseReady);
        assert_eq!(sets[0].features[0].priority, Priority::Must);
    }

    #[test]
    fn test_wrapped_array_and_positional_themes() {
        let themes = VariationTheme::first(2);
        let out = format!(
            r#"{{"result": [{{"theme": "Retro", "features": {f}}}, {{"features": {f}}}]}}"#,
            f = features_json(3)
        );
        let sets = parse_feature_sets(&out, themes);
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].theme, VariationTheme::MinimalistMvp);
        assert_eq!(sets[1].theme, VariationTheme::EnterpriseReady);
    }

    #[test]
    fn test_features_capped_and_priorities_lenient() {
        let themes = VariationTheme::first(1);
        let out = format!(
            r#"[{{"theme": "Minimalist MVP", "features": {}, "serviceIntegrations": ["Stripe"]}}]"#,
            features_json(14)
        );
        let sets = parse_feature_sets(&out, themes);
        assert_eq!(sets[0].features.len(), MAX_FEATURES);
        assert_eq!(sets[0].service_integrations, vec!["Stripe"]);

        let odd = r#"[{"features": [
            {"name": "a", "priority": "critical"}, {"name": "b"}, "c", {"description": "no name"}
        ]}]"#;
        let sets = parse_feature_sets(odd, themes);
        assert_eq!(sets[0].features.len(), 3);
        assert!(sets[0].features.iter().all(|f| f.priority == Priority::Could));
    }

    #[test]
    fn test_unrequested_and_duplicate_themes_ignored() {
        let themes = VariationTheme::first(1);
        let out = format!(
            r#"[{{"theme": "AI-Powered", "features": {f}}},
                {{"theme": "Minimalist MVP", "features": {f}}},
                {{"theme": "Minimalist MVP", "features": {f}}}]"#,
            f = features_json(3)
        );
        assert_eq!(parse_feature_sets(&out, themes).len(), 1);
    }

    #[tokio::test]
    async fn test_one_call_for_all_themes() {
        let themes = VariationTheme::first(5);
        let items: Vec<String> = themes
            .iter()
            .map(|t| format!(r#"{{"theme": "{t}", "features": {}}}"#, features_json(3)))
            .collect();
        let client = Arc::new(ScriptedClient::new(vec![Ok(format!("[{}]", items.join(",")))]));
        let outcome = generate(&gateway_with(client.clone()), &mutation(), themes, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.value().len(), 5);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_parse_is_generation_failure() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("[]".into())]));
        let result = generate(
            &gateway_with(client),
            &mutation(),
            VariationTheme::first(2),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(AppError::GenerationFailure(_))));
    }

    #[tokio::test]
    async fn test_retry_after_prose_reaches_the_provider() {
        let themes = VariationTheme::first(1);
        let valid = format!(r#"[{{"theme": "{}", "features": {}}}]"#, themes[0], features_json(3));
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("Sorry, I cannot help".into()),
            Ok(valid),
        ]));
        let gateway = gateway_with(client.clone());
        let cancel = CancellationToken::new();

        let first = generate(&gateway, &mutation(), themes, &cancel).await;
        assert!(matches!(first, Err(AppError::GenerationFailure(_))));
        let second = generate(&gateway, &mutation(), themes, &cancel).await.unwrap();
        assert_eq!(second.value().len(), 1);
        assert_eq!(client.call_count(), 2);
    }
}
