//! Synthesis: merge 2..=10 candidates into one concept with a thematic bridge.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::db::models::{
    MAX_MERGED_DESCRIPTION_LEN, MAX_MERGED_TITLE_LEN, MAX_SYNTHESIS_SOURCES, MIN_SYNTHESIS_SOURCES,
};
use crate::error::AppError;
use crate::validation::truncate_chars;

use super::generator::GenerationGateway;
use super::json::{extract_object_with_keys, str_field};
use super::types::GenerationOutcome;

pub const SYNTHESIS_CATEGORY: &str = "synthesis";
/// Fragment recorded for a source the model forgot to account for.
pub const DEFAULT_RETAINED_FRAGMENT: &str = "core concept";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisSource {
    pub id: String,
    pub title: String,
    pub description: String,
    pub key_features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisDraft {
    pub merged_title: String,
    pub merged_description: String,
    pub thematic_bridge: String,
    pub retained_elements: BTreeMap<String, Vec<String>>,
}

pub fn validate_sources(sources: &[SynthesisSource]) -> Result<(), AppError> {
    if sources.len() < MIN_SYNTHESIS_SOURCES || sources.len() > MAX_SYNTHESIS_SOURCES {
        return Err(AppError::Validation(format!(
            "synthesis needs between {MIN_SYNTHESIS_SOURCES} and {MAX_SYNTHESIS_SOURCES} sources, got {}",
            sources.len()
        )));
    }
    let mut seen = HashSet::new();
    for source in sources {
        if !seen.insert(source.id.as_str()) {
            return Err(AppError::Validation(format!(
                "duplicate synthesis source: {}",
                source.id
            )));
        }
    }
    Ok(())
}

pub fn build_prompt(sources: &[SynthesisSource]) -> String {
    let mut prompt = format!(
        "Merge the following {} app ideas into ONE cohesive product concept.\n\n",
        sources.len()
    );
    for source in sources {
        prompt.push_str(&format!("### [{}] {}\n{}\n", source.id, source.title, source.description));
        if !source.key_features.is_empty() {
            prompt.push_str(&format!("Key features: {}\n", source.key_features.join(", ")));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Respond with a JSON object with:\n\
         - \"mergedTitle\" (at most {MAX_MERGED_TITLE_LEN} characters)\n\
         - \"mergedDescription\" (at most {MAX_MERGED_DESCRIPTION_LEN} characters)\n\
         - \"thematicBridge\": why these ideas belong together\n\
         - \"retainedElements\": an object keyed by source id, each value a list of the \
           concepts kept from that source\n"
    ));
    prompt
}

/// Parse the model's synthesis. Every source gets a `retained_elements`
/// entry; keys the model invented are dropped.
pub fn parse_synthesis(output: &str, sources: &[SynthesisSource]) -> Option<SynthesisDraft> {
    let val = extract_object_with_keys(output, &["mergedTitle", "mergedDescription"])?;
    let merged_title = str_field(&val, "mergedTitle")?;
    let merged_description = str_field(&val, "mergedDescription")?;
    let thematic_bridge =
        str_field(&val, "thematicBridge").unwrap_or_else(|| default_bridge(sources));

    let raw = val.get("retainedElements");
    let retained_elements = sources
        .iter()
        .map(|source| {
            let fragments = raw
                .and_then(|r| fragments_for(r, source))
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| default_fragments(source));
            (source.id.clone(), fragments)
        })
        .collect();

    Some(SynthesisDraft {
        merged_title: truncate_chars(&merged_title, MAX_MERGED_TITLE_LEN),
        merged_description: truncate_chars(&merged_description, MAX_MERGED_DESCRIPTION_LEN),
        thematic_bridge,
        retained_elements,
    })
}

/// Accepts `{ "<id>": [...] }`, `{ "<title>": [...] }` or
/// `[{ "sourceId": "<id>", "elements": [...] }]`.
fn fragments_for(raw: &Value, source: &SynthesisSource) -> Option<Vec<String>> {
    let list = match raw {
        Value::Object(map) => map.get(&source.id).or_else(|| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(&source.title))
                .map(|(_, v)| v)
        })?,
        Value::Array(items) => items
            .iter()
            .find(|item| item.get("sourceId").and_then(Value::as_str) == Some(source.id.as_str()))?
            .get("elements")?,
        _ => return None,
    };
    let fragments = match list {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };
    Some(fragments)
}

fn default_fragments(source: &SynthesisSource) -> Vec<String> {
    vec![source.title.clone(), DEFAULT_RETAINED_FRAGMENT.to_string()]
}

fn default_bridge(sources: &[SynthesisSource]) -> String {
    let titles: Vec<&str> = sources.iter().map(|s| s.title.as_str()).collect();
    format!(
        "{} address related needs of the same user and work better as one product.",
        titles.join(", ")
    )
}

/// Deterministic synthesis for unparsable output: title joins each source's
/// first word, description is templated from the sources.
pub fn fallback_synthesis(sources: &[SynthesisSource]) -> SynthesisDraft {
    let first_words: Vec<&str> = sources
        .iter()
        .filter_map(|s| s.title.split_whitespace().next())
        .collect();
    let titles: Vec<&str> = sources.iter().map(|s| s.title.as_str()).collect();
    let description = format!(
        "A unified product combining {}. It keeps the core value of each source idea in a \
         single experience.",
        titles.join(", ")
    );

    SynthesisDraft {
        merged_title: truncate_chars(&first_words.join(" "), MAX_MERGED_TITLE_LEN),
        merged_description: truncate_chars(&description, MAX_MERGED_DESCRIPTION_LEN),
        thematic_bridge: default_bridge(sources),
        retained_elements: sources
            .iter()
            .map(|s| (s.id.clone(), default_fragments(s)))
            .collect(),
    }
}

pub async fn generate(
    gateway: &GenerationGateway,
    sources: &[SynthesisSource],
    cancel: &CancellationToken,
) -> Result<GenerationOutcome<SynthesisDraft>, AppError> {
    validate_sources(sources)?;
    let prompt = build_prompt(sources);
    let parsed = gateway
        .complete(SYNTHESIS_CATEGORY, &prompt, cancel, |output| parse_synthesis(output, sources))
        .await?;

    match parsed {
        Some(draft) => Ok(GenerationOutcome::Genuine(draft)),
        None => {
            tracing::warn!(
                sources = sources.len(),
                "unparsable synthesis output, using concatenation fallback"
            );
            Ok(GenerationOutcome::degraded(
                fallback_synthesis(sources),
                "model output contained no parsable synthesis",
            ))
        }
    }
}
