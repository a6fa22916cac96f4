//! Mutation-phase generation: crossover and repurposing of liked ideas.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::db::models::Idea;
use crate::error::AppError;
use crate::validation::truncate_chars;

use super::generator::GenerationGateway;
use super::ideas::normalize_keywords;
use super::json::{extract_array, str_field, string_list};
use super::types::{GenerationOutcome, MutationType};

pub const MUTATION_CATEGORY: &str = "mutation";

/// Target domains for repurposing when the model gives us nothing usable.
const REPURPOSE_DOMAINS: &[&str] = &[
    "education",
    "healthcare",
    "travel",
    "small business",
    "parenting",
    "gaming",
    "nonprofits",
    "real estate",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub liked: Vec<Idea>,
    pub disliked: Vec<Idea>,
    pub mutation_type: MutationType,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationDraft {
    pub parent_idea_ids: Vec<String>,
    pub mutation_type: MutationType,
    pub title: String,
    pub description: String,
    pub mutation_rationale: String,
    pub dna_keywords: Vec<String>,
}

pub fn validate_request(request: &MutationRequest) -> Result<(), AppError> {
    let needed = request.mutation_type.parent_count();
    if request.liked.len() < needed {
        return Err(AppError::Validation(format!(
            "{} needs at least {needed} liked idea(s), got {}",
            request.mutation_type,
            request.liked.len()
        )));
    }
    if request.count == 0 {
        return Err(AppError::Validation("mutation count must be at least 1".into()));
    }
    Ok(())
}

pub fn build_prompt(request: &MutationRequest) -> String {
    let mut prompt = String::new();
    match request.mutation_type {
        MutationType::Crossover => prompt.push_str(&format!(
            "Create {} hybrid app concepts. Each must combine the themes of exactly two of the \
             liked ideas below into one product.\n\n",
            request.count
        )),
        MutationType::Repurposing => prompt.push_str(&format!(
            "Create {} repurposed app concepts. Each must take the core mechanic of exactly one \
             liked idea below and reapply it to a different domain.\n\n",
            request.count
        )),
    }

    prompt.push_str("## Liked ideas\n");
    for idea in &request.liked {
        prompt.push_str(&format!(
            "- id: {} | {}: {} [{}]\n",
            idea.id,
            idea.title,
            idea.description,
            idea.dna_keywords.join(", ")
        ));
    }
    if !request.disliked.is_empty() {
        prompt.push_str("\n## Disliked ideas (avoid their themes)\n");
        for idea in &request.disliked {
            prompt.push_str(&format!("- {} [{}]\n", idea.title, idea.dna_keywords.join(", ")));
        }
    }

    prompt.push_str(&format!(
        "\nRespond with a JSON array. Each element must be an object with:\n\
         - \"parentIds\": the id(s) of the {} liked idea(s) used\n\
         - \"title\", \"description\"\n\
         - \"rationale\": why this mutation works, naming the parent idea(s) by title\n\
         - \"dnaKeywords\": 3 to 6 short lowercase theme tags\n",
        request.mutation_type.parent_count()
    ));
    prompt
}

/// Parse model output. Parents are validated against the liked set and
/// reassigned deterministically when the model got them wrong.
pub fn parse_mutations(output: &str, request: &MutationRequest) -> Option<Vec<MutationDraft>> {
    let items = extract_array(output)?;
    let drafts: Vec<MutationDraft> = items
        .iter()
        .filter_map(|item| {
            let title = str_field(item, "title")?;
            let description = str_field(item, "description").unwrap_or_default();
            let rationale = str_field(item, "rationale")
                .or_else(|| str_field(item, "mutationRationale"))
                .unwrap_or_default();
            let keywords = string_list(item, "dnaKeywords");
            Some((title, description, rationale, keywords, string_list(item, "parentIds")))
        })
        .take(request.count)
        .enumerate()
        .map(|(i, (title, description, rationale, keywords, claimed))| {
            let parents = resolve_parents(request, &claimed, i);
            finish_draft(request, parents, title, description, rationale, keywords)
        })
        .collect();

    if drafts.is_empty() {
        None
    } else {
        Some(drafts)
    }
}

fn resolve_parents<'a>(request: &'a MutationRequest, claimed: &[String], index: usize) -> Vec<&'a Idea> {
    let needed = request.mutation_type.parent_count();
    let mut parents: Vec<&Idea> = Vec::new();
    for id in claimed {
        if let Some(idea) = request.liked.iter().find(|i| &i.id == id) {
            if !parents.iter().any(|p| p.id == idea.id) {
                parents.push(idea);
            }
        }
        if parents.len() == needed {
            return parents;
        }
    }
    default_parents(request, index)
}

/// Round-robin parent choice: (i, i+1) for crossover, i for repurposing.
fn default_parents(request: &MutationRequest, index: usize) -> Vec<&Idea> {
    let n = request.liked.len();
    match request.mutation_type {
        MutationType::Crossover => vec![&request.liked[index % n], &request.liked[(index + 1) % n]],
        MutationType::Repurposing => vec![&request.liked[index % n]],
    }
}

fn finish_draft(
    request: &MutationRequest,
    parents: Vec<&Idea>,
    title: String,
    description: String,
    rationale: String,
    keywords: Vec<String>,
) -> MutationDraft {
    let keywords = if keywords.is_empty() {
        interleave_keywords(&parents)
    } else {
        normalize_keywords(keywords)
    };
    MutationDraft {
        parent_idea_ids: parents.iter().map(|p| p.id.clone()).collect(),
        mutation_type: request.mutation_type,
        title: truncate_chars(&title, 100),
        description: truncate_chars(&description, 1000),
        mutation_rationale: ensure_rationale_names_parents(&rationale, request.mutation_type, &parents),
        dna_keywords: keywords,
    }
}

/// The rationale must name every parent by title; append them when missing.
pub fn ensure_rationale_names_parents(
    rationale: &str,
    mutation_type: MutationType,
    parents: &[&Idea],
) -> String {
    let rationale = rationale.trim();
    let lower = rationale.to_lowercase();
    let missing: Vec<&str> = parents
        .iter()
        .filter(|p| !lower.contains(&p.title.to_lowercase()))
        .map(|p| p.title.as_str())
        .collect();
    if missing.is_empty() {
        return rationale.to_string();
    }

    let label = match mutation_type {
        MutationType::Crossover => "Parents",
        MutationType::Repurposing => "Source",
    };
    let names: Vec<String> = parents.iter().map(|p| format!("\"{}\"", p.title)).collect();
    if rationale.is_empty() {
        format!("{label}: {}.", names.join(" and "))
    } else {
        format!("{rationale} ({label}: {})", names.join(" and "))
    }
}

fn interleave_keywords(parents: &[&Idea]) -> Vec<String> {
    let longest = parents.iter().map(|p| p.dna_keywords.len()).max().unwrap_or(0);
    let mut merged = Vec::new();
    for i in 0..longest {
        for parent in parents {
            if let Some(kw) = parent.dna_keywords.get(i) {
                merged.push(kw.as_str());
            }
        }
    }
    normalize_keywords(merged)
}

// =============================================================================
// Template fallback
// =============================================================================

pub fn fallback_mutations(request: &MutationRequest) -> Vec<MutationDraft> {
    let avoid: Vec<String> = request
        .disliked
        .iter()
        .flat_map(|i| i.dna_keywords.iter().map(|k| k.to_lowercase()))
        .collect();
    let domains: Vec<&str> = REPURPOSE_DOMAINS
        .iter()
        .copied()
        .filter(|d| !avoid.iter().any(|a| a == d))
        .collect();
    let domains = if domains.is_empty() {
        REPURPOSE_DOMAINS.to_vec()
    } else {
        domains
    };

    (0..request.count)
        .map(|i| {
            let parents = default_parents(request, i);
            match request.mutation_type {
                MutationType::Crossover => {
                    let (a, b) = (parents[0], parents[1]);
                    let title = format!("{} x {}", a.title, b.title);
                    let description = format!(
                        "A hybrid that pairs {} with {}.",
                        first_sentence(&a.description, &a.title),
                        first_sentence(&b.description, &b.title).to_lowercase()
                    );
                    let rationale = format!(
                        "Crossover of \"{}\" and \"{}\" combining their strongest themes.",
                        a.title, b.title
                    );
                    finish_draft(request, parents, title, description, rationale, Vec::new())
                }
                MutationType::Repurposing => {
                    let source = parents[0];
                    let domain = domains[i % domains.len()];
                    let title = format!("{} for {}", source.title, domain);
                    let description = format!(
                        "Takes the core mechanic of {} and applies it to {domain}.",
                        source.title
                    );
                    let rationale = format!(
                        "Repurposes the mechanic of \"{}\" for {domain}, a domain it was not built for.",
                        source.title
                    );
                    let mut draft =
                        finish_draft(request, parents, title, description, rationale, Vec::new());
                    draft.dna_keywords = normalize_keywords(
                        std::iter::once(domain.to_string()).chain(draft.dna_keywords),
                    );
                    draft
                }
            }
        })
        .collect()
}

fn first_sentence(description: &str, title: &str) -> String {
    let sentence = description
        .split(['.', '!', '?'])
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    match sentence {
        Some(s) => s.to_string(),
        None => title.to_string(),
    }
}

// =============================================================================
// Generation
// =============================================================================

pub async fn generate(
    gateway: &GenerationGateway,
    request: &MutationRequest,
    cancel: &CancellationToken,
) -> Result<GenerationOutcome<Vec<MutationDraft>>, AppError> {
    validate_request(request)?;
    let prompt = build_prompt(request);
    let parsed = gateway
        .complete(MUTATION_CATEGORY, &prompt, cancel, |output| parse_mutations(output, request))
        .await?;

    match parsed {
        Some(drafts) => Ok(GenerationOutcome::Genuine(drafts)),
        None => {
            tracing::warn!(
                mutation_type = %request.mutation_type,
                "unparsable mutation output, using template fallback"
            );
            Ok(GenerationOutcome::degraded(
                fallback_mutations(request),
                "model output contained no parsable mutations",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::generator::gateway::tests::{gateway_with, ScriptedClient};
    use std::sync::Arc;

    fn idea(id: &str, title: &str, tags: &[&str]) -> Idea {
        Idea {
            id: id.into(),
            session_id: "s-1".into(),
            batch_number: 1,
            title: title.into(),
            description: format!("{title} helps people. More text."),
            dna_keywords: tags.iter().map(|t| t.to_string()).collect(),
            score: 1.0,
            is_fallback: false,
            created_at: "t".into(),
        }
    }

    fn request(mutation_type: MutationType) -> MutationRequest {
        MutationRequest {
            liked: vec![
                idea("a", "Run Club", &["fitness", "social"]),
                idea("b", "Meal Prep", &["food", "planning"]),
            ],
            disliked: vec![idea("z", "Coin Flip", &["education"])],
            mutation_type,
            count: 3,
        }
    }

    #[test]
    fn test_crossover_needs_two_liked() {
        let mut req = request(MutationType::Crossover);
        req.liked.truncate(1);
        assert!(matches!(validate_request(&req), Err(AppError::Validation(_))));
        let mut req = request(MutationType::Repurposing);
        req.liked.truncate(1);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_rationale_gets_parent_names() {
        let req = request(MutationType::Crossover);
        let parents: Vec<&Idea> = req.liked.iter().collect();
        let fixed = ensure_rationale_names_parents("Great combo", MutationType::Crossover, &parents);
        assert!(fixed.contains("Run Club"));
        assert!(fixed.contains("Meal Prep"));
        let kept = ensure_rationale_names_parents(
            "run club meets meal prep",
            MutationType::Crossover,
            &parents,
        );
        assert_eq!(kept, "run club meets meal prep");
    }

    #[test]
    fn test_parse_reassigns_bad_parents() {
        let req = request(MutationType::Crossover);
        let out = r#"[
            {"parentIds": ["a", "b"], "title": "Fuel Run", "rationale": "Run Club plus Meal Prep"},
            {"parentIds": ["nope"], "title": "Other", "rationale": "x"}
        ]"#;
        let drafts = parse_mutations(out, &req).unwrap();
        assert_eq!(drafts[0].parent_idea_ids, vec!["a", "b"]);
        assert_eq!(drafts[1].parent_idea_ids, vec!["b", "a"]);
        assert!(drafts[1].mutation_rationale.contains("Run Club"));
        assert_eq!(drafts[1].dna_keywords, vec!["food", "fitness", "planning", "social"]);
    }

    #[test]
    fn test_fallback_crossover_names_both_parents() {
        let drafts = fallback_mutations(&request(MutationType::Crossover));
        assert_eq!(drafts.len(), 3);
        for d in &drafts {
            assert_eq!(d.parent_idea_ids.len(), 2);
            assert_ne!(d.parent_idea_ids[0], d.parent_idea_ids[1]);
            assert!(d.mutation_rationale.contains("Run Club"));
            assert!(d.mutation_rationale.contains("Meal Prep"));
        }
    }

    #[test]
    fn test_fallback_repurposing_skips_disliked_domain() {
        let drafts = fallback_mutations(&request(MutationType::Repurposing));
        assert_eq!(drafts[0].parent_idea_ids, vec!["a"]);
        assert_eq!(drafts[1].parent_idea_ids, vec!["b"]);
        assert!(drafts.iter().all(|d| !d.title.contains("education")));
        assert_eq!(drafts[0].title, "Run Club for healthcare");
        assert_eq!(drafts[0].dna_keywords[0], "healthcare");
    }

    #[tokio::test]
    async fn test_generate_degrades_on_garbage() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("{}".into())]));
        let outcome = generate(
            &gateway_with(client),
            &request(MutationType::Repurposing),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(outcome.is_degraded());
        assert_eq!(outcome.value().len(), 3);
    }
}
