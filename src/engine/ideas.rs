//! Spark-phase idea generation: prompt, parsing and template fallback.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::validation::truncate_chars;

use super::generator::GenerationGateway;
use super::json::{extract_array, str_field, string_list};
use super::learning::LearningContext;
use super::types::GenerationOutcome;

pub const IDEAS_CATEGORY: &str = "ideas";
/// Keywords kept per idea.
pub const MAX_DNA_KEYWORDS: usize = 6;
const MAX_TITLE_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdeaRequest {
    pub app_type: Option<String>,
    pub complexity_level: Option<i64>,
    pub batch_number: i64,
    pub count: usize,
    pub learning: LearningContext,
    /// Titles already shown in this session, to steer away from repeats.
    pub existing_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaDraft {
    pub title: String,
    pub description: String,
    pub dna_keywords: Vec<String>,
}

pub fn build_prompt(request: &IdeaRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Generate {} distinct app ideas (batch #{}).\n",
        request.count, request.batch_number
    ));
    if let Some(app_type) = &request.app_type {
        prompt.push_str(&format!("App type: {app_type}\n"));
    }
    if let Some(level) = request.complexity_level {
        prompt.push_str(&format!(
            "Complexity level: {level} of 5 ({})\n",
            complexity_label(level)
        ));
    }
    prompt.push('\n');
    prompt.push_str(&request.learning.to_prompt_directives());

    if !request.existing_titles.is_empty() {
        prompt.push_str("Do not repeat these existing ideas: ");
        prompt.push_str(&request.existing_titles.join("; "));
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "Respond with a JSON array. Each element must be an object with:\n\
         - \"title\": short product name\n\
         - \"description\": two or three sentences\n\
         - \"dnaKeywords\": 3 to 6 short lowercase theme tags\n",
    );
    prompt
}

pub fn complexity_label(level: i64) -> &'static str {
    match level {
        i64::MIN..=1 => "weekend project",
        2 => "side project",
        3 => "startup MVP",
        4 => "growth-stage product",
        _ => "platform",
    }
}

/// Parse model output into at most `count` drafts. `None` when nothing usable
/// was found.
pub fn parse_ideas(output: &str, count: usize) -> Option<Vec<IdeaDraft>> {
    let items = extract_array(output)?;
    let drafts: Vec<IdeaDraft> = items
        .iter()
        .filter_map(|item| {
            let title = str_field(item, "title")?;
            let description = str_field(item, "description").unwrap_or_default();
            let mut keywords = string_list(item, "dnaKeywords");
            if keywords.is_empty() {
                keywords = string_list(item, "keywords");
            }
            Some(IdeaDraft {
                title: truncate_chars(&title, MAX_TITLE_LEN),
                description: truncate_chars(&description, MAX_DESCRIPTION_LEN),
                dna_keywords: normalize_keywords(keywords),
            })
        })
        .take(count)
        .collect();

    if drafts.is_empty() {
        None
    } else {
        Some(drafts)
    }
}

/// Lowercase, trim, de-duplicate (keeping first occurrence) and cap.
pub fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for kw in keywords {
        let kw = kw.as_ref().trim().to_lowercase();
        if kw.is_empty() || out.contains(&kw) {
            continue;
        }
        out.push(kw);
        if out.len() == MAX_DNA_KEYWORDS {
            break;
        }
    }
    out
}

// =============================================================================
// Template fallback
// =============================================================================

const FALLBACK_ANGLES: &[(&str, &str, &[&str])] = &[
    ("Tracker", "Log progress and surface trends over time", &["tracking", "analytics", "habits"]),
    ("Marketplace", "Connect people who have something with people who need it", &["marketplace", "community", "payments"]),
    ("Coach", "Give personalized, step-by-step guidance", &["coaching", "personalization", "ai"]),
    ("Planner", "Turn goals into a schedule that adapts as plans change", &["planning", "productivity", "calendar"]),
    ("Circle", "Bring small groups together around a shared interest", &["social", "groups", "messaging"]),
    ("Vault", "Keep important records organized, private and shareable on demand", &["privacy", "storage", "documents"]),
    ("Radar", "Notice relevant events nearby before they happen", &["location", "notifications", "discovery"]),
    ("Studio", "Create and remix content with guided templates", &["creativity", "content", "templates"]),
    ("Ledger", "Track money in and out with zero effort", &["finance", "budgeting", "automation"]),
    ("Swap", "Trade items or skills without money changing hands", &["sharing", "sustainability", "community"]),
];

/// Deterministic ideas used when the model's output cannot be parsed. Liked
/// themes are carried into the keywords; disliked themes are skipped.
pub fn fallback_ideas(request: &IdeaRequest) -> Vec<IdeaDraft> {
    let subject = request
        .app_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Everyday");
    let avoid: Vec<String> = request
        .learning
        .disliked_themes
        .iter()
        .map(|t| t.to_lowercase())
        .collect();
    let prefer: Vec<&String> = request
        .learning
        .super_liked_themes
        .iter()
        .chain(request.learning.liked_themes.iter())
        .collect();

    let offset = (request.batch_number.max(1) as usize - 1) * request.count;
    let mut angles: Vec<&(&str, &str, &[&str])> = FALLBACK_ANGLES
        .iter()
        .filter(|(_, _, tags)| !tags.iter().any(|t| avoid.iter().any(|a| a == t)))
        .collect();
    if angles.is_empty() {
        angles = FALLBACK_ANGLES.iter().collect();
    }

    (0..request.count)
        .map(|i| {
            let (name, pitch, tags) = angles[(offset + i) % angles.len()];
            let round = (offset + i) / angles.len();
            let title = if round == 0 {
                format!("{subject} {name}")
            } else {
                format!("{subject} {name} {}", round + 1)
            };
            let keywords = normalize_keywords(
                prefer
                    .iter()
                    .map(|s| s.as_str())
                    .take(2)
                    .chain(tags.iter().copied()),
            );
            IdeaDraft {
                title,
                description: format!("{pitch}, built for {}.", subject.to_lowercase()),
                dna_keywords: keywords,
            }
        })
        .collect()
}

// =============================================================================
// Generation
// =============================================================================

pub async fn generate(
    gateway: &GenerationGateway,
    request: &IdeaRequest,
    cancel: &CancellationToken,
) -> Result<GenerationOutcome<Vec<IdeaDraft>>, AppError> {
    let prompt = build_prompt(request);
    let parsed = gateway
        .complete(IDEAS_CATEGORY, &prompt, cancel, |output| parse_ideas(output, request.count))
        .await?;

    match parsed {
        Some(drafts) => Ok(GenerationOutcome::Genuine(drafts)),
        None => {
            tracing::warn!(
                batch_number = request.batch_number,
                "unparsable idea output, using template fallback"
            );
            Ok(GenerationOutcome::degraded(
                fallback_ideas(request),
                "model output contained no parsable ideas",
            ))
        }
    }
}
