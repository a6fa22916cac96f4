use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::db::models::{Feature, Mutation};
use crate::error::AppError;

use super::super::features::FeatureSetDraft;
use super::super::ideas::{self, IdeaDraft, IdeaRequest};
use super::super::mutation::{self, MutationDraft, MutationRequest};
use super::super::synthesis::{self, SynthesisDraft, SynthesisSource};
use super::super::types::{GenerationOutcome, Priority, VariationTheme};
use super::CandidateGenerator;

/// Canned features per theme: (name, description, priority).
fn theme_features(theme: VariationTheme) -> &'static [(&'static str, &'static str, Priority)] {
    match theme {
        VariationTheme::MinimalistMvp => &[
            ("Quick start", "Get to the core action in under a minute", Priority::Must),
            ("Core loop", "The one workflow the product exists for", Priority::Must),
            ("Basic history", "See what you did before", Priority::Should),
            ("Share link", "Send a read-only link to a friend", Priority::Could),
        ],
        VariationTheme::EnterpriseReady => &[
            ("Single sign-on", "SAML and OIDC login", Priority::Must),
            ("Audit log", "Every change recorded with actor and time", Priority::Must),
            ("Role management", "Admins, editors and viewers", Priority::Should),
            ("Usage reports", "Exportable team activity reports", Priority::Could),
        ],
        VariationTheme::PrivacyFirst => &[
            ("Local-first storage", "Data stays on the device by default", Priority::Must),
            ("End-to-end encryption", "Sync without the server reading data", Priority::Must),
            ("Data export", "Download everything in an open format", Priority::Should),
            ("Anonymous mode", "Use the app without an account", Priority::Could),
        ],
        VariationTheme::SocialHeavy => &[
            ("Activity feed", "See what friends are doing", Priority::Must),
            ("Groups", "Join communities around shared goals", Priority::Must),
            ("Challenges", "Compete with friends on weekly goals", Priority::Should),
            ("Reactions", "Lightweight encouragement on posts", Priority::Could),
        ],
        VariationTheme::AiPowered => &[
            ("Smart suggestions", "Recommendations based on past behaviour", Priority::Must),
            ("Natural language input", "Describe what you want in plain words", Priority::Must),
            ("Auto summaries", "Weekly digest written for you", Priority::Should),
            ("Assistant chat", "Ask questions about your own data", Priority::Could),
        ],
    }
}

fn theme_integrations(theme: VariationTheme) -> &'static [&'static str] {
    match theme {
        VariationTheme::MinimalistMvp => &["Firebase"],
        VariationTheme::EnterpriseReady => &["Okta", "Stripe"],
        VariationTheme::PrivacyFirst => &["Signal Protocol"],
        VariationTheme::SocialHeavy => &["Stream", "Twilio"],
        VariationTheme::AiPowered => &["OpenAI", "Pinecone"],
    }
}

/// Deterministic generator with no I/O. Same input, same output.
#[derive(Debug, Default, Clone)]
pub struct MockCandidateGenerator;

impl MockCandidateGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CandidateGenerator for MockCandidateGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate_ideas(
        &self,
        request: &IdeaRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<IdeaDraft>>, AppError> {
        ensure_live(cancel)?;
        Ok(GenerationOutcome::Genuine(ideas::fallback_ideas(request)))
    }

    async fn generate_mutations(
        &self,
        request: &MutationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<MutationDraft>>, AppError> {
        ensure_live(cancel)?;
        mutation::validate_request(request)?;
        Ok(GenerationOutcome::Genuine(mutation::fallback_mutations(request)))
    }

    async fn synthesize(
        &self,
        sources: &[SynthesisSource],
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<SynthesisDraft>, AppError> {
        ensure_live(cancel)?;
        synthesis::validate_sources(sources)?;
        let mut draft = synthesis::fallback_synthesis(sources);
        for source in sources {
            if let Some(fragments) = draft.retained_elements.get_mut(&source.id) {
                fragments.extend(source.key_features.iter().take(2).cloned());
            }
        }
        Ok(GenerationOutcome::Genuine(draft))
    }

    async fn generate_feature_set(
        &self,
        mutation: &Mutation,
        themes: &[VariationTheme],
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<FeatureSetDraft>>, AppError> {
        ensure_live(cancel)?;
        let sets = themes
            .iter()
            .map(|theme| FeatureSetDraft {
                theme: *theme,
                features: theme_features(*theme)
                    .iter()
                    .map(|(name, description, priority)| Feature {
                        name: name.to_string(),
                        description: format!("{description} in {}", mutation.title),
                        priority: *priority,
                    })
                    .collect(),
                service_integrations: theme_integrations(*theme)
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            })
            .collect();
        Ok(GenerationOutcome::Genuine(sets))
    }

    async fn generate_image(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, AppError> {
        ensure_live(cancel)?;
        let digest = Sha256::digest(prompt.as_bytes());
        let mut bytes = b"MOCKIMG\n".to_vec();
        bytes.extend_from_slice(hex::encode(digest).as_bytes());
        Ok(Some(bytes))
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), AppError> {
    if cancel.is_cancelled() {
        Err(AppError::Cancelled)
    } else {
        Ok(())
    }
}
