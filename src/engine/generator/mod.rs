pub mod gateway;
pub mod mock;
pub mod model;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::{ForgeConfig, GeneratorKind};
use crate::db::models::Mutation;
use crate::error::AppError;

use super::cache::{CachePolicy, ResponseCache};
use super::features::FeatureSetDraft;
use super::ideas::{IdeaDraft, IdeaRequest};
use super::mutation::{MutationDraft, MutationRequest};
use super::retry::RetryPolicy;
use super::synthesis::{SynthesisDraft, SynthesisSource};
use super::types::{GenerationOutcome, VariationTheme};

pub use gateway::GenerationGateway;
pub use mock::MockCandidateGenerator;
pub use model::ModelCandidateGenerator;
pub use openai::OpenAiCompatClient;

// =============================================================================
// GenerationError: provider-level failures
// =============================================================================

/// Failure of a single provider call, classified where the response is
/// received (HTTP status, transport error) rather than from message text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::RateLimited(_))
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::RateLimited(last_error) => AppError::RateLimited {
                attempts: 1,
                last_error,
            },
            GenerationError::Cancelled => AppError::Cancelled,
            other => AppError::GenerationFailure(other.to_string()),
        }
    }
}

// =============================================================================
// CompletionClient: raw model access
// =============================================================================

/// Raw text and image completion against a model provider. `category` names
/// the kind of request ("ideas", "mutation", …) for logging and cache keys.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, category: &str, prompt: &str) -> Result<String, GenerationError>;

    /// Image bytes, or `None` when the provider produced no image.
    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>, GenerationError>;
}

// =============================================================================
// CandidateGenerator: the five pipeline generation operations
// =============================================================================

/// Produces pipeline candidates. Implementations may call a live model or
/// return canned content; the pipeline cannot tell which.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn generate_ideas(
        &self,
        request: &IdeaRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<IdeaDraft>>, AppError>;

    async fn generate_mutations(
        &self,
        request: &MutationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<MutationDraft>>, AppError>;

    async fn synthesize(
        &self,
        sources: &[SynthesisSource],
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<SynthesisDraft>, AppError>;

    async fn generate_feature_set(
        &self,
        mutation: &Mutation,
        themes: &[VariationTheme],
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome<Vec<FeatureSetDraft>>, AppError>;

    async fn generate_image(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, AppError>;
}

/// Pick the generator once at construction time from configuration.
pub fn resolve_generator(
    config: &ForgeConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn CandidateGenerator>, AppError> {
    match config.generator.kind {
        GeneratorKind::Mock => {
            tracing::info!("using mock candidate generator");
            Ok(Arc::new(MockCandidateGenerator::new()))
        }
        GeneratorKind::Live => {
            let client = OpenAiCompatClient::from_config(&config.generator)?;
            tracing::info!(
                model = %config.generator.model,
                base_url = %config.generator.base_url,
                "using live candidate generator"
            );
            let cache = ResponseCache::new(
                CachePolicy::new(
                    config.cache.response_sliding_secs,
                    config.cache.response_absolute_secs,
                ),
                clock,
            );
            let gateway = GenerationGateway::new(
                Arc::new(client),
                cache,
                RetryPolicy::from_config(&config.retry),
            );
            Ok(Arc::new(ModelCandidateGenerator::new(Arc::new(gateway))))
        }
    }
}
